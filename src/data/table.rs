use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::config::{ParseLimits, ReportDialect};
use crate::models::trade::{RowWarning, TradeEvent};

use super::dialect::{map_row, ColumnMap};
use super::normalize::{collapse_whitespace, parse_number, parse_timestamp};

/// Events and summary pulled out of a cell grid.
#[derive(Debug, Default)]
pub struct ExtractedTable {
    pub events: Vec<TradeEvent>,
    pub summary: BTreeMap<String, String>,
    pub warnings: Vec<RowWarning>,
}

fn non_empty(row: &[String]) -> usize {
    row.iter().filter(|c| !c.trim().is_empty()).count()
}

/// A `Key:` cell marks the report's summary block.
fn has_summary_key(row: &[String]) -> bool {
    row.iter().any(|c| {
        let c = c.trim();
        c.len() > 1 && c.ends_with(':') && parse_timestamp(c.trim_end_matches(':')).is_none()
    })
}

/// Locate the dialect's trade table in `grid`, convert its rows and read
/// every other row as summary.
pub fn extract_table(
    dialect: ReportDialect,
    grid: &[Vec<String>],
    limits: &ParseLimits,
) -> Result<ExtractedTable, AppError> {
    let (header_idx, columns) = grid
        .iter()
        .enumerate()
        .find_map(|(i, row)| ColumnMap::from_header(dialect, row).map(|m| (i, m)))
        .ok_or_else(|| {
            AppError::Parse(format!("no {} trade table header found", dialect))
        })?;
    debug!("Trade table header at row {}: {:?}", header_idx + 1, columns);

    let mut out = ExtractedTable::default();
    let mut data_rows = 0usize;
    let mut table_end = grid.len();

    for (idx, cells) in grid.iter().enumerate().skip(header_idx + 1) {
        let filled = non_empty(cells);
        if filled == 0 {
            continue;
        }
        if has_summary_key(cells) {
            table_end = idx;
            break;
        }
        let time_parses = cells
            .get(columns.time)
            .map(|c| parse_timestamp(c).is_some())
            .unwrap_or(false);
        if filled == 1 && !time_parses && !out.events.is_empty() {
            // Section title following the table.
            table_end = idx;
            break;
        }

        data_rows += 1;
        if data_rows > limits.max_rows {
            return Err(AppError::TooManyRows {
                count: data_rows,
                limit: limits.max_rows,
            });
        }

        let row_no = idx + 1;
        match map_row(dialect, &columns, cells, row_no) {
            Ok(Some(event)) => out.events.push(event),
            Ok(None) => {}
            Err(AppError::RowParse { row, message }) => {
                warn!("Skipping row {}: {}", row, message);
                out.warnings.push(RowWarning { row, message });
            }
            Err(e) => return Err(e),
        }
    }

    for cells in grid[..header_idx].iter().chain(grid[table_end..].iter()) {
        collect_summary(dialect, cells, &mut out.summary);
    }

    Ok(out)
}

/// Read key/value pairs out of one summary row.
fn collect_summary(dialect: ReportDialect, cells: &[String], summary: &mut BTreeMap<String, String>) {
    let filled: Vec<String> = cells
        .iter()
        .map(|c| collapse_whitespace(c))
        .filter(|c| !c.is_empty())
        .collect();
    if filled.len() < 2 {
        return;
    }

    if filled.iter().any(|c| c.ends_with(':')) {
        let mut i = 0;
        while i + 1 < filled.len() {
            let key = &filled[i];
            if key.ends_with(':') && !filled[i + 1].ends_with(':') {
                let key = key.trim_end_matches(':').trim().to_string();
                summary.entry(key).or_insert_with(|| filled[i + 1].clone());
                i += 2;
            } else {
                i += 1;
            }
        }
        return;
    }

    // MT4 tester summaries pair label and value cells without colons.
    if dialect == ReportDialect::Mt4 {
        for pair in filled.chunks_exact(2) {
            let key = &pair[0];
            let is_label = parse_number(key).is_none() && key.chars().any(|c| c.is_alphabetic());
            if is_label {
                summary.entry(key.clone()).or_insert_with(|| pair[1].clone());
            }
        }
    }
}

/// Case-insensitive summary lookup.
pub fn summary_value<'a>(summary: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    summary
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}
