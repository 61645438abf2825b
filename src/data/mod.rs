//! Broker report import: raw bytes in, ordered [`TradeEvent`]s and a summary map out.

pub mod csv_report;
pub mod dialect;
pub mod html_report;
pub mod normalize;
pub mod table;

use std::path::Path;
use std::time::Instant;

use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::config::{ParseLimits, ReportDialect, ReportFormat};
use crate::models::result::ParsedReport;
use crate::models::trade::{EventKind, TradeEvent};

use self::normalize::{decode_bytes, parse_number};
use self::table::{extract_table, summary_value};

/// Parse a broker export.
///
/// Fails with `Parse` when the input is empty or holds no trade table for
/// the dialect, and with `NoValidData` when the table yields no usable rows.
/// Unreadable rows are skipped and reported in `warnings`.
pub fn parse_report(
    input: &[u8],
    format: ReportFormat,
    dialect: ReportDialect,
    limits: &ParseLimits,
) -> Result<ParsedReport, AppError> {
    if input.len() > limits.max_file_bytes {
        return Err(AppError::FileTooLarge {
            size: input.len(),
            limit: limits.max_file_bytes,
        });
    }

    let text = decode_bytes(input);
    if text.trim().is_empty() {
        return Err(AppError::Parse("file is empty".into()));
    }

    let start = Instant::now();
    info!("Parsing {} report ({} bytes, dialect={})", format, input.len(), dialect);

    let grid = match format {
        ReportFormat::Csv => csv_report::read_grid(&text)?,
        ReportFormat::Html => html_report::read_grid(&text),
    };
    if grid.is_empty() {
        return Err(AppError::Parse(format!("no rows found in {} input", format)));
    }

    let mut table = extract_table(dialect, &grid, limits)?;
    if table.events.is_empty() {
        return Err(AppError::NoValidData(format!(
            "trade table contains no usable rows ({} skipped)",
            table.warnings.len()
        )));
    }

    // Stable: equal timestamps keep source order.
    table.events.sort_by_key(|e| e.time);

    if dialect == ReportDialect::Mt4 {
        apply_mt4_summary(&mut table.events, &table.summary);
    }

    if !table.warnings.is_empty() {
        warn!("{} rows skipped while parsing", table.warnings.len());
    }
    info!(
        "Parsed {} events, {} summary fields in {:.1}ms",
        table.events.len(),
        table.summary.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(ParsedReport {
        format,
        dialect,
        trades: table.events,
        summary: table.summary,
        warnings: table.warnings,
    })
}

/// Read a report from disk, detecting HTML vs CSV from its content.
pub fn parse_report_file(
    path: &Path,
    dialect: ReportDialect,
    limits: &ParseLimits,
) -> Result<ParsedReport, AppError> {
    let size = std::fs::metadata(path)?.len() as usize;
    if size > limits.max_file_bytes {
        return Err(AppError::FileTooLarge {
            size,
            limit: limits.max_file_bytes,
        });
    }
    let bytes = std::fs::read(path)?;
    let format = ReportFormat::detect(&decode_bytes(&bytes));
    parse_report(&bytes, format, dialect, limits)
}

/// Tester reports name the instrument and the deposit only in the header block.
fn apply_mt4_summary(
    events: &mut Vec<TradeEvent>,
    summary: &std::collections::BTreeMap<String, String>,
) {
    if let Some(symbol) = summary_value(summary, "symbol")
        .and_then(|s| s.split_whitespace().next())
        .map(str::to_string)
    {
        for event in events.iter_mut().filter(|e| e.kind == EventKind::Trade) {
            if event.symbol.is_none() {
                event.symbol = Some(symbol.clone());
            }
        }
    }

    let deposit = summary_value(summary, "initial deposit").and_then(parse_number);
    let starts_funded = events
        .first()
        .map(|e| e.kind == EventKind::Balance)
        .unwrap_or(false);
    if let (Some(deposit), Some(first), false) = (deposit, events.first(), starts_funded) {
        let mut opening = TradeEvent::new(first.time, EventKind::Balance);
        opening.balance = Some(deposit);
        opening.comment = Some("initial deposit".into());
        events.insert(0, opening);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MT5_CSV: &str = "\
Trade History Report
Name:,Demo
Time,Deal,Symbol,Type,Direction,Volume,Price,Order,Commission,Swap,Profit,Balance,Comment
2024.01.02 00:00:00,1,,balance,,,,,0.00,0.00,10000.00,10000.00,
2024.01.03 10:00:00,2,EURUSD,buy,in,0.10,1.0950,2,0.00,0.00,0.00,10000.00,
2024.01.03 15:00:00,3,EURUSD,sell,out,0.10,1.1050,3,0.00,0.00,100.00,10100.00,
2024.01.04 10:00:00,4,GBPUSD,sell,in,0.10,1.2700,4,0.00,0.00,0.00,10100.00,
2024.01.04 12:00:00,5,GBPUSD,buy,out,0.10,1.2750,5,0.00,0.00,-50.00,10050.00,
not-a-date,6,GBPUSD,buy,out,0.10,1.2750,6,0.00,0.00,-50.00,10000.00,
";

    #[test]
    fn test_parse_mt5_csv() {
        let report = parse_report(
            MT5_CSV.as_bytes(),
            ReportFormat::Csv,
            ReportDialect::Mt5,
            &ParseLimits::default(),
        )
        .unwrap();
        assert_eq!(report.trades.len(), 5);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.summary.get("Name").map(String::as_str), Some("Demo"));
        assert_eq!(report.trades.iter().filter(|t| t.is_countable()).count(), 2);
        assert_eq!(report.trades[0].kind, EventKind::Balance);
    }

    #[test]
    fn test_events_sorted_by_time_stable() {
        let csv = "\
Time,Deal,Type,Direction,Profit,Balance
2024.01.05 10:00:00,3,sell,out,5,105
2024.01.01 10:00:00,1,balance,,100,100
2024.01.05 10:00:00,4,sell,out,5,110
";
        let report = parse_report(csv.as_bytes(), ReportFormat::Csv, ReportDialect::Mt5, &ParseLimits::default()).unwrap();
        let tickets: Vec<_> = report.trades.iter().map(|t| t.ticket.clone().unwrap()).collect();
        assert_eq!(tickets, vec!["1", "3", "4"]);
    }

    #[test]
    fn test_empty_and_headerless_input() {
        let limits = ParseLimits::default();
        let err = parse_report(b"   ", ReportFormat::Csv, ReportDialect::Mt5, &limits).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));

        let err = parse_report(b"a,b,c\n1,2,3\n", ReportFormat::Csv, ReportDialect::Mt5, &limits).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_header_without_rows_is_no_valid_data() {
        let csv = "Time,Deal,Type,Direction,Profit,Balance\nbad date,1,sell,out,5,105\n";
        let err = parse_report(csv.as_bytes(), ReportFormat::Csv, ReportDialect::Mt5, &ParseLimits::default())
            .unwrap_err();
        assert!(matches!(err, AppError::NoValidData(_)));
    }

    #[test]
    fn test_file_size_limit() {
        let limits = ParseLimits { max_file_bytes: 8, max_rows: 10 };
        let err = parse_report(MT5_CSV.as_bytes(), ReportFormat::Csv, ReportDialect::Mt5, &limits).unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { .. }));
    }

    #[test]
    fn test_parse_mt4_tester_html() {
        let html = r#"<html><body>
<table>
<tr><td>Symbol</td><td colspan=4>EURUSD (Euro vs US Dollar)</td></tr>
<tr><td>Initial deposit</td><td>10000.00</td><td>Spread</td><td>10</td></tr>
</table>
<table>
<tr><td>#</td><td>Time</td><td>Type</td><td>Order</td><td>Size</td><td>Price</td><td>S / L</td><td>T / P</td><td>Profit</td><td>Balance</td></tr>
<tr><td>1</td><td>2024.01.03 10:00</td><td>buy</td><td>1</td><td>0.10</td><td>1.0950</td><td>0.0000</td><td>0.0000</td><td></td><td></td></tr>
<tr><td>2</td><td>2024.01.03 12:00</td><td>t/p</td><td>1</td><td>0.10</td><td>1.0990</td><td>0.0000</td><td>1.0990</td><td>40.00</td><td>10040.00</td></tr>
</table></body></html>"#;
        let report = parse_report(html.as_bytes(), ReportFormat::Html, ReportDialect::Mt4, &ParseLimits::default()).unwrap();
        assert_eq!(report.trades.len(), 3);
        let opening = &report.trades[0];
        assert_eq!(opening.kind, EventKind::Balance);
        assert_eq!(opening.balance, Some(10000.0));
        assert_eq!(report.trades[2].symbol.as_deref(), Some("EURUSD"));
        assert!(report.trades[2].is_countable());
    }

    #[test]
    fn test_parse_report_file_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, MT5_CSV).unwrap();
        let report = parse_report_file(&path, ReportDialect::Mt5, &ParseLimits::default()).unwrap();
        assert_eq!(report.format, ReportFormat::Csv);
        assert_eq!(report.trades.len(), 5);
    }
}
