use tracing::{debug, warn};

use crate::errors::AppError;

const DELIMITERS: [u8; 3] = [b'\t', b';', b','];

/// Pick the delimiter from the header line: the most frequent of tab, `;`
/// and `,`. Falls back to `,`.
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text
        .lines()
        .find(|l| l.to_lowercase().contains("profit"))
        .or_else(|| text.lines().find(|l| !l.trim().is_empty()))
        .unwrap_or("");

    DELIMITERS
        .iter()
        .map(|&d| (d, header.bytes().filter(|&b| b == d).count()))
        .filter(|&(_, n)| n > 0)
        .max_by_key(|&(_, n)| n)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

/// Read a delimited export into a grid of trimmed cells. Rows of differing
/// width are kept as-is.
pub fn read_grid(text: &str) -> Result<Vec<Vec<String>>, AppError> {
    let delimiter = detect_delimiter(text);
    debug!("CSV delimiter: {:?}", delimiter as char);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        match record {
            Ok(rec) => grid.push(rec.iter().map(str::to_string).collect()),
            Err(e) => {
                // Placeholder keeps later row numbers stable.
                warn!("Unreadable CSV record {}: {}", i + 1, e);
                grid.push(Vec::new());
            }
        }
    }
    Ok(grid)
}
