use crate::errors::AppError;
use crate::models::config::ReportDialect;
use crate::models::trade::{Direction, EventKind, TradeEvent};

use super::normalize::{normalize_header, parse_number, parse_timestamp};

/// Account operations that move the balance without being a trade.
const FUNDING_TYPES: &[&str] = &[
    "balance",
    "credit",
    "deposit",
    "withdrawal",
    "correction",
    "bonus",
    "charge",
    "commission",
    "interest",
    "dividend",
    "tax",
];

/// Column positions of one dialect's trade table, resolved from its header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub time: usize,
    pub kind: usize,
    pub close_time: Option<usize>,
    pub ticket: Option<usize>,
    pub symbol: Option<usize>,
    pub direction: Option<usize>,
    pub volume: Option<usize>,
    pub price: Option<usize>,
    pub commission: Option<usize>,
    pub fee: Option<usize>,
    pub swap: Option<usize>,
    pub profit: Option<usize>,
    pub balance: Option<usize>,
    pub comment: Option<usize>,
}

fn find(header: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| header.iter().position(|h| h == alias))
}

impl ColumnMap {
    /// Resolve columns if `cells` is this dialect's trade-table header.
    pub fn from_header(dialect: ReportDialect, cells: &[String]) -> Option<ColumnMap> {
        let header: Vec<String> = cells.iter().map(|c| normalize_header(c)).collect();
        let has = |name: &str| header.iter().any(|h| h == name);

        match dialect {
            ReportDialect::Mt5 => {
                if !(has("deal") && has("direction") && has("profit")) {
                    return None;
                }
                Some(ColumnMap {
                    time: find(&header, &["time"])?,
                    kind: find(&header, &["type"])?,
                    close_time: None,
                    ticket: find(&header, &["deal"]),
                    symbol: find(&header, &["symbol"]),
                    direction: find(&header, &["direction"]),
                    volume: find(&header, &["volume"]),
                    price: find(&header, &["price"]),
                    commission: find(&header, &["commission"]),
                    fee: find(&header, &["fee"]),
                    swap: find(&header, &["swap"]),
                    profit: find(&header, &["profit"]),
                    balance: find(&header, &["balance"]),
                    comment: find(&header, &["comment"]),
                })
            }
            ReportDialect::Mt4 => {
                if !(has("type") && has("profit")) {
                    return None;
                }
                Some(ColumnMap {
                    time: find(&header, &["time", "open time"])?,
                    kind: find(&header, &["type"])?,
                    close_time: find(&header, &["close time"]),
                    ticket: find(&header, &["ticket", "order", "#"]),
                    symbol: find(&header, &["item", "symbol"]),
                    direction: None,
                    volume: find(&header, &["size", "lots", "volume"]),
                    price: find(&header, &["price"]),
                    commission: find(&header, &["commission"]),
                    fee: None,
                    swap: find(&header, &["swap"]),
                    profit: find(&header, &["profit"]),
                    balance: find(&header, &["balance"]),
                    comment: find(&header, &["comment"]),
                })
            }
        }
    }
}

fn cell(cells: &[String], idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| cells.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Classify an MT5 deal from its Type and Direction cells.
fn classify_mt5(kind: &str, direction: Option<&str>) -> (EventKind, Option<Direction>) {
    let kind = kind.to_lowercase();
    let event_kind = if kind == "buy" || kind == "sell" {
        EventKind::Trade
    } else if FUNDING_TYPES.iter().any(|f| kind.starts_with(f)) {
        EventKind::Balance
    } else {
        EventKind::Empty
    };
    let direction = match direction.map(|d| d.to_lowercase()) {
        Some(d) if d == "in" => Some(Direction::In),
        Some(d) if d == "out" || d == "out by" || d == "in/out" || d == "inout" => {
            Some(Direction::Out)
        }
        _ => None,
    };
    if event_kind == EventKind::Trade {
        (event_kind, direction)
    } else {
        (event_kind, None)
    }
}

/// Classify an MT4 row from its Type cell. Tester reports encode the
/// open/close in the type itself.
fn classify_mt4(kind: &str) -> (EventKind, Option<Direction>) {
    let kind = normalize_header(kind);
    match kind.as_str() {
        "close" | "t/p" | "s/l" | "close at stop" | "close by" => {
            (EventKind::Trade, Some(Direction::Out))
        }
        "modify" | "delete" | "cancelled" | "expired" => (EventKind::Empty, None),
        k if k.starts_with("buy") || k.starts_with("sell") => (EventKind::Trade, Some(Direction::In)),
        k if FUNDING_TYPES.iter().any(|f| k.starts_with(f)) => (EventKind::Balance, None),
        _ => (EventKind::Empty, None),
    }
}

/// Convert one data row to an event.
///
/// `Ok(None)` marks a row with an empty time cell (totals, separators);
/// `Err(RowParse)` marks a row that looks like data but cannot be read.
pub fn map_row(
    dialect: ReportDialect,
    columns: &ColumnMap,
    cells: &[String],
    row: usize,
) -> Result<Option<TradeEvent>, AppError> {
    let Some(time_raw) = cell(cells, Some(columns.time)) else {
        return Ok(None);
    };
    let mut time = parse_timestamp(time_raw).ok_or_else(|| AppError::RowParse {
        row,
        message: format!("invalid date '{}'", time_raw),
    })?;

    let kind_raw = cell(cells, Some(columns.kind)).unwrap_or("");
    let (kind, mut direction) = match dialect {
        ReportDialect::Mt5 => classify_mt5(kind_raw, cell(cells, columns.direction)),
        ReportDialect::Mt4 => classify_mt4(kind_raw),
    };

    // Account statements carry open and close times on one row.
    if kind == EventKind::Trade && columns.close_time.is_some() {
        match cell(cells, columns.close_time).and_then(parse_timestamp) {
            Some(closed_at) => {
                time = closed_at;
                direction = Some(Direction::Out);
            }
            None => direction = Some(Direction::In),
        }
    }

    let required_number = |idx: Option<usize>, name: &str| -> Result<Option<f64>, AppError> {
        match cell(cells, idx) {
            None => Ok(None),
            Some(raw) => parse_number(raw).map(Some).ok_or_else(|| AppError::RowParse {
                row,
                message: format!("invalid {} '{}'", name, raw),
            }),
        }
    };

    let mut event = TradeEvent::new(time, kind);
    event.direction = direction;
    event.balance = required_number(columns.balance, "balance")?;
    if kind == EventKind::Trade && direction == Some(Direction::Out) {
        event.profit = required_number(columns.profit, "profit")?;
    }

    event.ticket = cell(cells, columns.ticket).map(str::to_string);
    event.symbol = cell(cells, columns.symbol).map(str::to_string);
    event.volume = cell(cells, columns.volume).and_then(parse_number);
    event.price = cell(cells, columns.price).and_then(parse_number);
    let commission = cell(cells, columns.commission).and_then(parse_number);
    let fee = cell(cells, columns.fee).and_then(parse_number);
    event.commission = match (commission, fee) {
        (None, None) => None,
        (c, f) => Some(c.unwrap_or(0.0) + f.unwrap_or(0.0)),
    };
    event.swap = cell(cells, columns.swap).and_then(parse_number);
    event.comment = cell(cells, columns.comment).map(str::to_string);

    Ok(Some(event))
}
