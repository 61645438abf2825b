use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Classification of a report row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A buy/sell deal.
    Trade,
    /// Deposit, withdrawal, credit or other account funding operation.
    Balance,
    /// Anything the dialect could not classify (order modifications, blank types).
    Empty,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Trade => "trade",
            EventKind::Balance => "balance",
            EventKind::Empty => "empty",
        }
    }
}

/// Whether a deal opened or closed a position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// One normalized row of a broker report.
///
/// Optional columns stay `None` when the source omits them. Events are kept in
/// non-decreasing `time` order, ties in source order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeEvent {
    pub time: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<f64>,
    /// Realized P&L. Only set on closing trade deals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<f64>,
    /// Account balance after this event, when the report carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TradeEvent {
    /// A bare event with every optional column unset.
    pub fn new(time: NaiveDateTime, kind: EventKind) -> Self {
        TradeEvent {
            time,
            ticket: None,
            symbol: None,
            kind,
            direction: None,
            volume: None,
            price: None,
            commission: None,
            swap: None,
            profit: None,
            balance: None,
            comment: None,
        }
    }

    /// Closed trade with a realized profit. Funding rows never count.
    pub fn is_countable(&self) -> bool {
        self.kind == EventKind::Trade
            && self.direction == Some(Direction::Out)
            && self.profit.is_some()
    }

    /// Profit of a countable trade, `None` for everything else.
    pub fn realized_profit(&self) -> Option<f64> {
        if self.is_countable() {
            self.profit
        } else {
            None
        }
    }
}

/// Non-fatal problem found while reading a single row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowWarning {
    pub row: usize,
    pub message: String,
}
