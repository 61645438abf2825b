use chrono::{NaiveDate, NaiveDateTime};

/// Date-time layouts seen in broker exports. Tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y.%m.%d", "%m/%d/%Y", "%Y-%m-%d"];

/// Decode raw upload bytes. MT5 writes its HTML reports as UTF-16LE with a BOM.
pub fn decode_bytes(bytes: &[u8]) -> String {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse a locale-formatted number ("1 234.56", "1.234,56", "-50,5", "10'000").
///
/// Returns `None` for empty or non-numeric input.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\'')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let canonical = match (last_comma, last_dot) {
        (Some(c), Some(d)) => {
            if c > d {
                // 1.234,56
                cleaned.replace('.', "").replace(',', ".")
            } else {
                // 1,234.56
                cleaned.replace(',', "")
            }
        }
        (Some(c), None) => {
            let decimals = cleaned.len() - c - 1;
            let integer = cleaned[..c].trim_start_matches(['-', '+']);
            if commas == 1 && (decimals != 3 || integer == "0") {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, Some(_)) if dots > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a report timestamp into a naive (broker server time) date-time.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Canonical form of a header cell: lowercase, single spaces, no spaces
/// around '/', no trailing ':'.
pub fn normalize_header(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw).to_lowercase();
    collapsed
        .replace(" / ", "/")
        .replace(" /", "/")
        .replace("/ ", "/")
        .trim_end_matches(':')
        .trim()
        .to_string()
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
