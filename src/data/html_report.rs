use std::sync::OnceLock;

use regex::Regex;

use super::normalize::collapse_whitespace;

/// Upper bound on a `colspan` we are willing to expand.
const MAX_COLSPAN: usize = 64;

struct Patterns {
    hidden: Regex,
    row_open: Regex,
    row_close: Regex,
    cell_open: Regex,
    cell_close: Regex,
    colspan: Regex,
    tag: Regex,
    entity: Regex,
}

#[allow(clippy::expect_used)] // Patterns are compile-time constants
fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static regex");
        Patterns {
            hidden: re(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->"),
            row_open: re(r"(?i)<tr\b[^>]*>"),
            row_close: re(r"(?i)</tr\s*>|</table\s*>"),
            cell_open: re(r"(?i)<t[dh]\b([^>]*)>"),
            cell_close: re(r"(?i)</t[dh]\s*>"),
            colspan: re(r#"(?i)colspan\s*=\s*["']?(\d+)"#),
            tag: re(r"<[^>]*>"),
            entity: re(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);"),
        }
    })
}

/// Flatten every `<tr>` in the document into a row of cell texts, in
/// document order. Cells spanning several columns are padded with empty
/// cells so column positions line up with the header. Unclosed `<tr>` and
/// `<td>` tags end at the next opening tag.
pub fn read_grid(html: &str) -> Vec<Vec<String>> {
    let p = patterns();
    let html = p.hidden.replace_all(html, " ");

    let starts: Vec<(usize, usize)> = p
        .row_open
        .find_iter(&html)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut grid = Vec::with_capacity(starts.len());
    for (i, &(_, body_start)) in starts.iter().enumerate() {
        let body_end = starts.get(i + 1).map(|&(s, _)| s).unwrap_or(html.len());
        let mut body = &html[body_start..body_end];
        if let Some(close) = p.row_close.find(body) {
            body = &body[..close.start()];
        }
        grid.push(read_cells(body));
    }
    grid
}

fn read_cells(row: &str) -> Vec<String> {
    let p = patterns();
    let opens: Vec<_> = p.cell_open.captures_iter(row).collect();

    let mut cells = Vec::with_capacity(opens.len());
    for (i, caps) in opens.iter().enumerate() {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let end = opens
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(row.len());
        let mut content = &row[whole.end()..end];
        if let Some(close) = p.cell_close.find(content) {
            content = &content[..close.start()];
        }

        cells.push(cell_text(content));

        let span = p
            .colspan
            .captures(attrs)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, MAX_COLSPAN);
        cells.extend(std::iter::repeat(String::new()).take(span - 1));
    }
    cells
}

fn cell_text(fragment: &str) -> String {
    let p = patterns();
    let stripped = p.tag.replace_all(fragment, " ");
    let decoded = p.entity.replace_all(&stripped, |caps: &regex::Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    collapse_whitespace(&decoded)
}

fn decode_entity(name: &str) -> Option<String> {
    let ch = match name {
        "nbsp" => ' ',
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)?
        }
    };
    Some(ch.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_grid_basic_table() {
        let html = r#"<html><head><style>td { color: red; }</style></head><body>
            <table>
              <tr><th colspan="2">Summary</th></tr>
              <tr><td>Initial Deposit:</td><td><b>10&nbsp;000.00</b></td></tr>
              <tr align=right><td>2024.01.03 12:00:00</td><td>EUR&amp;USD</td><td>sell</td></tr>
            </table></body></html>"#;
        let grid = read_grid(html);
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], vec!["Summary".to_string(), String::new()]);
        assert_eq!(grid[1], vec!["Initial Deposit:", "10 000.00"]);
        assert_eq!(grid[2], vec!["2024.01.03 12:00:00", "EUR&USD", "sell"]);
    }

    #[test]
    fn test_unclosed_cells_and_rows() {
        let html = "<TABLE><TR><TD>a<TD>b<TR><TD>c</TABLE>";
        let grid = read_grid(html);
        assert_eq!(grid, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(cell_text("caf&#233; &#x41;"), "café A");
        assert_eq!(cell_text("&unknown;"), "&unknown;");
    }
}
