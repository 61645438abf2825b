use std::fmt::Write as FmtWrite;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::errors::AppError;
use crate::models::result::{AnalysisReport, EquityPoint, GroupStats, MetricsSnapshot, MonteCarloStatistics};
use crate::models::trade::TradeEvent;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Write the normalized event list to a CSV file.
pub fn write_trades_csv(trades: &[TradeEvent], path: &Path) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| AppError::FileWrite(format!("Cannot create CSV: {}", e)))?;

    wtr.write_record([
        "Time",
        "Ticket",
        "Symbol",
        "Kind",
        "Direction",
        "Volume",
        "Price",
        "Commission",
        "Swap",
        "Profit",
        "Balance",
        "Comment",
    ])
    .map_err(|e| AppError::FileWrite(e.to_string()))?;

    for t in trades {
        let record = vec![
            t.time.format(TIME_FORMAT).to_string(),
            t.ticket.clone().unwrap_or_default(),
            t.symbol.clone().unwrap_or_default(),
            t.kind.as_str().to_string(),
            t.direction.map(|d| d.as_str()).unwrap_or("").to_string(),
            opt_num(t.volume, 2),
            opt_num(t.price, 5),
            opt_num(t.commission, 2),
            opt_num(t.swap, 2),
            opt_num(t.profit, 2),
            opt_num(t.balance, 2),
            t.comment.clone().unwrap_or_default(),
        ];
        wtr.write_record(&record)
            .map_err(|e| AppError::FileWrite(e.to_string()))?;
    }

    wtr.flush().map_err(|e| AppError::FileWrite(e.to_string()))?;
    info!("Wrote {} events to {}", trades.len(), path.display());
    Ok(())
}

/// Write the metrics snapshot as a key-value CSV report.
pub fn write_metrics_csv(metrics: &MetricsSnapshot, path: &Path) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| AppError::FileWrite(format!("Cannot create CSV: {}", e)))?;

    wtr.write_record(["Metric", "Value"])
        .map_err(|e| AppError::FileWrite(e.to_string()))?;

    for (name, value) in metric_rows(metrics) {
        wtr.write_record([name, value.as_str()])
            .map_err(|e| AppError::FileWrite(e.to_string()))?;
    }

    wtr.flush().map_err(|e| AppError::FileWrite(e.to_string()))?;
    Ok(())
}

fn metric_rows(m: &MetricsSnapshot) -> Vec<(&'static str, String)> {
    vec![
        // Balance
        ("Initial Balance", format!("{:.2}", m.initial_balance)),
        ("Final Balance", format!("{:.2}", m.final_balance)),
        ("Total Net Profit", format!("{:.2}", m.total_net_profit)),
        // Trades
        ("Total Trades", m.total_trades.to_string()),
        ("Winning Trades", m.winning_trades.to_string()),
        ("Losing Trades", m.losing_trades.to_string()),
        ("Breakeven Trades", m.breakeven_trades.to_string()),
        ("Win Rate %", format!("{:.2}", m.win_rate_pct)),
        // P&L
        ("Gross Profit", format!("{:.2}", m.gross_profit)),
        ("Gross Loss", format!("{:.2}", m.gross_loss)),
        ("Profit Factor", format!("{:.2}", m.profit_factor)),
        ("Avg Trade", format!("{:.2}", m.avg_trade)),
        ("Avg Win", format!("{:.2}", m.avg_win)),
        ("Avg Loss", format!("{:.2}", m.avg_loss)),
        ("Largest Win", format!("{:.2}", m.largest_win)),
        ("Largest Loss", format!("{:.2}", m.largest_loss)),
        ("Expectancy", format!("{:.2}", m.expectancy)),
        ("Total Commission", format!("{:.2}", m.total_commission)),
        ("Total Swap", format!("{:.2}", m.total_swap)),
        // Consistency
        ("Max Consecutive Wins", m.max_consecutive_wins.to_string()),
        ("Max Consecutive Losses", m.max_consecutive_losses.to_string()),
        // Drawdown
        ("Max Drawdown", format!("{:.2}", m.max_drawdown)),
        ("Max Drawdown %", format!("{:.2}", m.max_drawdown_pct)),
        ("Relative Drawdown %", format!("{:.2}", m.relative_drawdown_pct)),
        ("Recovery Factor", format!("{:.2}", m.recovery_factor)),
        // Risk-adjusted
        ("Sharpe Ratio", format!("{:.2}", m.sharpe_ratio)),
        // Time
        ("First Event", opt_time(m.first_event)),
        ("Last Event", opt_time(m.last_event)),
    ]
}

/// Render the full analysis as a self-contained HTML page.
pub fn render_report_html(report: &AnalysisReport) -> String {
    let mut html = String::with_capacity(128 * 1024);
    let m = &report.metrics;

    // ── HTML head ──
    write!(html, r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Strategy Report Analysis</title>
<style>
:root {{
  --bg: #09090b; --card: #18181b; --border: #27272a; --fg: #fafafa;
  --muted: #a1a1aa; --green: #22c55e; --red: #ef4444; --blue: #3b82f6;
  --accent: #6366f1;
}}
* {{ margin:0; padding:0; box-sizing:border-box; }}
body {{ background:var(--bg); color:var(--fg); font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif; padding:24px; max-width:1200px; margin:0 auto; }}
h1 {{ font-size:1.5rem; margin-bottom:8px; }}
h3 {{ font-size:0.95rem; margin-bottom:12px; color:var(--fg); }}
.timestamp {{ color:var(--muted); font-size:0.8rem; margin-bottom:24px; }}
.card {{ background:var(--card); border:1px solid var(--border); border-radius:8px; padding:16px; margin-bottom:16px; }}
.metrics-grid {{ display:grid; grid-template-columns:repeat(auto-fill,minmax(180px,1fr)); gap:8px; }}
.metric {{ background:var(--bg); border:1px solid var(--border); border-radius:6px; padding:10px; }}
.metric-label {{ font-size:0.7rem; color:var(--muted); text-transform:uppercase; letter-spacing:0.05em; }}
.metric-value {{ font-size:1rem; font-weight:600; margin-top:2px; }}
.positive {{ color:var(--green); }}
.negative {{ color:var(--red); }}
.chart-container {{ width:100%; overflow-x:auto; }}
svg {{ display:block; }}
table {{ width:100%; border-collapse:collapse; font-size:0.75rem; }}
th {{ background:var(--bg); color:var(--muted); text-align:left; padding:6px 8px; border-bottom:1px solid var(--border); font-weight:500; text-transform:uppercase; font-size:0.65rem; letter-spacing:0.05em; position:sticky; top:0; }}
td {{ padding:6px 8px; border-bottom:1px solid var(--border); }}
tr:hover td {{ background:rgba(255,255,255,0.02); }}
</style>
</head>
<body>
<h1>Strategy Report Analysis</h1>
<p class="timestamp">{} {} report &middot; Generated: {}</p>
"#,
        report.dialect.as_str().to_uppercase(),
        report.format.as_str().to_uppercase(),
        chrono::Local::now().format(TIME_FORMAT)
    ).ok();

    // ── Metrics Grid ──
    html.push_str(r#"<div class="card"><h3>Performance Metrics</h3><div class="metrics-grid">"#);

    let no_losses = m.gross_loss == 0.0 && m.gross_profit > 0.0;
    let metrics_list: Vec<(&str, String, Option<bool>)> = vec![
        ("Initial Balance", format!("${:.2}", m.initial_balance), None),
        ("Final Balance", format!("${:.2}", m.final_balance), None),
        ("Net Profit", format!("${:.2}", m.total_net_profit), Some(m.total_net_profit >= 0.0)),
        ("Total Trades", m.total_trades.to_string(), None),
        ("Win Rate", format!("{:.2}%", m.win_rate_pct), Some(m.win_rate_pct >= 50.0)),
        (
            "Profit Factor",
            if no_losses { "No losses".to_string() } else { format!("{:.2}", m.profit_factor) },
            Some(no_losses || m.profit_factor >= 1.0),
        ),
        ("Gross Profit", format!("${:.2}", m.gross_profit), Some(true)),
        ("Gross Loss", format!("${:.2}", m.gross_loss), Some(false)),
        ("Avg Trade", format!("${:.2}", m.avg_trade), Some(m.avg_trade >= 0.0)),
        ("Avg Win", format!("${:.2}", m.avg_win), Some(true)),
        ("Avg Loss", format!("${:.2}", m.avg_loss), Some(false)),
        ("Largest Win", format!("${:.2}", m.largest_win), Some(true)),
        ("Largest Loss", format!("${:.2}", m.largest_loss), Some(false)),
        ("Expectancy", format!("${:.2}", m.expectancy), Some(m.expectancy >= 0.0)),
        ("Max Drawdown", format!("${:.2}", m.max_drawdown), Some(false)),
        ("Max Drawdown %", format!("{:.2}%", m.max_drawdown_pct), Some(false)),
        ("Relative Drawdown", format!("{:.2}%", m.relative_drawdown_pct), Some(false)),
        ("Recovery Factor", format!("{:.2}", m.recovery_factor), Some(m.recovery_factor >= 1.0)),
        ("Sharpe Ratio", format!("{:.2}", m.sharpe_ratio), Some(m.sharpe_ratio >= 0.0)),
        ("Max Consec. Wins", m.max_consecutive_wins.to_string(), None),
        ("Max Consec. Losses", m.max_consecutive_losses.to_string(), None),
        ("Commission", format!("${:.2}", m.total_commission), None),
        ("Swap", format!("${:.2}", m.total_swap), None),
    ];

    for (label, value, color) in &metrics_list {
        let class = match color {
            Some(true) => " positive",
            Some(false) => " negative",
            None => "",
        };
        write!(html, r#"<div class="metric"><div class="metric-label">{}</div><div class="metric-value{}">{}</div></div>"#, label, class, value).ok();
    }
    html.push_str("</div></div>");

    // ── Equity Curve SVG ──
    html.push_str(r#"<div class="card"><h3>Equity Curve</h3><div class="chart-container">"#);
    write_equity_svg(&mut html, &report.drawdowns.equity_curve);
    html.push_str("</div></div>");

    // ── Drawdown SVG ──
    html.push_str(r#"<div class="card"><h3>Drawdown</h3><div class="chart-container">"#);
    write_drawdown_svg(&mut html, &report.drawdowns.equity_curve);
    html.push_str("</div></div>");

    // ── Breakdowns ──
    write_group_table(&mut html, "Monthly Returns", "Month", &m.by_month);
    write_group_table(&mut html, "Symbol Performance", "Symbol", &m.by_symbol);

    // ── Drawdown periods ──
    html.push_str(r#"<div class="card"><h3>Drawdown Periods</h3><div style="overflow-x:auto">"#);
    html.push_str("<table><thead><tr>");
    for h in &["#", "Start", "Peak", "Bottom", "Bottom Time", "Amount", "Depth", "Days", "Recovered", "Recovery Days"] {
        write!(html, "<th>{}</th>", h).ok();
    }
    html.push_str("</tr></thead><tbody>");
    for (i, p) in report.drawdowns.periods.iter().enumerate() {
        let (recovered, days) = match (p.recovery_time, p.recovery_duration_days) {
            (Some(time), Some(days)) => (time.format(TIME_FORMAT).to_string(), days.to_string()),
            _ => ("Not recovered".to_string(), "-".to_string()),
        };
        write!(html, "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{}</td><td class=\"negative\">{:.2}</td><td class=\"negative\">{:.2}%</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            i + 1, p.start.format(TIME_FORMAT), p.peak, p.bottom, p.bottom_time.format(TIME_FORMAT),
            p.drawdown_amount, p.drawdown_pct, p.duration_days, recovered, days
        ).ok();
    }
    html.push_str("</tbody></table></div></div>");

    // ── Monte Carlo ──
    if let Some(mc) = &report.monte_carlo {
        write_monte_carlo(&mut html, &mc.statistics);
    }

    // ── Report summary ──
    if !report.summary.is_empty() {
        html.push_str(r#"<div class="card"><h3>Report Summary</h3><table><tbody>"#);
        for (key, value) in &report.summary {
            write!(html, "<tr><td>{}</td><td>{}</td></tr>", escape_html(key), escape_html(value)).ok();
        }
        html.push_str("</tbody></table></div>");
    }

    // ── Footer ──
    html.push_str(r#"<p style="text-align:center;color:var(--muted);font-size:0.7rem;margin-top:24px;">Generated by Report Genie</p>"#);
    html.push_str("</body></html>");
    html
}

/// Render the report and write it to `path`.
pub fn write_report_html(report: &AnalysisReport, path: &Path) -> Result<(), AppError> {
    let html = render_report_html(report);
    let mut file = std::fs::File::create(path)
        .map_err(|e| AppError::FileWrite(format!("Cannot create HTML: {}", e)))?;
    file.write_all(html.as_bytes())
        .map_err(|e| AppError::FileWrite(e.to_string()))?;
    info!("Wrote HTML report to {} ({} bytes)", path.display(), html.len());
    Ok(())
}

fn write_group_table(html: &mut String, title: &str, key_label: &str, groups: &[GroupStats]) {
    if groups.is_empty() {
        return;
    }
    write!(html, r#"<div class="card"><h3>{}</h3><div style="overflow-x:auto">"#, title).ok();
    html.push_str("<table><thead><tr>");
    for h in &[key_label, "Trades", "Win Rate", "Net Profit", "Avg Trade", "Profit Factor"] {
        write!(html, "<th>{}</th>", h).ok();
    }
    html.push_str("</tr></thead><tbody>");
    for g in groups {
        let pnl_class = if g.net_profit >= 0.0 { "positive" } else { "negative" };
        let pf = match g.profit_factor {
            Some(pf) => format!("{:.2}", pf),
            None => "No losses".to_string(),
        };
        write!(html, "<tr><td>{}</td><td>{}</td><td>{:.1}%</td><td class=\"{}\">{:.2}</td><td>{:.2}</td><td>{}</td></tr>",
            escape_html(&g.key), g.trades, g.win_rate_pct, pnl_class, g.net_profit, g.avg_trade, pf
        ).ok();
    }
    html.push_str("</tbody></table></div></div>");
}

fn write_monte_carlo(html: &mut String, s: &MonteCarloStatistics) {
    write!(html, r#"<div class="card"><h3>Monte Carlo ({} paths x {} trades)</h3><div class="metrics-grid">"#,
        s.simulations, s.horizon).ok();
    let rows: Vec<(&str, String)> = vec![
        ("Initial Capital", format!("${:.2}", s.initial_capital)),
        ("Median Final", format!("${:.2}", s.median_final_equity)),
        ("Mean Final", format!("${:.2}", s.mean_final_equity)),
        ("Best Case", format!("${:.2}", s.best_final_equity)),
        ("Worst Case", format!("${:.2}", s.worst_final_equity)),
        ("50% Interval", format!("${} - ${}", compact_amount(s.confidence_50.0), compact_amount(s.confidence_50.1))),
        ("90% Interval", format!("${} - ${}", compact_amount(s.confidence_90.0), compact_amount(s.confidence_90.1))),
        ("Median Max DD", format!("{:.2}%", s.median_max_drawdown_pct)),
        ("Worst Max DD", format!("{:.2}%", s.worst_max_drawdown_pct)),
        ("Probability of Profit", format!("{:.1}%", s.probability_of_profit * 100.0)),
        ("Probability of Ruin", format!("{:.1}%", s.probability_of_ruin * 100.0)),
    ];
    for (label, value) in &rows {
        write!(html, r#"<div class="metric"><div class="metric-label">{}</div><div class="metric-value">{}</div></div>"#, label, value).ok();
    }
    html.push_str("</div></div>");
}

const CHART_WIDTH: f64 = 900.0;
const CHART_LEFT: f64 = 60.0;
const CHART_TOP: f64 = 10.0;
const MAX_CHART_POINTS: usize = 500;

/// Plot area shared by the equity and underwater charts.
struct ChartFrame {
    height: f64,
    plot_w: f64,
    plot_h: f64,
}

impl ChartFrame {
    fn new(height: f64, bottom_margin: f64) -> Self {
        ChartFrame {
            height,
            plot_w: CHART_WIDTH - CHART_LEFT - 10.0,
            plot_h: height - bottom_margin,
        }
    }

    fn open(&self, html: &mut String) {
        write!(html, r##"<svg width="100%" viewBox="0 0 {} {}" xmlns="http://www.w3.org/2000/svg" style="max-width:{}px">"##,
            CHART_WIDTH, self.height, CHART_WIDTH as i64).ok();
    }

    /// Dashed horizontal rule at `frac` of the plot height, labelled on the left.
    fn rule(&self, html: &mut String, frac: f64, label: &str) {
        let y = self.y(frac);
        write!(html, r##"<line x1="{}" y1="{:.1}" x2="{}" y2="{:.1}" stroke="#27272a" stroke-dasharray="3,3"/>"##,
            CHART_LEFT, y, CHART_WIDTH - 10.0, y).ok();
        write!(html, r##"<text x="{}" y="{:.1}" fill="#a1a1aa" font-size="10" text-anchor="end">{}</text>"##,
            CHART_LEFT - 4.0, y + 3.0, label).ok();
    }

    fn x(&self, i: usize, n: usize) -> f64 {
        CHART_LEFT + self.plot_w / (n as f64 - 1.0).max(1.0) * i as f64
    }

    fn y(&self, frac: f64) -> f64 {
        CHART_TOP + self.plot_h * frac
    }

    /// SVG path through `fracs`, each a fraction of the plot height from the top.
    fn trace(&self, fracs: &[f64]) -> String {
        let mut path = String::with_capacity(fracs.len() * 20);
        for (i, &frac) in fracs.iter().enumerate() {
            let cmd = if i == 0 { "M" } else { " L" };
            write!(path, "{}{:.1},{:.1}", cmd, self.x(i, fracs.len()), self.y(frac)).ok();
        }
        path
    }
}

fn downsample(data: &[EquityPoint]) -> Vec<&EquityPoint> {
    let step = (data.len() / MAX_CHART_POINTS).max(1);
    data.iter().step_by(step).collect()
}

/// Equity curve with a light fill down to the lowest value.
fn write_equity_svg(html: &mut String, data: &[EquityPoint]) {
    let pts = downsample(data);
    if pts.is_empty() { return; }

    let frame = ChartFrame::new(300.0, 40.0);
    let low = pts.iter().map(|p| p.equity).fold(f64::INFINITY, f64::min);
    let high = pts.iter().map(|p| p.equity).fold(f64::NEG_INFINITY, f64::max);
    let span = (high - low).max(1.0);

    frame.open(html);
    for i in 0..5 {
        let frac = i as f64 / 4.0;
        frame.rule(html, frac, &format!("${}", compact_amount(high - span * frac)));
    }

    let fracs: Vec<f64> = pts.iter().map(|p| 1.0 - (p.equity - low) / span).collect();
    let path = frame.trace(&fracs);
    let (x0, x1, base) = (frame.x(0, fracs.len()), frame.x(fracs.len() - 1, fracs.len()), frame.y(1.0));
    write!(html, r##"<path d="{}" fill="none" stroke="#3b82f6" stroke-width="1.5"/>"##, path).ok();
    write!(html, r##"<path d="{} L{:.1},{:.1} L{:.1},{:.1} Z" fill="#3b82f6" fill-opacity="0.1"/>"##,
        path, x1, base, x0, base).ok();
    html.push_str("</svg>");
}

/// Underwater chart: depth below the running peak, zero at the top.
fn write_drawdown_svg(html: &mut String, data: &[EquityPoint]) {
    let pts = downsample(data);
    if pts.is_empty() { return; }

    let frame = ChartFrame::new(160.0, 30.0);
    let deepest = pts.iter().map(|p| p.drawdown_pct).fold(0.0_f64, f64::max);
    let span = deepest.max(0.01);

    frame.open(html);
    write!(html, r##"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="#27272a"/>"##,
        CHART_LEFT, CHART_TOP, CHART_WIDTH - 10.0, CHART_TOP).ok();
    for i in 1..4 {
        let frac = i as f64 / 3.0;
        frame.rule(html, frac, &format!("{:.1}%", -deepest * frac));
    }

    let fracs: Vec<f64> = pts.iter().map(|p| p.drawdown_pct / span).collect();
    let path = frame.trace(&fracs);
    let (x0, x1) = (frame.x(0, fracs.len()), frame.x(fracs.len() - 1, fracs.len()));
    write!(html, r##"<path d="{} L{:.1},{} L{:.1},{} Z" fill="#ef4444" fill-opacity="0.3"/>"##,
        path, x1, CHART_TOP, x0, CHART_TOP).ok();
    write!(html, r##"<path d="{}" fill="none" stroke="#ef4444" stroke-width="1.5"/>"##, path).ok();
    html.push_str("</svg>");
}

/// Escape text taken from the uploaded report.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn opt_num(v: Option<f64>, decimals: usize) -> String {
    v.map(|x| format!("{:.*}", decimals, x)).unwrap_or_default()
}

fn opt_time(t: Option<chrono::NaiveDateTime>) -> String {
    t.map(|t| t.format(TIME_FORMAT).to_string()).unwrap_or_default()
}

/// Short money label for chart axes and intervals: `1.5M`, `-2K`, `12`.
fn compact_amount(v: f64) -> String {
    let (scaled, suffix, digits) = match v.abs() {
        a if a >= 1_000_000.0 => (v / 1_000_000.0, "M", 1),
        a if a >= 1_000.0 => (v / 1_000.0, "K", 0),
        _ => (v, "", 0),
    };
    format!("{:.*}{}", digits, scaled, suffix)
}
