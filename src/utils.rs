use chrono::NaiveDate;
use colored::Colorize;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Upstream dates come as `YYYYMMDD`; anything else is passed through.
pub fn format_report_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Format timestamp in human-readable format
pub fn format_timestamp(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Color a recall classification by severity
pub fn format_classification(classification: &str) -> String {
    match classification {
        "Class I" => classification.red().bold().to_string(),
        "Class II" => classification.yellow().to_string(),
        "Class III" => classification.green().to_string(),
        other => other.to_string(),
    }
}

/// Cut `text` to at most `width` terminal columns, ending in `…` when cut.
pub fn truncate(text: &str, width: usize) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.width() <= width {
        return text;
    }
    if width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width - 1 {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Pad `text` to `width` terminal columns
fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(fill))
}

/// Print a formatted table border
pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns, truncating cells that overflow
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    let mut row = String::new();
    for (col, width) in columns.iter().zip(widths) {
        row.push_str(&pad(&truncate(col, *width), *width));
        row.push_str("  ");
    }
    println!("{}", row.trim_end());
}
