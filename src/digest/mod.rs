//! Once-per-day delivery of the latest summary.

pub mod gate;
pub mod state;

pub use gate::{DigestGate, DigestOutcome};
pub use state::{DigestState, DigestStatus};

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// HTML body for the digest: one table row per non-blank paragraph.
pub fn render_html(content: &str) -> String {
    let rows: String = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            format!(
                "<tr><td style=\"padding: 8px 20px;\">{}</td></tr>\n",
                escape_html(line)
            )
        })
        .collect();

    format!(
        "<html>\n<body>\n<table style=\"border-collapse: collapse;\">\n{rows}</table>\n</body>\n</html>\n"
    )
}
