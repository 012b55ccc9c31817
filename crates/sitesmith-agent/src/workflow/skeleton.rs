use std::path::Path;

use sitesmith_core::error::{Result, SitesmithError};

/// Built-in page skeleton: Tailwind browser build, React 18 UMD, Babel standalone.
pub const BUILTIN_TEMPLATE: &str = include_str!("../../templates/skeleton.html");

pub const TITLE_PLACEHOLDER: &str = "{{TITLE}}";
pub const EXTRA_HEAD_PLACEHOLDER: &str = "{{EXTRA_HEAD}}";
pub const CONTENT_PLACEHOLDER: &str = "<!-- CONTENT_PLACEHOLDER -->";
pub const HEAD_PLACEHOLDER: &str = "<!-- HEAD_PLACEHOLDER -->";

/// Markers that must not survive into finished content.
pub const PLACEHOLDER_MARKERS: [&str; 4] = [
    CONTENT_PLACEHOLDER,
    HEAD_PLACEHOLDER,
    TITLE_PLACEHOLDER,
    EXTRA_HEAD_PLACEHOLDER,
];

/// Load the configured template, or the built-in one when none is set.
pub async fn load_template(path: Option<&str>) -> Result<String> {
    match path {
        None => Ok(BUILTIN_TEMPLATE.to_string()),
        Some(p) => tokio::fs::read_to_string(Path::new(p))
            .await
            .map_err(|e| SitesmithError::Workflow(format!("Skeleton template not found: {p}: {e}"))),
    }
}

/// Fill the title and extra-head placeholders.
pub fn render(template: &str, title: &str, description: &str) -> String {
    let extra_head = format!(
        r#"<meta name="description" content="{}">"#,
        escape_attr(&summarize(description, 160))
    );
    template
        .replace(TITLE_PLACEHOLDER, &escape_attr(title))
        .replace(EXTRA_HEAD_PLACEHOLDER, &extra_head)
}

fn summarize(text: &str, max_chars: usize) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= max_chars {
        return line;
    }
    let mut cut: String = line.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
