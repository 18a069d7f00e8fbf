//! Post-render output formatting.
//!
//! Pure text normalization applied to rendered content before it is
//! written: line endings become LF, trailing whitespace is stripped, and
//! leading tabs are expanded to spaces at a per-file-type indent width.
//! Formatting never parses the target language; it only applies the
//! whitespace conventions a generated file should start with.

use std::path::Path;

/// File types that get a two-space indent; everything else gets four.
const TWO_SPACE_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "js", "ts", "jsx", "tsx", "html", "css",
];

/// Known text types that should end with exactly one newline.
const TEXT_EXTENSIONS: &[&str] = &[
    "rs", "toml", "md", "txt", "json", "yaml", "yml", "js", "ts", "jsx", "tsx", "html", "css",
    "sh", "py", "go", "c", "h", "cpp", "hpp",
];

/// Normalize rendered content for writing to `path_hint`.
///
/// The hint's extension selects the indent width and whether a trailing
/// newline is enforced; the content itself is never inspected for type.
pub fn format_output(text: &str, path_hint: &Path) -> String {
    let ext = path_hint
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let ext = ext.as_deref();

    let indent_width = match ext {
        Some(e) if TWO_SPACE_EXTENSIONS.contains(&e) => 2,
        _ => 4,
    };

    let mut out = String::with_capacity(text.len());
    for line in normalize_newlines(text).split('\n') {
        let line = expand_leading_tabs(line, indent_width);
        out.push_str(line.trim_end());
        out.push('\n');
    }
    // split('\n') yields one trailing empty segment per final newline;
    // collapse whatever accumulated to the canonical ending
    let trimmed = out.trim_end_matches('\n');
    let enforce_newline = matches!(ext, Some(e) if TEXT_EXTENSIONS.contains(&e));
    if trimmed.is_empty() {
        if enforce_newline { "\n".to_string() } else { String::new() }
    } else if enforce_newline || text.ends_with('\n') || text.ends_with('\r') {
        format!("{trimmed}\n")
    } else {
        trimmed.to_string()
    }
}

/// CRLF and lone CR both become LF.
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Expand tabs in a line's leading whitespace only; tabs after the first
/// non-whitespace character are content and stay untouched.
fn expand_leading_tabs(line: &str, indent_width: usize) -> String {
    let body_start = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    let (lead, body) = line.split_at(body_start);
    if !lead.contains('\t') {
        return line.to_string();
    }
    let expanded: String = lead
        .chars()
        .map(|c| {
            if c == '\t' {
                " ".repeat(indent_width)
            } else {
                c.to_string()
            }
        })
        .collect();
    format!("{expanded}{body}")
}
