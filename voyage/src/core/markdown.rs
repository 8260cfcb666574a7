//! Markdown section helpers for `## Title` structured answers.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{2,})\s+(.+?)\s*$").expect("valid heading regex"));
static BOLD_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\*\*(.+?)\*\*\s*$").expect("valid bold heading regex"));
static UNDERLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-=]{3,}\s*$").expect("valid underline regex"));

fn heading_level(line: &str) -> Option<(usize, &str)> {
    let caps = HEADING_RE.captures(line)?;
    let level = caps.get(1)?.as_str().len();
    let title = caps.get(2)?.as_str();
    Some((level, title))
}

/// Line index range `[start, end)` of the section titled `title`, heading
/// included. Deeper headings belong to the section.
fn section_lines(lines: &[&str], title: &str) -> Option<(usize, usize)> {
    let (start, level) = lines.iter().enumerate().find_map(|(idx, line)| {
        heading_level(line)
            .filter(|(_, found)| found.eq_ignore_ascii_case(title))
            .map(|(level, _)| (idx, level))
    })?;
    let end = lines[start + 1..]
        .iter()
        .position(|line| heading_level(line).is_some_and(|(next, _)| next <= level))
        .map_or(lines.len(), |offset| start + 1 + offset);
    Some((start, end))
}

pub fn has_section(answer: &str, title: &str) -> bool {
    let lines: Vec<&str> = answer.lines().collect();
    section_lines(&lines, title).is_some()
}

/// Body of the section titled `title`, trimmed, without its heading.
pub fn section_body(answer: &str, title: &str) -> Option<String> {
    let lines: Vec<&str> = answer.lines().collect();
    let (start, end) = section_lines(&lines, title)?;
    Some(lines[start + 1..end].join("\n").trim().to_string())
}

/// Replace the body of `title`, appending the section if it is missing.
pub fn set_section(answer: &str, title: &str, body: &str) -> String {
    let lines: Vec<&str> = answer.lines().collect();
    let block = format!("## {title}\n{}\n", body.trim());
    match section_lines(&lines, title) {
        Some((start, end)) => {
            let mut out = lines[..start].join("\n");
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&block);
            if end < lines.len() {
                out.push('\n');
                out.push_str(&lines[end..].join("\n"));
                out.push('\n');
            }
            out
        }
        None => format!("{}\n\n{block}", answer.trim_end()),
    }
}

/// Rewrite bold-only lines and setext headings as `## Title` headings.
pub fn normalize_headings(answer: &str) -> String {
    let lines: Vec<&str> = answer.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx].trim_end();
        let underlined = lines
            .get(idx + 1)
            .is_some_and(|next| UNDERLINE_RE.is_match(next));
        if let Some(caps) = BOLD_HEADING_RE.captures(line) {
            out.push(format!("## {}", caps[1].trim()));
            idx += if underlined { 2 } else { 1 };
            continue;
        }
        if !line.trim().is_empty() && underlined && !line.trim_start().starts_with(['-', '*', '#']) {
            out.push(format!("## {}", line.trim()));
            idx += 2;
            continue;
        }
        out.push(line.to_string());
        idx += 1;
    }
    out.join("\n").trim().to_string()
}
