//! Markdown handling shared by the extraction backends.
//!
//! * [`normalize_markdown`] applies deterministic cleanup rules to model
//!   output (fences, line endings, blank lines, table separators, invisible
//!   characters) without touching content.
//! * [`split_page_markers`] cuts a chunk's markdown at `<!-- page N -->`
//!   markers and labels each part with its global page number.
//! * [`parse_elements`] turns one page of markdown into [`PageElement`]s.
//! * [`extract_company_info`] picks labelled company facts out of text.

use crate::output::{CompanyInfo, PageElement};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ── Normalisation ────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Clean up model-generated markdown. Output ends with exactly one newline,
/// or is empty when the input carried no content.
pub fn normalize_markdown(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let unfenced = RE_OUTER_FENCES.captures(s.trim()).map(|caps| caps[1].to_string());
    let s = unfenced.unwrap_or(s);
    let s = s.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    );
    let s = s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    let s = insert_missing_separators(&s);
    let s = RE_BLANK_LINES.replace_all(&s, "\n\n");

    let trimmed = s.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// Add a `| --- |` row after a table header that lacks one.
fn insert_missing_separators(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out = Vec::with_capacity(lines.len() + 4);

    for (i, line) in lines.iter().enumerate() {
        out.push(line.to_string());

        let starts_table = is_table_row(line)
            && !is_separator_row(line)
            && (i == 0 || !is_table_row(lines[i - 1]));
        let next = lines.get(i + 1).copied().unwrap_or("");
        if starts_table && is_table_row(next) && !is_separator_row(next) {
            let columns = split_row(line).len().max(1);
            out.push(format!("|{}", " --- |".repeat(columns)));
        }
    }
    out.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Split a pipe-table row into trimmed cells, honouring `\|` escapes.
fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = inner.strip_suffix('|').unwrap_or(inner);

    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                cell.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut cell).trim().to_string()),
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

// ── Page markers ─────────────────────────────────────────────────────────

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^[ \t]*<!--\s*page\s+(\d+)\s*-->[ \t]*$").unwrap());

/// Render the marker that opens page `page_num`.
pub fn page_marker(page_num: usize) -> String {
    format!("<!-- page {page_num} -->")
}

/// Split a chunk's markdown at page markers.
///
/// The chunk covers global pages `first_page ..= first_page + page_count - 1`.
/// Numbering is decided once for the whole chunk: if any marker falls outside
/// that range but within `1..=page_count`, every marker is read as
/// chunk-local and shifted by `first_page - 1`. Otherwise markers are global.
/// A number that fits neither keeps the text on the current page. Text
/// before the first marker, or all text when there are no markers, belongs
/// to `first_page`. Parts for the same page are concatenated.
pub fn split_page_markers(markdown: &str, first_page: usize, page_count: usize) -> Vec<(usize, String)> {
    let last_page = first_page + page_count.max(1) - 1;
    let mut parts: Vec<(usize, String)> = Vec::new();
    let mut current = first_page;
    let mut cursor = 0;

    fn push(page: usize, text: &str, parts: &mut Vec<(usize, String)>) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match parts.iter_mut().find(|(p, _)| *p == page) {
            Some((_, existing)) => {
                existing.push_str("\n\n");
                existing.push_str(text);
            }
            None => parts.push((page, text.to_string())),
        }
    }

    let global = first_page..=last_page;
    let local = 1..=page_count;
    let marker_number = |caps: &Captures<'_>| caps[1].parse::<usize>().unwrap_or(0);
    let chunk_local = first_page > 1
        && RE_PAGE_MARKER
            .captures_iter(markdown)
            .map(|caps| marker_number(&caps))
            .any(|n| !global.contains(&n) && local.contains(&n));

    for caps in RE_PAGE_MARKER.captures_iter(markdown) {
        let Some(whole) = caps.get(0) else { continue };
        push(current, &markdown[cursor..whole.start()], &mut parts);
        cursor = whole.end();

        let n = marker_number(&caps);
        current = if chunk_local {
            if local.contains(&n) {
                n + first_page - 1
            } else {
                current
            }
        } else if global.contains(&n) {
            n
        } else {
            current
        };
    }
    push(current, &markdown[cursor..], &mut parts);
    parts
}

// ── Structure ────────────────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$").unwrap());

/// Parse one page of markdown into headings, paragraphs and tables.
pub fn parse_elements(markdown: &str) -> Vec<PageElement> {
    let mut elements = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<Vec<String>> = Vec::new();

    fn flush_paragraph(paragraph: &mut Vec<&str>, elements: &mut Vec<PageElement>) {
        if !paragraph.is_empty() {
            elements.push(PageElement::Text {
                text: paragraph.join("\n"),
            });
            paragraph.clear();
        }
    }
    fn flush_table(table: &mut Vec<Vec<String>>, elements: &mut Vec<PageElement>) {
        if !table.is_empty() {
            elements.push(PageElement::Table {
                rows: std::mem::take(table),
            });
        }
    }

    for line in markdown.lines() {
        let trimmed = line.trim();

        if is_table_row(trimmed) {
            flush_paragraph(&mut paragraph, &mut elements);
            if !is_separator_row(trimmed) {
                table.push(split_row(trimmed));
            }
            continue;
        }
        flush_table(&mut table, &mut elements);

        if trimmed.is_empty() || RE_PAGE_MARKER.is_match(trimmed) {
            flush_paragraph(&mut paragraph, &mut elements);
        } else if let Some(caps) = RE_HEADING.captures(trimmed) {
            flush_paragraph(&mut paragraph, &mut elements);
            elements.push(PageElement::Heading {
                level: caps[1].len() as u8,
                text: caps[2].to_string(),
            });
        } else {
            paragraph.push(trimmed);
        }
    }
    flush_paragraph(&mut paragraph, &mut elements);
    flush_table(&mut table, &mut elements);
    elements
}

/// Render rows as a GFM pipe table; the first row is the header.
pub fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let render_row = |row: &Vec<String>| {
        let cells: Vec<String> = (0..columns)
            .map(|i| row.get(i).map_or(String::new(), |c| c.replace('|', "\\|")))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_row(&rows[0]));
    lines.push(format!("|{}", " --- |".repeat(columns)));
    lines.extend(rows[1..].iter().map(render_row));
    lines.join("\n")
}

// ── Company facts ────────────────────────────────────────────────────────

fn labelled(labels: &str) -> Regex {
    let pattern = format!(r"(?im)^[\s>*\-]*(?:{labels})[\s*]*[:：][\s*]*(.+?)[\s*]*$");
    Regex::new(&pattern).unwrap()
}

static LABELLED_FIELDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "company_name",
            labelled(r"상\s*호|회사\s*명|법인\s*명|company\s+name|corporate\s+name"),
        ),
        (
            "representative",
            labelled(r"대표\s*이사|대표자\s*(?:성명|명)?|representative|ceo"),
        ),
        (
            "established",
            labelled(r"설립\s*일(?:자)?|회사\s*성립\s*연월일|개업\s*연월일|established|date\s+of\s+incorporation"),
        ),
        (
            "address",
            labelled(r"본점\s*소재지|본\s*점|사업장\s*소재지|소재지|주\s*소|head\s+office|address"),
        ),
    ]
});

static RE_BUSINESS_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3}-\d{2}-\d{5})\b").unwrap());

static RE_CORPORATE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{6}-\d{7})\b").unwrap());

/// Pull company facts out of extracted text.
///
/// Pipe-table rows count as `label: value` lines so registry extracts laid
/// out as two-column tables are read too. The first value found per field
/// wins.
pub fn extract_company_info(text: &str) -> CompanyInfo {
    let flattened: String = text
        .lines()
        .map(|line| {
            if is_table_row(line) && !is_separator_row(line) {
                let cells = split_row(line);
                if cells.len() >= 2 {
                    return format!("{}: {}", cells[0], cells[1..].join(" "));
                }
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut info = CompanyInfo::new();
    for (field, re) in LABELLED_FIELDS.iter() {
        if let Some(caps) = re.captures(&flattened) {
            let value = caps[1].trim();
            if !value.is_empty() {
                info.insert((*field).to_string(), value.to_string());
            }
        }
    }
    if let Some(caps) = RE_BUSINESS_NUMBER.captures(&flattened) {
        info.insert("business_number".into(), caps[1].to_string());
    }
    if let Some(caps) = RE_CORPORATE_NUMBER.captures(&flattened) {
        info.insert("corporate_registration_number".into(), caps[1].to_string());
    }
    info
}
