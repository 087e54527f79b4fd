//! Regex-based extraction of the monitor page markup.
//!
//! The monitor renders one table whose body rows hold the substitutions.
//! Cells 0, 2, 3, 4, 5 and 6 carry course, period, room, teacher, kind and
//! note; cell 1 is unused. Rows with fewer than seven cells are ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{SubstitutionEntry, find_date_label};

use super::{FetchedPage, Readiness};

const MIN_CELLS: usize = 7;

/// Classes the monitor uses for its message boxes.
const EMPTY_MARKER_CLASSES: &[&str] = &[
    "monitor-no-data",
    "monitormessage",
    "untis-message",
    "alert-warning",
    "alert-info",
];

/// Any class containing one of these counts as a "no data" marker.
const EMPTY_MARKER_CLASS_FRAGMENTS: &[&str] = &["no-data", "empty"];

/// Visible text fragments that mean "nothing to show".
const EMPTY_MARKER_TEXTS: &[&str] = &[
    "keine daten",
    "kein vertretungsplan",
    "keine vertretungen",
    "no data",
    "no entries",
    "noch keine informationen",
    "keine einträge",
    "keine informationen",
];

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<!--.*?-->")
        .expect("script regex")
});
static TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table>").expect("table regex"));
static THEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<thead\b[^>]*>.*?</thead>").expect("thead regex"));
static TBODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tbody\b[^>]*>(.*?)</tbody>").expect("tbody regex"));
static TR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("row regex"));
static TD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("cell regex"));
static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("class regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));
static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("break regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z][a-zA-Z0-9]*);").expect("entity regex")
});
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space regex"));

/// Result of inspecting one page body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub rows: Vec<SubstitutionEntry>,
    /// Body rows that contain at least one data cell, extractable or not.
    pub rows_detected: usize,
    pub readiness: Readiness,
    pub date_label: Option<String>,
}

impl PageSnapshot {
    #[must_use]
    pub fn into_page(self) -> FetchedPage {
        FetchedPage::new(self.rows, self.date_label, self.readiness)
    }
}

/// Inspects a rendered page and classifies its readiness.
#[must_use]
pub fn analyze(html: &str) -> PageSnapshot {
    let html = SCRIPT_RE.replace_all(html, " ");

    let mut has_table = false;
    let mut rows_detected = 0;
    let mut rows = Vec::new();

    for table in TABLE_RE.captures_iter(&html) {
        has_table = true;
        let inner = table.get(1).map_or("", |m| m.as_str());
        for body in table_bodies(inner) {
            for row in TR_RE.captures_iter(&body) {
                let cells: Vec<String> = TD_RE
                    .captures_iter(row.get(1).map_or("", |m| m.as_str()))
                    .map(|cell| cell_text(cell.get(1).map_or("", |m| m.as_str())))
                    .collect();
                if cells.is_empty() {
                    continue;
                }
                rows_detected += 1;
                if let Some(entry) = entry_from_cells(&cells) {
                    rows.push(entry);
                }
            }
        }
    }

    let text = page_text(&html);
    let readiness = if rows_detected > 0 {
        Readiness::RowsDetected
    } else if has_table {
        Readiness::EmptyTable
    } else if has_empty_marker(&html, &text) {
        Readiness::EmptyIndicator
    } else {
        Readiness::Undetermined
    };

    PageSnapshot {
        rows,
        rows_detected,
        readiness,
        date_label: find_date_label(&text),
    }
}

/// Body sections of a table; falls back to the table without its header
/// when the markup has no explicit `<tbody>`.
fn table_bodies(table: &str) -> Vec<String> {
    let bodies: Vec<String> = TBODY_RE
        .captures_iter(table)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    if bodies.is_empty() {
        vec![THEAD_RE.replace_all(table, "").into_owned()]
    } else {
        bodies
    }
}

fn entry_from_cells(cells: &[String]) -> Option<SubstitutionEntry> {
    if cells.len() < MIN_CELLS {
        return None;
    }
    SubstitutionEntry::new(
        cells[0].clone(),
        cells[2].clone(),
        cells[3].clone(),
        cells[4].clone(),
        cells[5].clone(),
        cells[6].clone(),
    )
    .normalized()
}

fn has_empty_marker(html: &str, text: &str) -> bool {
    let class_hit = CLASS_RE.captures_iter(html).any(|c| {
        let classes = c
            .get(1)
            .or_else(|| c.get(2))
            .map_or(String::new(), |m| m.as_str().to_lowercase());
        classes.split_whitespace().any(|class| {
            EMPTY_MARKER_CLASSES.contains(&class)
                || EMPTY_MARKER_CLASS_FRAGMENTS
                    .iter()
                    .any(|fragment| class.contains(fragment))
        })
    });
    if class_hit {
        return true;
    }
    let lowered = text.to_lowercase();
    EMPTY_MARKER_TEXTS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn cell_text(fragment: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(fragment, " ");
    let stripped = TAG_RE.replace_all(&with_breaks, " ");
    collapse_whitespace(&decode_entities(&stripped))
}

fn page_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    collapse_whitespace(&decode_entities(&stripped))
}

fn collapse_whitespace(text: &str) -> String {
    SPACE_RE.replace_all(text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let raw = &caps[1];
            let hex = raw.strip_prefix("#x").or_else(|| raw.strip_prefix("#X"));
            let decoded = if let Some(hex) = hex {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = raw.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(raw)
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

/// HTML named character references: the XML five, the Latin-1 set and the
/// typographic marks the monitor emits. `&nbsp;` decodes to a plain space.
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '\u{26}'),
    ("lt", '\u{3c}'),
    ("gt", '\u{3e}'),
    ("quot", '\u{22}'),
    ("apos", '\u{27}'),
    ("OElig", '\u{152}'),
    ("oelig", '\u{153}'),
    ("Scaron", '\u{160}'),
    ("scaron", '\u{161}'),
    ("Yuml", '\u{178}'),
    ("ensp", '\u{2002}'),
    ("emsp", '\u{2003}'),
    ("thinsp", '\u{2009}'),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("sbquo", '\u{201a}'),
    ("ldquo", '\u{201c}'),
    ("rdquo", '\u{201d}'),
    ("bdquo", '\u{201e}'),
    ("bull", '\u{2022}'),
    ("hellip", '\u{2026}'),
    ("prime", '\u{2032}'),
    ("lsaquo", '\u{2039}'),
    ("rsaquo", '\u{203a}'),
    ("euro", '\u{20ac}'),
    ("trade", '\u{2122}'),
    ("larr", '\u{2190}'),
    ("rarr", '\u{2192}'),
    ("nbsp", ' '),
    ("iexcl", '\u{a1}'),
    ("cent", '\u{a2}'),
    ("pound", '\u{a3}'),
    ("curren", '\u{a4}'),
    ("yen", '\u{a5}'),
    ("brvbar", '\u{a6}'),
    ("sect", '\u{a7}'),
    ("uml", '\u{a8}'),
    ("copy", '\u{a9}'),
    ("ordf", '\u{aa}'),
    ("laquo", '\u{ab}'),
    ("not", '\u{ac}'),
    ("shy", '\u{ad}'),
    ("reg", '\u{ae}'),
    ("macr", '\u{af}'),
    ("deg", '\u{b0}'),
    ("plusmn", '\u{b1}'),
    ("sup2", '\u{b2}'),
    ("sup3", '\u{b3}'),
    ("acute", '\u{b4}'),
    ("micro", '\u{b5}'),
    ("para", '\u{b6}'),
    ("middot", '\u{b7}'),
    ("cedil", '\u{b8}'),
    ("sup1", '\u{b9}'),
    ("ordm", '\u{ba}'),
    ("raquo", '\u{bb}'),
    ("frac14", '\u{bc}'),
    ("frac12", '\u{bd}'),
    ("frac34", '\u{be}'),
    ("iquest", '\u{bf}'),
    ("Agrave", '\u{c0}'),
    ("Aacute", '\u{c1}'),
    ("Acirc", '\u{c2}'),
    ("Atilde", '\u{c3}'),
    ("Auml", '\u{c4}'),
    ("Aring", '\u{c5}'),
    ("AElig", '\u{c6}'),
    ("Ccedil", '\u{c7}'),
    ("Egrave", '\u{c8}'),
    ("Eacute", '\u{c9}'),
    ("Ecirc", '\u{ca}'),
    ("Euml", '\u{cb}'),
    ("Igrave", '\u{cc}'),
    ("Iacute", '\u{cd}'),
    ("Icirc", '\u{ce}'),
    ("Iuml", '\u{cf}'),
    ("ETH", '\u{d0}'),
    ("Ntilde", '\u{d1}'),
    ("Ograve", '\u{d2}'),
    ("Oacute", '\u{d3}'),
    ("Ocirc", '\u{d4}'),
    ("Otilde", '\u{d5}'),
    ("Ouml", '\u{d6}'),
    ("times", '\u{d7}'),
    ("Oslash", '\u{d8}'),
    ("Ugrave", '\u{d9}'),
    ("Uacute", '\u{da}'),
    ("Ucirc", '\u{db}'),
    ("Uuml", '\u{dc}'),
    ("Yacute", '\u{dd}'),
    ("THORN", '\u{de}'),
    ("szlig", '\u{df}'),
    ("agrave", '\u{e0}'),
    ("aacute", '\u{e1}'),
    ("acirc", '\u{e2}'),
    ("atilde", '\u{e3}'),
    ("auml", '\u{e4}'),
    ("aring", '\u{e5}'),
    ("aelig", '\u{e6}'),
    ("ccedil", '\u{e7}'),
    ("egrave", '\u{e8}'),
    ("eacute", '\u{e9}'),
    ("ecirc", '\u{ea}'),
    ("euml", '\u{eb}'),
    ("igrave", '\u{ec}'),
    ("iacute", '\u{ed}'),
    ("icirc", '\u{ee}'),
    ("iuml", '\u{ef}'),
    ("eth", '\u{f0}'),
    ("ntilde", '\u{f1}'),
    ("ograve", '\u{f2}'),
    ("oacute", '\u{f3}'),
    ("ocirc", '\u{f4}'),
    ("otilde", '\u{f5}'),
    ("ouml", '\u{f6}'),
    ("divide", '\u{f7}'),
    ("oslash", '\u{f8}'),
    ("ugrave", '\u{f9}'),
    ("uacute", '\u{fa}'),
    ("ucirc", '\u{fb}'),
    ("uuml", '\u{fc}'),
    ("yacute", '\u{fd}'),
    ("thorn", '\u{fe}'),
    ("yuml", '\u{ff}'),
];

fn named_entity(name: &str) -> Option<char> {
    NAMED_ENTITIES
        .iter()
        .find_map(|(entity, c)| (*entity == name).then_some(*c))
}
