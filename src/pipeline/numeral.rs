//! Numeric cell parsing, including compound Korean magnitude numerals.
//!
//! Financial statements from Korean filers mix several notations in one
//! column: `1,234,567`, `△3,000`, `(1,200)`, `5억2천만원`, `32억4500만`.
//! [`parse_numeric`] folds them all into an `f64`.
//!
//! ## Compound numerals
//!
//! Large units are consumed in descending order. For each unit present the
//! text left of it is the coefficient (itself possibly built from 천/백/십
//! sub-multipliers) and the text right of it is parsed further:
//!
//! ```text
//! 1조2천억3천만
//! └┬┘└─┬─┘└─┬─┘
//!  1×10¹²  2000×10⁸  3×10⁷   = 1,200,030,000,000
//! ```

use crate::error::NumeralParseError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Large units in descending order of magnitude.
const UNITS: [(&str, f64); 5] = [
    ("조", 1e12),
    ("억", 1e8),
    ("천만", 1e7),
    ("백만", 1e6),
    ("만", 1e4),
];

/// Sub-multipliers allowed inside a coefficient.
const SUB_UNITS: [(char, f64); 3] = [('천', 1000.0), ('백', 100.0), ('십', 10.0)];

/// Noise stripped before parsing: currency, share and percent markers,
/// thousands separators.
const NOISE: [&str; 6] = ["원", "달러", "주", "$", "%", ","];

/// Parse a table cell into a number.
///
/// Returns `None` for empty cells, placeholders (`-`, `N/A`) and anything
/// that does not parse.
///
/// ```rust
/// use edgequake_docintel::pipeline::numeral::parse_numeric;
///
/// assert_eq!(parse_numeric("5억2천만"), Some(520_000_000.0));
/// assert_eq!(parse_numeric("△3억2천만"), Some(-320_000_000.0));
/// assert_eq!(parse_numeric("1,234원"), Some(1234.0));
/// assert_eq!(parse_numeric("N/A"), None);
/// ```
pub fn parse_numeric(cell: &str) -> Option<f64> {
    try_parse_numeric(cell).ok().flatten()
}

/// Fallible variant of [`parse_numeric`]: `Ok(None)` for placeholders,
/// `Err` when the cell has content that is not a number.
pub fn try_parse_numeric(cell: &str) -> Result<Option<f64>, NumeralParseError> {
    let trimmed = cell.trim();
    if is_placeholder(trimmed) {
        return Ok(None);
    }

    let (negative, body) = split_sign(trimmed);

    let mut cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    for noise in NOISE {
        cleaned = cleaned.replace(noise, "");
    }
    if cleaned.is_empty() {
        return Err(error(cell, "no digits left after stripping units"));
    }

    let value = if UNITS.iter().any(|(unit, _)| cleaned.contains(unit)) {
        parse_compound(&cleaned).map_err(|reason| error(cell, reason))?
    } else {
        parse_decimal(&cleaned).ok_or_else(|| error(cell, "not a decimal number"))?
    };

    Ok(Some(if negative { -value } else { value }))
}

fn is_placeholder(s: &str) -> bool {
    s.is_empty() || s == "-" || s == "—" || s.eq_ignore_ascii_case("n/a")
}

/// Detect a negative marker and return the unsigned remainder.
fn split_sign(s: &str) -> (bool, &str) {
    for marker in ['-', '△', '▲'] {
        if let Some(rest) = s.strip_prefix(marker) {
            return (true, rest.trim_start());
        }
    }
    // Accounting notation: (1,200)
    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        return (true, inner.trim());
    }
    (false, s)
}

fn parse_compound(s: &str) -> Result<f64, &'static str> {
    let mut total = 0.0;
    let mut rest = s;

    for (unit, magnitude) in UNITS {
        let Some(pos) = rest.find(unit) else {
            continue;
        };
        let (left, right) = (&rest[..pos], &rest[pos + unit.len()..]);

        // "2천5백만" is 2500만, not 2천5 × 백만: leave it for the 만 pass.
        if magnitude < 1e8 && magnitude > 1e4 && left.contains(['천', '백', '십']) {
            continue;
        }

        total += parse_coefficient(left)? * magnitude;
        rest = right;
    }

    if !rest.is_empty() {
        total += parse_coefficient(rest)?;
    }
    Ok(total)
}

/// Parse a coefficient below 10⁴ such as `3`, `2천5백`, `천`, `1.5`.
///
/// An empty coefficient counts as 1 (`억` alone is 10⁸).
fn parse_coefficient(s: &str) -> Result<f64, &'static str> {
    if s.is_empty() {
        return Ok(1.0);
    }

    let mut total = 0.0;
    let mut rest = s;
    for (unit, magnitude) in SUB_UNITS {
        if let Some(pos) = rest.find(unit) {
            total += parse_digits(&rest[..pos], 1.0)? * magnitude;
            rest = &rest[pos + unit.len_utf8()..];
        }
    }
    if !rest.is_empty() {
        total += parse_digits(rest, 0.0)?;
    }
    Ok(total)
}

fn parse_digits(s: &str, empty: f64) -> Result<f64, &'static str> {
    if s.is_empty() {
        return Ok(empty);
    }
    parse_decimal(s).ok_or("invalid coefficient")
}

static RE_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+(\.\d*)?|\.\d+)$").unwrap());

/// ASCII digits with at most one decimal point. Exponents, `inf` and `NaN`
/// are rejected even though `f64::from_str` takes them.
fn parse_decimal(s: &str) -> Option<f64> {
    if !RE_DECIMAL.is_match(s) {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn error(input: &str, reason: &str) -> NumeralParseError {
    NumeralParseError {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
