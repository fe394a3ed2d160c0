//! Extraction of a coordinate pair from free-text location references.
//!
//! Location text in case records is typed by hand or produced by the
//! extraction model, so the same reference shows up as
//! `23°33'01.8"S 46°38'00.0"W`, `23º33’01,8” S e 46º38’00,0” O` or
//! `Lat: -23.5505 Long: -46.6333`. [`parse`] accepts these and rejects
//! anything it would have to guess at:
//!
//! 1. Exactly two degrees/minutes/seconds references, one carrying a
//!    latitude hemisphere (`N`/`S`) and the other a longitude hemisphere
//!    (`E`/`L` east, `W`/`O` west).
//! 2. Only when no DMS reference is present: exactly two decimal numbers,
//!    assigned by `lat`/`lon` labels or by which one only fits the
//!    longitude range.
//!
//! Whatever strategy produced the pair, both axes are range-checked again
//! before a [`ParsedCoordinate`] is returned.

use crate::domain::model::ParsedCoordinate;
use regex::Regex;
use std::sync::LazyLock;

/// Degrees, minutes, optional seconds and hemisphere letter or word
/// (`S`, `Sul`, `Oeste`, `West`, ...). A match followed by another letter
/// is discarded in [`parse`].
static DMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(\d{1,3})\s*(?:°|DEG|GRAUS|\s)\s*(\d{1,2}(?:[.,]\d+)?)\s*(?:'|MIN|\s)\s*(?:(\d{1,2}(?:[.,]\d+)?)\s*(?:"|SEC|\s)\s*)?([NSEWLO])(?:UL|ORTE|ORTH|OUTH|ESTE|EST|AST)?"#,
    )
    .expect("valid regex")
});

/// Signed decimal number with an optional `lat`/`lon` label in front.
static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(lat(?:itude)?|lon(?:g(?:itude)?)?)\b\s*[:=]?\s*)?([+-]?\d+[.,]\d+)")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Latitude,
    Longitude,
}

#[derive(Debug, Clone, Copy)]
struct DmsReference {
    axis: Axis,
    value: f64,
}

/// Parses `text` into a coordinate pair, or `None` when the text holds no
/// unambiguous reference.
pub fn parse(text: &str) -> Option<ParsedCoordinate> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        return None;
    }

    let normalized = normalize_marks(text);
    let references: Vec<_> = DMS_RE
        .captures_iter(&normalized)
        .filter(|caps| ends_word(&normalized, caps))
        .collect();

    let (latitude, longitude) = if references.is_empty() {
        parse_decimal_pair(&normalized)?
    } else if references.len() == 2 {
        let first = dms_reference(&references[0])?;
        let second = dms_reference(&references[1])?;
        match (first.axis, second.axis) {
            (Axis::Latitude, Axis::Longitude) => (first.value, second.value),
            (Axis::Longitude, Axis::Latitude) => (second.value, first.value),
            _ => return None,
        }
    } else {
        tracing::trace!(count = references.len(), "ambiguous DMS references");
        return None;
    };

    ParsedCoordinate::new(latitude, longitude)
}

/// The hemisphere must not run into a longer word (`Sao`, `Leblon`), but
/// may be glued to the next reference (`...S46°...`).
fn ends_word(text: &str, caps: &regex::Captures<'_>) -> bool {
    caps.get(0).is_some_and(|m| {
        text[m.end()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphabetic())
    })
}

/// Folds the many degree, minute and second marks onto `°`, `'` and `"`.
fn normalize_marks(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| match c {
            'º' | '˚' | '⁰' => '°',
            '‘' | '’' | '`' | '´' | '′' | 'ʼ' => '\'',
            '“' | '”' | '″' | '„' => '"',
            other => other,
        })
        .collect();
    folded.replace("''", "\"")
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok()
}

fn dms_reference(caps: &regex::Captures<'_>) -> Option<DmsReference> {
    let degrees = parse_number(&caps[1])?;
    let minutes = parse_number(&caps[2])?;
    let seconds = match caps.get(3) {
        Some(m) => parse_number(m.as_str())?,
        None => 0.0,
    };
    if minutes >= 60.0 || seconds >= 60.0 {
        return None;
    }

    let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
    let (axis, sign) = match caps[4].to_ascii_uppercase().as_str() {
        "N" => (Axis::Latitude, 1.0),
        "S" => (Axis::Latitude, -1.0),
        "E" | "L" => (Axis::Longitude, 1.0),
        "W" | "O" => (Axis::Longitude, -1.0),
        _ => return None,
    };

    Some(DmsReference {
        axis,
        value: sign * magnitude,
    })
}

struct Decimal {
    label: Option<Axis>,
    value: f64,
    start: usize,
    end: usize,
    comma: bool,
}

/// Two standalone decimals; digits glued to other digits or dots (process
/// numbers, dates) are not coordinates.
///
/// Decimal commas are common in measurements (`15,5 ha`), so an unlabelled
/// comma pair only counts when nothing but whitespace or `;` separates it.
fn parse_decimal_pair(text: &str) -> Option<(f64, f64)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();

    for caps in DECIMAL_RE.captures_iter(text) {
        let number = caps.get(2)?;
        let before = number.start().checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(number.end()).copied();
        let glued = |b: Option<u8>| b.is_some_and(|b| b.is_ascii_digit() || b == b'.');
        if glued(before) || glued(after) {
            continue;
        }

        let label = caps.get(1).map(|m| {
            if m.as_str().to_ascii_lowercase().starts_with("lat") {
                Axis::Latitude
            } else {
                Axis::Longitude
            }
        });
        found.push(Decimal {
            label,
            value: parse_number(number.as_str())?,
            start: number.start(),
            end: number.end(),
            comma: number.as_str().contains(','),
        });
    }

    let [a, b] = found.as_slice() else {
        return None;
    };

    match (a.label, b.label) {
        (Some(Axis::Latitude), Some(Axis::Longitude)) => return Some((a.value, b.value)),
        (Some(Axis::Longitude), Some(Axis::Latitude)) => return Some((b.value, a.value)),
        _ => {}
    }

    if a.comma || b.comma {
        let gap = text[a.end..b.start].trim();
        if !(gap.is_empty() || gap == ";") {
            return None;
        }
    }

    let fits_latitude = |v: f64| (-90.0..=90.0).contains(&v);
    let fits_longitude = |v: f64| (-180.0..=180.0).contains(&v);
    match (fits_latitude(a.value), fits_latitude(b.value)) {
        (true, false) if fits_longitude(b.value) => Some((a.value, b.value)),
        (false, true) if fits_longitude(a.value) => Some((b.value, a.value)),
        _ => None,
    }
}
