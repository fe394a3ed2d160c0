use crate::geo::query::fold_accents;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One spreadsheet row keyed by column header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, String>,
}

impl Record {
    /// Returns the trimmed value of `column`, or `None` when the cell is
    /// absent or holds a placeholder such as `NULL`.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.data
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !is_missing(v))
    }
}

/// Empty cells and the placeholders the extraction step writes for them.
pub fn is_missing(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("null") || value.eq_ignore_ascii_case("nan")
}

/// Rows read from the input file, with the original header order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub headers: Vec<String>,
    pub processed_records: Vec<Record>,
    /// Same rows as `processed_records` with typed values (numbers, nulls).
    pub json_records: Vec<serde_json::Value>,
    pub summary: serde_json::Value,
}

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParsedCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl ParsedCoordinate {
    /// Builds a coordinate only if both axes are finite and within range.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// Normalized geocoding request. `text` is sent to the service, `key`
/// identifies the query in the cache and ignores case and accents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GeocodeQuery {
    text: String,
    key: String,
}

impl GeocodeQuery {
    pub fn new(text: &str) -> Self {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let key = text
            .split(',')
            .map(|part| fold_accents(part.trim()).to_lowercase())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        Self { text, key }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for GeocodeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Cached outcome of a query. Misses are cached like hits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeocodeResult {
    Found(ParsedCoordinate),
    NotFound,
}

impl GeocodeResult {
    pub fn coordinate(&self) -> Option<ParsedCoordinate> {
        match self {
            GeocodeResult::Found(coordinate) => Some(*coordinate),
            GeocodeResult::NotFound => None,
        }
    }
}

/// Best match returned by the geocoding service.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: Option<String>,
}

/// How a record's coordinate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrecisionTag {
    Exact,
    RegionApprox,
    MunicipalityApprox,
    GeocodingFailed,
    InsufficientData,
}

impl PrecisionTag {
    pub const ALL: [PrecisionTag; 5] = [
        PrecisionTag::Exact,
        PrecisionTag::RegionApprox,
        PrecisionTag::MunicipalityApprox,
        PrecisionTag::GeocodingFailed,
        PrecisionTag::InsufficientData,
    ];

    /// Label written to the output table; the dashboard filters on these.
    pub fn label(self) -> &'static str {
        match self {
            PrecisionTag::Exact => "Precisa (Original)",
            PrecisionTag::RegionApprox => "Região (Aprox.)",
            PrecisionTag::MunicipalityApprox => "Município (Aprox.)",
            PrecisionTag::GeocodingFailed => "Falha na Geocodificação",
            PrecisionTag::InsufficientData => "Dados Insuficientes",
        }
    }

    pub fn has_coordinate(self) -> bool {
        matches!(
            self,
            PrecisionTag::Exact | PrecisionTag::RegionApprox | PrecisionTag::MunicipalityApprox
        )
    }
}

impl fmt::Display for PrecisionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for PrecisionTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Which fallback tier applies to a record that has no parseable coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provenance {
    RegionBased,
    #[default]
    PlaceBased,
}

/// The location fields of a case record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseLocation {
    pub location_text: Option<String>,
    pub locality: Option<String>,
    pub subdivision: Option<String>,
    pub region: Option<String>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub coordinate: Option<ParsedCoordinate>,
    pub precision: PrecisionTag,
    /// The geocoding query used, if the record reached the lookup tier.
    pub query: Option<GeocodeQuery>,
}

impl Resolution {
    pub fn resolved(coordinate: ParsedCoordinate, precision: PrecisionTag) -> Self {
        Self {
            coordinate: Some(coordinate),
            precision,
            query: None,
        }
    }

    pub fn unresolved(precision: PrecisionTag) -> Self {
        Self {
            coordinate: None,
            precision,
            query: None,
        }
    }

    pub fn with_query(mut self, query: GeocodeQuery) -> Self {
        self.query = Some(query);
        self
    }
}

/// Per-run counters, logged at the end of a run and written to `summary.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoSummary {
    pub total: usize,
    pub exact: usize,
    pub region_approx: usize,
    pub municipality_approx: usize,
    pub geocoding_failed: usize,
    pub insufficient_data: usize,
    pub external_lookups: u64,
    pub cache_hits: u64,
    pub generated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl GeoSummary {
    pub fn tally<'a>(resolutions: impl IntoIterator<Item = &'a Resolution>) -> Self {
        let mut summary = Self::default();
        for resolution in resolutions {
            summary.total += 1;
            match resolution.precision {
                PrecisionTag::Exact => summary.exact += 1,
                PrecisionTag::RegionApprox => summary.region_approx += 1,
                PrecisionTag::MunicipalityApprox => summary.municipality_approx += 1,
                PrecisionTag::GeocodingFailed => summary.geocoding_failed += 1,
                PrecisionTag::InsufficientData => summary.insufficient_data += 1,
            }
        }
        summary
    }

    pub fn without_coordinates(&self) -> usize {
        self.geocoding_failed + self.insufficient_data
    }
}
