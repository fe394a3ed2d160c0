use crate::domain::model::{CaseLocation, GeocodeQuery, PrecisionTag, Provenance, Resolution};
use crate::geo::coordinate;
use crate::geo::query::{place_query, region_query};
use crate::geo::resolver::RateLimitedResolver;

/// Assigns each case a coordinate and a precision tag, falling back from
/// the location text to a region lookup or a municipality lookup.
pub struct TieredGeocodingPipeline {
    resolver: RateLimitedResolver,
    country: String,
}

impl TieredGeocodingPipeline {
    pub fn new(resolver: RateLimitedResolver, country: impl Into<String>) -> Self {
        Self {
            resolver,
            country: country.into(),
        }
    }

    pub fn resolver(&self) -> &RateLimitedResolver {
        &self.resolver
    }

    pub async fn resolve(&self, location: &CaseLocation) -> Resolution {
        if let Some(parsed) = location.location_text.as_deref().and_then(coordinate::parse) {
            return Resolution::resolved(parsed, PrecisionTag::Exact);
        }

        let Some((query, tier)) = self.plan(location) else {
            return Resolution::unresolved(PrecisionTag::InsufficientData);
        };

        match self.resolver.resolve(&query).await.coordinate() {
            Some(found) => Resolution::resolved(found, tier).with_query(query),
            None => Resolution::unresolved(PrecisionTag::GeocodingFailed).with_query(query),
        }
    }

    /// The lookup a record needs, with the tag it earns on success.
    ///
    /// Region-based records use their region text and fall back to
    /// locality plus subdivision when it is missing. Place-based records
    /// only use locality plus subdivision.
    pub fn plan(&self, location: &CaseLocation) -> Option<(GeocodeQuery, PrecisionTag)> {
        let by_place = || {
            let locality = location.locality.as_deref()?;
            let subdivision = location.subdivision.as_deref()?;
            Some((
                place_query(locality, subdivision, &self.country),
                PrecisionTag::MunicipalityApprox,
            ))
        };

        match location.provenance {
            Provenance::RegionBased => location
                .region
                .as_deref()
                .filter(|region| !region.trim().is_empty())
                .map(|region| (region_query(region, &self.country), PrecisionTag::RegionApprox))
                .or_else(by_place),
            Provenance::PlaceBased => by_place(),
        }
    }
}
