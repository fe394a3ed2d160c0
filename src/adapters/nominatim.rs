//! Nominatim / OpenStreetMap free-form search client.
//!
//! The public instance allows about one request per second; pacing is the
//! resolver's job, this client issues exactly one request per call.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use crate::core::rotation::Credential;
use crate::domain::model::{GeocodeHit, GeocodeQuery};
use crate::domain::ports::Geocoder;
use crate::utils::error::{GeocodeError, Result};
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
    country_codes: Option<String>,
    key_param: Option<String>,
}

impl NominatimGeocoder {
    /// Nominatim rejects requests without an identifying user agent.
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            country_codes: None,
            key_param: None,
        })
    }

    /// Restricts matches to the given ISO 3166-1 codes, e.g. `br`.
    pub fn with_country_codes(mut self, codes: impl Into<String>) -> Self {
        self.country_codes = Some(codes.into());
        self
    }

    /// Sends the credential secret as this query parameter, for hosted
    /// instances that require a key.
    pub fn with_key_param(mut self, name: impl Into<String>) -> Self {
        self.key_param = Some(name.into());
        self
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(
        &self,
        query: &GeocodeQuery,
        credential: &Credential,
    ) -> std::result::Result<Option<GeocodeHit>, GeocodeError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("q", query.text()),
            ("format", "jsonv2"),
            ("limit", "1"),
        ];
        if let Some(codes) = self.country_codes.as_deref() {
            params.push(("countrycodes", codes));
        }
        if let (Some(name), Some(secret)) = (self.key_param.as_deref(), credential.secret()) {
            params.push((name, secret));
        }

        let resp = self.client.get(&self.endpoint).query(&params).send().await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(GeocodeError::Status(resp.status().as_u16()));
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Reads the first hit of a `jsonv2` search response.
fn parse_response(body: &serde_json::Value) -> std::result::Result<Option<GeocodeHit>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let latitude = number(&first["lat"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lat in Nominatim response".to_string(),
    })?;
    let longitude = number(&first["lon"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lon in Nominatim response".to_string(),
    })?;

    Ok(Some(GeocodeHit {
        latitude,
        longitude,
        display_name: first["display_name"].as_str().map(String::from),
    }))
}

// Nominatim sends coordinates as strings; some mirrors send numbers.
fn number(value: &serde_json::Value) -> Option<f64> {
    value
        .as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .or_else(|| value.as_f64())
}
