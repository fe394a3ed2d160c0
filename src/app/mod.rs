pub mod extraction;
pub mod pipelines;

pub use extraction::CaseClassifier;
pub use pipelines::{ExtractionPipeline, GeocodePipeline};

use crate::adapters::{GeminiClient, NominatimGeocoder};
use crate::config::toml_config::{ExtractionConfig, GeocoderConfig};
use crate::core::rotation::CredentialRotationCaller;
use crate::geo::{RateLimitedResolver, Throttle, TieredGeocodingPipeline};
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Nominatim-backed tiered geocoding with a fresh cache and throttle.
pub fn geocoding_from_config(config: &GeocoderConfig) -> Result<TieredGeocodingPipeline> {
    let settings = config.resolver_settings();
    let mut geocoder =
        NominatimGeocoder::new(&config.endpoint, &config.user_agent, settings.timeout)?;
    if let Some(codes) = &config.country_codes {
        geocoder = geocoder.with_country_codes(codes.clone());
    }
    if let Some(param) = &config.key_param {
        geocoder = geocoder.with_key_param(param.clone());
    }

    let rotation = CredentialRotationCaller::new(
        config.credential_pool()?,
        Duration::from_millis(config.cooldown_ms),
    );
    tracing::debug!(
        credentials = rotation.pool().len(),
        "geocoder ready at {}",
        config.endpoint
    );

    let resolver = RateLimitedResolver::new(Arc::new(geocoder), rotation, settings);
    Ok(TieredGeocodingPipeline::new(resolver, config.country.clone()))
}

/// Gemini-backed classifier. Fails when no API key is set.
pub fn classifier_from_config(config: &ExtractionConfig) -> Result<CaseClassifier> {
    let model = GeminiClient::new(
        &config.endpoint,
        &config.model,
        Duration::from_secs(config.timeout_seconds),
    )?;
    let rotation = CredentialRotationCaller::new(
        config.credential_pool()?,
        Duration::from_millis(config.cooldown_ms),
    );
    tracing::debug!(credentials = rotation.pool().len(), model = %config.model, "text model ready");

    Ok(CaseClassifier::new(
        Arc::new(model),
        rotation,
        Arc::new(Throttle::new(Duration::from_millis(config.min_delay_ms))),
    ))
}
