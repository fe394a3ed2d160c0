pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod geo;
pub mod utils;

pub use adapters::{GeminiClient, LocalStorage, NominatimGeocoder};
pub use app::{CaseClassifier, ExtractionPipeline, GeocodePipeline};
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::EtlConfig;
pub use core::EtlEngine;
pub use geo::{RateLimitedResolver, TieredGeocodingPipeline};
pub use utils::error::{EtlError, Result};
