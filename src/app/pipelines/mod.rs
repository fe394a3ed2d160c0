pub mod extraction_pipeline;
pub mod geocode_pipeline;
pub mod table;

pub use extraction_pipeline::ExtractionPipeline;
pub use geocode_pipeline::GeocodePipeline;
