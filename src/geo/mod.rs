pub mod cache;
pub mod coordinate;
pub mod query;
pub mod resolver;
pub mod throttle;
pub mod tiered;

#[cfg(test)]
pub(crate) mod mock;

pub use cache::ResolutionCache;
pub use resolver::{RateLimitedResolver, ResolverSettings};
pub use throttle::Throttle;
pub use tiered::TieredGeocodingPipeline;
