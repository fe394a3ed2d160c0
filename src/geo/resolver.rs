use crate::core::rotation::{Credential, CredentialRotationCaller};
use crate::domain::model::{GeocodeHit, GeocodeQuery, GeocodeResult, ParsedCoordinate};
use crate::domain::ports::Geocoder;
use crate::geo::cache::ResolutionCache;
use crate::geo::throttle::Throttle;
use crate::utils::error::GeocodeError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    /// Minimum spacing between two external lookups, process-wide.
    pub min_interval: Duration,
    /// Upper bound for one lookup.
    pub timeout: Duration,
    /// Rounds through the credential pool before a query is given up.
    pub max_attempts: u32,
    /// Pause between rounds after a transient failure.
    pub retry_wait: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1200),
            timeout: Duration::from_secs(15),
            max_attempts: 3,
            retry_wait: Duration::from_secs(5),
        }
    }
}

/// Cache-first, throttled, retrying front of a [`Geocoder`].
pub struct RateLimitedResolver {
    geocoder: Arc<dyn Geocoder>,
    rotation: CredentialRotationCaller,
    cache: Arc<ResolutionCache>,
    throttle: Arc<Throttle>,
    settings: ResolverSettings,
    lookups: AtomicU64,
}

impl RateLimitedResolver {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        rotation: CredentialRotationCaller,
        settings: ResolverSettings,
    ) -> Self {
        let throttle = Arc::new(Throttle::new(settings.min_interval));
        Self::with_shared(
            geocoder,
            rotation,
            settings,
            Arc::new(ResolutionCache::new()),
            throttle,
        )
    }

    /// Builds a resolver over an existing cache and throttle, e.g. one
    /// shared with another resolver hitting the same service.
    pub fn with_shared(
        geocoder: Arc<dyn Geocoder>,
        rotation: CredentialRotationCaller,
        settings: ResolverSettings,
        cache: Arc<ResolutionCache>,
        throttle: Arc<Throttle>,
    ) -> Self {
        Self {
            geocoder,
            rotation,
            cache,
            throttle,
            settings,
            lookups: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// External lookups issued so far, retries included.
    pub fn external_lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Resolves `query`, consulting and then populating the cache.
    pub async fn resolve(&self, query: &GeocodeQuery) -> GeocodeResult {
        if let Some(cached) = self.cache.get(query) {
            tracing::debug!(query = query.text(), "cache hit");
            return cached;
        }

        let result = self.lookup(query).await;
        self.cache.insert(query, result)
    }

    async fn lookup(&self, query: &GeocodeQuery) -> GeocodeResult {
        for attempt in 1..=self.settings.max_attempts {
            let outcome = self
                .rotation
                .try_each(|credential| self.attempt(query, credential))
                .await;

            match outcome {
                Ok(Some(hit)) => return Self::validate(query, hit),
                Ok(None) => {
                    tracing::debug!(query = query.text(), "no match");
                    return GeocodeResult::NotFound;
                }
                Err(exhausted) => {
                    let transient = exhausted
                        .last_error
                        .as_ref()
                        .is_some_and(GeocodeError::is_transient);
                    if !transient || attempt == self.settings.max_attempts {
                        tracing::warn!(
                            query = query.text(),
                            attempt,
                            "geocoding failed, recording as not found"
                        );
                        return GeocodeResult::NotFound;
                    }
                    tracing::warn!(
                        query = query.text(),
                        attempt,
                        "transient geocoding failure, retrying in {:?}",
                        self.settings.retry_wait
                    );
                    tokio::time::sleep(self.settings.retry_wait).await;
                }
            }
        }
        GeocodeResult::NotFound
    }

    async fn attempt(
        &self,
        query: &GeocodeQuery,
        credential: Credential,
    ) -> Result<Option<GeocodeHit>, GeocodeError> {
        self.throttle.wait().await;
        self.lookups.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            query = query.text(),
            credential = credential.label(),
            "geocoding"
        );

        let timeout = self.settings.timeout;
        match tokio::time::timeout(timeout, self.geocoder.geocode(query, &credential)).await {
            Ok(result) => result,
            Err(_) => Err(GeocodeError::Timeout(timeout)),
        }
    }

    fn validate(query: &GeocodeQuery, hit: GeocodeHit) -> GeocodeResult {
        match ParsedCoordinate::new(hit.latitude, hit.longitude) {
            Some(coordinate) => GeocodeResult::Found(coordinate),
            None => {
                tracing::warn!(
                    query = query.text(),
                    "geocoder returned an out-of-range coordinate ({}, {})",
                    hit.latitude,
                    hit.longitude
                );
                GeocodeResult::NotFound
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rotation::CredentialPool;
    use crate::geo::mock::{hit, ScriptedGeocoder};
    use tokio::time::Instant;

    fn fast_settings() -> ResolverSettings {
        ResolverSettings {
            min_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
            max_attempts: 3,
            retry_wait: Duration::from_millis(1),
        }
    }

    fn resolver(geocoder: Arc<ScriptedGeocoder>, settings: ResolverSettings) -> RateLimitedResolver {
        RateLimitedResolver::new(
            geocoder,
            CredentialRotationCaller::new(CredentialPool::anonymous(), Duration::ZERO),
            settings,
        )
    }

    #[tokio::test]
    async fn test_warm_cache_issues_one_call() {
        let geocoder = Arc::new(ScriptedGeocoder::always(-5.8099, -61.2999));
        let resolver = resolver(geocoder.clone(), fast_settings());
        let query = GeocodeQuery::new("Manicoré, AM, Brasil");

        let first = resolver.resolve(&query).await;
        let second = resolver.resolve(&query).await;

        assert_eq!(first, second);
        assert!(matches!(first, GeocodeResult::Found(_)));
        assert_eq!(geocoder.calls(), 1);
        assert_eq!(resolver.external_lookups(), 1);
        assert_eq!(resolver.cache().hits(), 1);
    }

    #[tokio::test]
    async fn test_no_match_is_cached() {
        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Ok(None)]));
        let resolver = resolver(geocoder.clone(), fast_settings());
        let query = GeocodeQuery::new("Lugar Nenhum, ZZ, Brasil");

        assert_eq!(resolver.resolve(&query).await, GeocodeResult::NotFound);
        assert_eq!(resolver.resolve(&query).await, GeocodeResult::NotFound);
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let geocoder = Arc::new(ScriptedGeocoder::new(vec![
            Err(GeocodeError::RateLimited),
            Err(GeocodeError::Status(503)),
            Ok(Some(hit(-3.1190, -60.0217))),
        ]));
        let resolver = resolver(geocoder.clone(), fast_settings());

        let result = resolver.resolve(&GeocodeQuery::new("Manaus, AM, Brasil")).await;

        assert!(matches!(result, GeocodeResult::Found(c) if (c.latitude + 3.119).abs() < 1e-9));
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded_and_failure_is_cached() {
        let geocoder = Arc::new(ScriptedGeocoder::new(
            (0..10).map(|_| Err(GeocodeError::RateLimited)).collect(),
        ));
        let resolver = resolver(geocoder.clone(), fast_settings());
        let query = GeocodeQuery::new("Manaus, AM, Brasil");

        assert_eq!(resolver.resolve(&query).await, GeocodeResult::NotFound);
        assert_eq!(geocoder.calls(), 3);

        assert_eq!(resolver.resolve(&query).await, GeocodeResult::NotFound);
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn test_definitive_failure_is_not_retried() {
        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Err(GeocodeError::Parse {
            message: "not an array".to_string(),
        })]));
        let resolver = resolver(geocoder.clone(), fast_settings());

        let result = resolver.resolve(&GeocodeQuery::new("Manaus, AM, Brasil")).await;

        assert_eq!(result, GeocodeResult::NotFound);
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let geocoder = Arc::new(
            ScriptedGeocoder::always(-3.0, -60.0).with_delay(Duration::from_millis(500)),
        );
        let settings = ResolverSettings {
            timeout: Duration::from_millis(20),
            max_attempts: 2,
            ..fast_settings()
        };
        let resolver = resolver(geocoder.clone(), settings);

        let result = resolver.resolve(&GeocodeQuery::new("Manaus, AM, Brasil")).await;

        assert_eq!(result, GeocodeResult::NotFound);
        assert_eq!(geocoder.calls(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_hit_is_not_found() {
        let geocoder = Arc::new(ScriptedGeocoder::new(vec![Ok(Some(hit(123.0, -60.0)))]));
        let resolver = resolver(geocoder.clone(), fast_settings());

        let result = resolver.resolve(&GeocodeQuery::new("Manaus, AM, Brasil")).await;

        assert_eq!(result, GeocodeResult::NotFound);
    }

    #[tokio::test]
    async fn test_rotates_to_next_credential_on_failure() {
        let geocoder = Arc::new(ScriptedGeocoder::new(vec![
            Err(GeocodeError::Status(401)),
            Ok(Some(hit(-3.0, -60.0))),
        ]));
        let pool = CredentialPool::new(vec![
            Credential::new("GEOCODER_KEY", "a"),
            Credential::new("GEOCODER_KEY_2", "b"),
        ])
        .unwrap();
        let resolver = RateLimitedResolver::new(
            geocoder.clone(),
            CredentialRotationCaller::new(pool, Duration::ZERO),
            fast_settings(),
        );

        let result = resolver.resolve(&GeocodeQuery::new("Manaus, AM, Brasil")).await;

        assert!(matches!(result, GeocodeResult::Found(_)));
        assert_eq!(geocoder.credentials(), vec!["GEOCODER_KEY", "GEOCODER_KEY_2"]);
    }

    #[tokio::test]
    async fn test_throttle_is_shared_by_concurrent_resolutions() {
        let geocoder = Arc::new(ScriptedGeocoder::always(-3.0, -60.0));
        let settings = ResolverSettings {
            min_interval: Duration::from_millis(30),
            ..fast_settings()
        };
        let resolver = Arc::new(resolver(geocoder.clone(), settings));
        let start = Instant::now();

        let handles: Vec<_> = ["Manaus", "Manicoré", "Parintins"]
            .into_iter()
            .map(|city| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    resolver
                        .resolve(&GeocodeQuery::new(&format!("{city}, AM, Brasil")))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(geocoder.calls(), 3);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
