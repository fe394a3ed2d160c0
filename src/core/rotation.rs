//! Sequential failover across interchangeable credentials.
//!
//! Every external call site (geocoding, text extraction) goes through
//! [`CredentialRotationCaller`]: the same action is attempted once per
//! credential, in pool order, until one attempt succeeds.

use crate::utils::error::{EtlError, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    label: String,
    secret: Option<String>,
}

impl Credential {
    pub fn new(label: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            secret: Some(secret.into()),
        }
    }

    /// For services that take no key.
    pub fn anonymous() -> Self {
        Self {
            label: "anonymous".to_string(),
            secret: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Ordered, immutable, never-empty list of credentials.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    credentials: Arc<[Credential]>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Result<Self> {
        if credentials.is_empty() {
            return Err(EtlError::ConfigError {
                message: "credential pool is empty".to_string(),
            });
        }
        Ok(Self {
            credentials: credentials.into(),
        })
    }

    pub fn anonymous() -> Self {
        Self {
            credentials: Arc::from(vec![Credential::anonymous()]),
        }
    }

    /// Reads one credential per environment variable, in order. Unset or
    /// empty variables are skipped; it is an error if none is set.
    pub fn from_env(variables: &[String]) -> Result<Self> {
        let credentials: Vec<Credential> = variables
            .iter()
            .filter_map(|name| match std::env::var(name) {
                Ok(value) if !value.trim().is_empty() => {
                    Some(Credential::new(name.clone(), value.trim()))
                }
                _ => {
                    tracing::debug!("credential variable {} is not set", name);
                    None
                }
            })
            .collect();

        if credentials.is_empty() {
            return Err(EtlError::ConfigError {
                message: format!(
                    "none of the credential variables is set: {}",
                    variables.join(", ")
                ),
            });
        }
        Ok(Self {
            credentials: credentials.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }
}

/// A structurally valid value that marks a failed call.
///
/// Downstream code must check [`Fallback::is_fallback`]; the shape alone
/// does not tell a fallback from a real answer.
pub trait Fallback {
    fn fallback() -> Self;
    fn is_fallback(&self) -> bool;
}

/// Every credential was tried and every attempt failed.
#[derive(Debug)]
pub struct RotationExhausted<E> {
    pub attempts: usize,
    pub last_error: Option<E>,
}

#[derive(Debug, Clone)]
pub struct CredentialRotationCaller {
    pool: CredentialPool,
    cooldown: Duration,
}

impl CredentialRotationCaller {
    pub fn new(pool: CredentialPool, cooldown: Duration) -> Self {
        Self { pool, cooldown }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Runs `action` under each credential in turn and returns the first
    /// success. A failed attempt is followed by the cooldown before the
    /// next credential; no credential is attempted twice.
    pub async fn try_each<T, E, F, Fut>(
        &self,
        mut action: F,
    ) -> std::result::Result<T, RotationExhausted<E>>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let total = self.pool.len();
        let mut last_error = None;

        for (index, credential) in self.pool.iter().enumerate() {
            match action(credential.clone()).await {
                Ok(value) => {
                    if index > 0 {
                        tracing::debug!(
                            credential = credential.label(),
                            "call succeeded after {} failed attempts",
                            index
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(
                        credential = credential.label(),
                        attempt = index + 1,
                        total,
                        "call failed: {}",
                        e
                    );
                    last_error = Some(e);
                    if index + 1 < total && !self.cooldown.is_zero() {
                        tokio::time::sleep(self.cooldown).await;
                    }
                }
            }
        }

        Err(RotationExhausted {
            attempts: total,
            last_error,
        })
    }

    /// Like [`try_each`](Self::try_each), but exhaustion yields
    /// `T::fallback()` instead of an error.
    pub async fn call<T, E, F, Fut>(&self, action: F) -> T
    where
        T: Fallback,
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        match self.try_each(action).await {
            Ok(value) => value,
            Err(exhausted) => {
                tracing::warn!(
                    attempts = exhausted.attempts,
                    "all credentials failed, returning fallback"
                );
                T::fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    struct Verdict(String);

    impl Fallback for Verdict {
        fn fallback() -> Self {
            Verdict("failed".to_string())
        }

        fn is_fallback(&self) -> bool {
            self.0 == "failed"
        }
    }

    fn pool(labels: &[&str]) -> CredentialPool {
        CredentialPool::new(
            labels
                .iter()
                .map(|label| Credential::new(*label, format!("secret-{label}")))
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_last_credential_succeeds_after_k_attempts() {
        let caller = CredentialRotationCaller::new(pool(&["k1", "k2", "k3", "k4"]), Duration::ZERO);
        let attempts = AtomicUsize::new(0);

        let verdict = caller
            .call(|credential| {
                attempts.fetch_add(1, Ordering::SeqCst);
                let ok = credential.label() == "k4";
                async move {
                    if ok {
                        Ok(Verdict(credential.secret().unwrap_or_default().to_string()))
                    } else {
                        Err("quota exceeded")
                    }
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(verdict, Verdict("secret-k4".to_string()));
        assert!(!verdict.is_fallback());
    }

    #[tokio::test]
    async fn test_exhausted_pool_returns_fallback() {
        let caller = CredentialRotationCaller::new(pool(&["k1", "k2", "k3"]), Duration::ZERO);
        let attempts = AtomicUsize::new(0);

        let verdict: Verdict = caller
            .call(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<Verdict, _>("unavailable") }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(verdict.is_fallback());
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let caller = CredentialRotationCaller::new(pool(&["k1", "k2", "k3"]), Duration::ZERO);
        let tried = std::sync::Mutex::new(Vec::new());

        let result = caller
            .try_each(|credential| {
                tried.lock().unwrap().push(credential.label().to_string());
                async { Ok::<_, String>(7) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(*tried.lock().unwrap(), vec!["k1".to_string()]);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let caller = CredentialRotationCaller::new(pool(&["k1", "k2"]), Duration::ZERO);

        let result = caller
            .try_each(|credential| async move { Err::<(), _>(format!("{} rejected", credential.label())) })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.last_error.as_deref(), Some("k2 rejected"));
    }

    #[tokio::test]
    async fn test_cooldown_between_credentials_only() {
        let caller = CredentialRotationCaller::new(pool(&["k1", "k2", "k3"]), Duration::from_millis(25));
        let start = Instant::now();

        let _ = caller
            .try_each(|_| async { Err::<(), _>("down") })
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(75 + 200));
    }

    #[test]
    fn test_empty_pool_is_a_config_error() {
        let err = CredentialPool::new(vec![]).unwrap_err();
        assert!(matches!(err, EtlError::ConfigError { .. }));
    }

    #[test]
    fn test_pool_from_env_skips_unset_variables() {
        std::env::set_var("GEO_ETL_TEST_KEY_A", "alpha");
        std::env::remove_var("GEO_ETL_TEST_KEY_B");
        std::env::set_var("GEO_ETL_TEST_KEY_C", "gamma");

        let pool = CredentialPool::from_env(&[
            "GEO_ETL_TEST_KEY_A".to_string(),
            "GEO_ETL_TEST_KEY_B".to_string(),
            "GEO_ETL_TEST_KEY_C".to_string(),
        ])
        .unwrap();
        let labels: Vec<_> = pool.iter().map(|c| c.label().to_string()).collect();
        assert_eq!(labels, vec!["GEO_ETL_TEST_KEY_A", "GEO_ETL_TEST_KEY_C"]);

        assert!(CredentialPool::from_env(&["GEO_ETL_TEST_KEY_B".to_string()]).is_err());

        std::env::remove_var("GEO_ETL_TEST_KEY_A");
        std::env::remove_var("GEO_ETL_TEST_KEY_C");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::new("GEMINI_API_KEY", "very-secret");
        let printed = format!("{:?}", credential);
        assert!(printed.contains("GEMINI_API_KEY"));
        assert!(!printed.contains("very-secret"));
    }
}
