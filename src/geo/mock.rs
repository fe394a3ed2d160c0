use crate::core::rotation::Credential;
use crate::domain::model::{GeocodeHit, GeocodeQuery};
use crate::domain::ports::Geocoder;
use crate::utils::error::GeocodeError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Reply = Result<Option<GeocodeHit>, GeocodeError>;

/// Geocoder that answers from a script and records every request.
#[derive(Default)]
pub struct ScriptedGeocoder {
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl ScriptedGeocoder {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Answers every request with the same hit.
    pub fn always(latitude: f64, longitude: f64) -> Self {
        Self::new((0..64).map(|_| Ok(Some(hit(latitude, longitude)))).collect())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(query, _)| query.clone())
            .collect()
    }

    pub fn credentials(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, credential)| credential.clone())
            .collect()
    }
}

pub fn hit(latitude: f64, longitude: f64) -> GeocodeHit {
    GeocodeHit {
        latitude,
        longitude,
        display_name: None,
    }
}

#[async_trait]
impl Geocoder for ScriptedGeocoder {
    async fn geocode(&self, query: &GeocodeQuery, credential: &Credential) -> Reply {
        self.requests
            .lock()
            .unwrap()
            .push((query.text().to_string(), credential.label().to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.script.lock().unwrap().pop_front();
        reply.unwrap_or(Ok(None))
    }
}
