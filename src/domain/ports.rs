use crate::config::toml_config::{ColumnMapping, OutputColumns};
use crate::core::rotation::Credential;
use crate::domain::model::{Dataset, GeocodeHit, GeocodeQuery, TransformResult};
use crate::utils::error::{ExtractionError, GeocodeError, Result};
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn workers(&self) -> usize;
    fn columns(&self) -> &ColumnMapping;
    fn output_columns(&self) -> &OutputColumns;
    fn archive_name(&self) -> &str;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Dataset>;
    async fn transform(&self, data: Dataset) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}

/// Query-by-text lookup against a geocoding service.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the service answered and had no match.
    async fn geocode(
        &self,
        query: &GeocodeQuery,
        credential: &Credential,
    ) -> std::result::Result<Option<GeocodeHit>, GeocodeError>;
}

/// Generative model that answers a prompt with JSON matching `schema`.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
        credential: &Credential,
    ) -> std::result::Result<String, ExtractionError>;
}
