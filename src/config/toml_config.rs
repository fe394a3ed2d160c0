use crate::core::rotation::CredentialPool;
use crate::domain::model::{CaseLocation, Provenance, Record};
use crate::domain::ports::ConfigProvider;
use crate::geo::query::fold_accents;
use crate::geo::resolver::ResolverSettings;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub pipeline: PipelineConfig,
    pub input: InputConfig,
    pub geocoder: GeocoderConfig,
    pub extraction: ExtractionConfig,
    pub load: LoadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "geo-etl".to_string(),
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub path: String,
    pub columns: ColumnMapping,
}

/// Input column names for the location fields of a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub location_text: String,
    pub locality: String,
    pub subdivision: String,
    pub provenance: String,
    pub region: String,
    /// Provenance values that route a record to the region lookup.
    pub region_based_sources: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            location_text: "georreferencia".to_string(),
            locality: "municipio".to_string(),
            subdivision: "uf".to_string(),
            provenance: "fonte".to_string(),
            region: "regiao".to_string(),
            region_based_sources: vec!["regiao".to_string()],
        }
    }
}

impl ColumnMapping {
    pub fn location(&self, record: &Record) -> CaseLocation {
        let provenance = match record.field(&self.provenance) {
            Some(source) if self.is_region_based(source) => Provenance::RegionBased,
            _ => Provenance::PlaceBased,
        };

        CaseLocation {
            location_text: record.field(&self.location_text).map(String::from),
            locality: record.field(&self.locality).map(String::from),
            subdivision: record.field(&self.subdivision).map(String::from),
            region: record.field(&self.region).map(String::from),
            provenance,
        }
    }

    fn is_region_based(&self, source: &str) -> bool {
        let source = fold_accents(source).to_lowercase();
        self.region_based_sources
            .iter()
            .any(|candidate| fold_accents(candidate.trim()).to_lowercase() == source)
    }
}

/// Names of the columns appended to every output row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputColumns {
    pub latitude: String,
    pub longitude: String,
    pub precision: String,
}

impl Default for OutputColumns {
    fn default() -> Self {
        Self {
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            precision: "geo_precisao".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub user_agent: String,
    /// Appended to every lookup query.
    pub country: String,
    pub country_codes: Option<String>,
    pub min_delay_ms: u64,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_wait_ms: u64,
    /// Empty means the service takes no key.
    pub credential_env: Vec<String>,
    pub key_param: Option<String>,
    pub cooldown_ms: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::adapters::nominatim::DEFAULT_ENDPOINT.to_string(),
            user_agent: concat!("geo-etl/", env!("CARGO_PKG_VERSION")).to_string(),
            country: "Brasil".to_string(),
            country_codes: None,
            min_delay_ms: 1200,
            timeout_seconds: 15,
            max_attempts: 3,
            retry_wait_ms: 5000,
            credential_env: Vec::new(),
            key_param: None,
            cooldown_ms: 0,
        }
    }
}

impl GeocoderConfig {
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            min_interval: Duration::from_millis(self.min_delay_ms),
            timeout: Duration::from_secs(self.timeout_seconds),
            max_attempts: self.max_attempts,
            retry_wait: Duration::from_millis(self.retry_wait_ms),
        }
    }

    pub fn credential_pool(&self) -> Result<CredentialPool> {
        if self.credential_env.is_empty() {
            Ok(CredentialPool::anonymous())
        } else {
            CredentialPool::from_env(&self.credential_env)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub endpoint: String,
    pub model: String,
    pub credential_env: Vec<String>,
    pub cooldown_ms: u64,
    /// Minimum spacing between two model calls.
    pub min_delay_ms: u64,
    pub timeout_seconds: u64,
    pub text_column: String,
    pub output_file: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::adapters::gemini::DEFAULT_ENDPOINT.to_string(),
            model: crate::adapters::gemini::DEFAULT_MODEL.to_string(),
            credential_env: std::iter::once("GEMINI_API_KEY".to_string())
                .chain((2..=5).map(|n| format!("GEMINI_API_KEY_{n}")))
                .collect(),
            cooldown_ms: 5000,
            min_delay_ms: 2000,
            timeout_seconds: 60,
            text_column: "texto".to_string(),
            output_file: "cases_extracted.csv".to_string(),
        }
    }
}

impl ExtractionConfig {
    pub fn credential_pool(&self) -> Result<CredentialPool> {
        CredentialPool::from_env(&self.credential_env)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub output_path: String,
    pub archive_name: String,
    pub columns: OutputColumns,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
            archive_name: "cases_geocoded.zip".to_string(),
            columns: OutputColumns::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    pub verbose: bool,
}

impl EtlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML after replacing `${VAR}` with the environment value.
    /// Unset variables are left as written.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);

        toml::from_str(&processed).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_RE
            .replace_all(content, |caps: &regex::Captures| {
                let name = &caps[1];
                std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
            })
            .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.input.path.trim().is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "input.path".to_string(),
            });
        }
        validation::validate_file_extension("input.path", &self.input.path, &["csv"])?;
        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_file_extension("load.archive_name", &self.load.archive_name, &["zip"])?;
        validation::validate_positive_number("pipeline.workers", self.pipeline.workers as u64, 1)?;

        let columns = &self.input.columns;
        for (field, value) in [
            ("input.columns.location_text", &columns.location_text),
            ("input.columns.locality", &columns.locality),
            ("input.columns.subdivision", &columns.subdivision),
        ] {
            validation::validate_non_empty_string(field, value)?;
        }
        let output = &self.load.columns;
        validation::validate_distinct(
            "load.columns",
            &[
                output.latitude.as_str(),
                output.longitude.as_str(),
                output.precision.as_str(),
            ],
        )?;

        validation::validate_url("geocoder.endpoint", &self.geocoder.endpoint)?;
        validation::validate_non_empty_string("geocoder.user_agent", &self.geocoder.user_agent)?;
        validation::validate_positive_number("geocoder.min_delay_ms", self.geocoder.min_delay_ms, 1)?;
        validation::validate_positive_number(
            "geocoder.timeout_seconds",
            self.geocoder.timeout_seconds,
            1,
        )?;
        validation::validate_positive_number(
            "geocoder.max_attempts",
            u64::from(self.geocoder.max_attempts),
            1,
        )?;

        validation::validate_url("extraction.endpoint", &self.extraction.endpoint)?;
        validation::validate_non_empty_string("extraction.model", &self.extraction.model)?;
        validation::validate_non_empty_string("extraction.text_column", &self.extraction.text_column)?;
        validation::validate_file_extension(
            "extraction.output_file",
            &self.extraction.output_file,
            &["csv"],
        )?;

        Ok(())
    }
}

impl ConfigProvider for EtlConfig {
    fn input_path(&self) -> &str {
        &self.input.path
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn workers(&self) -> usize {
        self.pipeline.workers
    }

    fn columns(&self) -> &ColumnMapping {
        &self.input.columns
    }

    fn output_columns(&self) -> &OutputColumns {
        &self.load.columns
    }

    fn archive_name(&self) -> &str {
        &self.load.archive_name
    }
}

impl Validate for EtlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(pairs: &[(&str, &str)]) -> Record {
        Record {
            data: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = EtlConfig::from_toml_str(
            r#"
[input]
path = "docs/cases.csv"
"#,
        )
        .unwrap();

        assert_eq!(config.input.path, "docs/cases.csv");
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.geocoder.min_delay_ms, 1200);
        assert_eq!(config.geocoder.timeout_seconds, 15);
        assert_eq!(config.geocoder.max_attempts, 3);
        assert_eq!(config.geocoder.country, "Brasil");
        assert_eq!(config.extraction.cooldown_ms, 5000);
        assert_eq!(config.extraction.credential_env.len(), 5);
        assert_eq!(config.extraction.credential_env[4], "GEMINI_API_KEY_5");
        assert_eq!(config.load.columns.precision, "geo_precisao");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let config = EtlConfig::from_toml_str(
            r#"
[pipeline]
name = "danos-ambientais"
workers = 2

[input]
path = "cases.csv"

[input.columns]
location_text = "coords"
region_based_sources = ["regional", "Região"]

[geocoder]
endpoint = "http://localhost:8080/search"
country_codes = "br"
min_delay_ms = 1100
max_attempts = 2
credential_env = ["GEOCODER_KEY"]
key_param = "key"

[load]
output_path = "./out"
archive_name = "mapa.zip"

[logging]
json = true
"#,
        )
        .unwrap();

        assert_eq!(config.pipeline.name, "danos-ambientais");
        assert_eq!(config.workers(), 2);
        assert_eq!(config.columns().location_text, "coords");
        assert_eq!(config.columns().locality, "municipio");
        assert_eq!(config.geocoder.country_codes.as_deref(), Some("br"));
        assert_eq!(
            config.geocoder.resolver_settings().min_interval,
            Duration::from_millis(1100)
        );
        assert_eq!(config.archive_name(), "mapa.zip");
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("GEO_ETL_TEST_INPUT", "from-env.csv");

        let config = EtlConfig::from_toml_str(
            r#"
[input]
path = "${GEO_ETL_TEST_INPUT}"

[load]
output_path = "${GEO_ETL_TEST_UNSET_VAR}"
"#,
        )
        .unwrap();

        assert_eq!(config.input.path, "from-env.csv");
        assert_eq!(config.load.output_path, "${GEO_ETL_TEST_UNSET_VAR}");

        std::env::remove_var("GEO_ETL_TEST_INPUT");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = EtlConfig::default();
        assert!(matches!(
            config.validate(),
            Err(EtlError::MissingConfigError { field }) if field == "input.path"
        ));

        config.input.path = "cases.xlsx".to_string();
        assert!(config.validate().is_err(), "unsupported extension");

        config.input.path = "cases.csv".to_string();
        assert!(config.validate().is_ok());

        config.pipeline.workers = 0;
        assert!(config.validate().is_err());
        config.pipeline.workers = 1;

        config.geocoder.max_attempts = 0;
        assert!(config.validate().is_err());
        config.geocoder.max_attempts = 3;

        config.geocoder.endpoint = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
        config.geocoder.endpoint = "https://example.com/search".to_string();

        config.load.columns.longitude = "latitude".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = EtlConfig::from_toml_str("[input\npath = 1").unwrap_err();
        assert!(matches!(err, EtlError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[input]\npath = \"file.csv\"\n").unwrap();

        let config = EtlConfig::from_file(file.path()).unwrap();
        assert_eq!(config.input_path(), "file.csv");
    }

    #[test]
    fn test_column_mapping_projects_location() {
        let mapping = ColumnMapping {
            region_based_sources: vec!["Região".to_string()],
            ..ColumnMapping::default()
        };

        let place = mapping.location(&record(&[
            ("georreferencia", "NULL"),
            ("municipio", " Manicoré "),
            ("uf", "AM"),
        ]));
        assert_eq!(place.location_text, None);
        assert_eq!(place.locality.as_deref(), Some("Manicoré"));
        assert_eq!(place.provenance, Provenance::PlaceBased);

        let region = mapping.location(&record(&[("fonte", "REGIAO"), ("regiao", "Baixada")]));
        assert_eq!(region.provenance, Provenance::RegionBased);
        assert_eq!(region.region.as_deref(), Some("Baixada"));
    }

    #[test]
    fn test_geocoder_pool_defaults_to_anonymous() {
        let pool = GeocoderConfig::default().credential_pool().unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool.iter().all(|c| c.secret().is_none()));
    }

    #[test]
    fn test_extraction_pool_requires_a_key() {
        let config = ExtractionConfig {
            credential_env: vec!["GEO_ETL_TEST_NEVER_SET".to_string()],
            ..ExtractionConfig::default()
        };
        let err = config.credential_pool().unwrap_err();
        assert_eq!(err.severity(), crate::utils::error::ErrorSeverity::Critical);
    }
}
