use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Storage,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            EtlError::ApiError(_) => ErrorCategory::Network,
            EtlError::ZipError(_) | EtlError::IoError(_) => ErrorCategory::Storage,
            EtlError::CsvError(_)
            | EtlError::SerializationError(_)
            | EtlError::ProcessingError { .. }
            | EtlError::ValidationError { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::ConfigError { .. } | EtlError::ConfigValidationError { .. } => {
                "Check the TOML configuration file and the environment variables it references"
            }
            EtlError::MissingConfigError { .. } => "Add the missing field to the configuration",
            EtlError::InvalidConfigValueError { .. } => {
                "Correct the configuration value shown in the error message"
            }
            EtlError::ApiError(_) => "Check network connectivity and the service endpoint, then retry",
            EtlError::CsvError(_) => "Make sure the input file is a valid CSV export with a header row",
            EtlError::IoError(_) => "Check that the input file exists and the output directory is writable",
            EtlError::ZipError(_) => "Check free disk space in the output directory",
            EtlError::SerializationError(_) => "Inspect the input rows for malformed values",
            EtlError::ProcessingError { .. } | EtlError::ValidationError { .. } => {
                "Inspect the input data and rerun with --verbose for details"
            }
        }
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Network => format!("A remote service could not be reached: {}", self),
            ErrorCategory::Storage => format!("Reading or writing files failed: {}", self),
            ErrorCategory::Data => format!("The input data could not be processed: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

/// Failure of a single lookup against the geocoding service.
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Geocoding request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Geocoder responded with status {0}")]
    Status(u16),

    #[error("Parse error: {message}")]
    Parse { message: String },
}

impl GeocodeError {
    /// Whether another attempt at the same query could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GeocodeError::Http(e) => !e.is_decode() && !e.is_builder(),
            GeocodeError::Timeout(_) | GeocodeError::RateLimited => true,
            GeocodeError::Status(code) => *code >= 500,
            GeocodeError::Parse { .. } => false,
        }
    }
}

/// Failure of a structured text-extraction request.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Text model responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response shape: {message}")]
    Shape { message: String },

    #[error("Response does not match the expected schema: {0}")]
    Schema(#[from] serde_json::Error),
}
