use crate::utils::error::{EtlError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> EtlError {
    EtlError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

/// Accepts only files whose extension is in `allowed` (case-insensitive).
pub fn validate_file_extension(field_name: &str, path: &str, allowed: &[&str]) -> Result<()> {
    validate_path(field_name, path)?;

    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(invalid(
            field_name,
            path,
            format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                ext,
                allowed.join(", ")
            ),
        )),
        None => Err(invalid(
            field_name,
            path,
            "File has no extension or invalid filename",
        )),
    }
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

/// Column names must be distinct so output columns never overwrite input ones.
pub fn validate_distinct(field_name: &str, values: &[&str]) -> Result<()> {
    for (i, value) in values.iter().enumerate() {
        validate_non_empty_string(field_name, value)?;
        if values[..i].contains(value) {
            return Err(invalid(field_name, value, "Column name is used twice"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("geocoder.endpoint", "https://nominatim.openstreetmap.org/search").is_ok());
        assert!(validate_url("geocoder.endpoint", "http://localhost:8080/search").is_ok());
        assert!(validate_url("geocoder.endpoint", "").is_err());
        assert!(validate_url("geocoder.endpoint", "nominatim").is_err());
        assert!(validate_url("geocoder.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("input.path", "docs/cases.csv", &["csv"]).is_ok());
        assert!(validate_file_extension("input.path", "docs/CASES.CSV", &["csv"]).is_ok());
        assert!(validate_file_extension("input.path", "docs/cases.xlsx", &["csv"]).is_err());
        assert!(validate_file_extension("input.path", "docs/cases", &["csv"]).is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("input.workers", 4, 1).is_ok());
        assert!(validate_positive_number("input.workers", 0, 1).is_err());
    }

    #[test]
    fn test_validate_distinct() {
        assert!(validate_distinct("load.columns", &["latitude", "longitude", "geo_precisao"]).is_ok());
        assert!(validate_distinct("load.columns", &["latitude", "latitude"]).is_err());
        assert!(validate_distinct("load.columns", &["latitude", " "]).is_err());
    }
}
