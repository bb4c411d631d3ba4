use std::path::PathBuf;
use thiserror::Error;

/// A data source could not be read or parsed as a whole.
///
/// Any `LoadError` halts the refresh pass; nothing partial is aggregated.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The configured source path does not exist.
    #[error("Data source not found: {0}")]
    SourceNotFound(PathBuf),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory source contains no `.jsonl` files.
    #[error("No JSONL files found in {0}")]
    NoDataFiles(PathBuf),

    /// A line is not a JSON object.
    #[error("Malformed data in {path} at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// A single row failed schema checks. The row is skipped and counted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is absent or null.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong type or an unparseable value.
    #[error("invalid value for `{field}`: {value}")]
    InvalidField { field: &'static str, value: String },

    /// A severity label outside Mild / Strong / Very Strong.
    #[error("unknown severity `{0}`")]
    UnknownSeverity(String),

    /// A numeric field that must not be negative.
    #[error("negative value for `{field}`: {value}")]
    NegativeValue { field: &'static str, value: f64 },
}

/// All errors surfaced to the presentation layer.
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Loading a data source failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A JSON document could not be parsed or produced.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the dashboard crates.
pub type Result<T> = std::result::Result<T, DashboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = LoadError::FileRead {
            path: PathBuf::from("/data/consultations.jsonl"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/consultations.jsonl"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_load_error_display_source_not_found() {
        let err = LoadError::SourceNotFound(PathBuf::from("/missing/dir"));
        assert_eq!(err.to_string(), "Data source not found: /missing/dir");
    }

    #[test]
    fn test_load_error_display_no_data_files() {
        let err = LoadError::NoDataFiles(PathBuf::from("/empty/dir"));
        assert_eq!(err.to_string(), "No JSONL files found in /empty/dir");
    }

    #[test]
    fn test_load_error_display_malformed() {
        let err = LoadError::Malformed {
            path: PathBuf::from("inv.jsonl"),
            line: 7,
            reason: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed data in inv.jsonl at line 7: expected value"
        );
    }

    #[test]
    fn test_validation_error_display() {
        assert_eq!(
            ValidationError::MissingField("severity").to_string(),
            "missing required field `severity`"
        );
        assert_eq!(
            ValidationError::UnknownSeverity("Moderate".to_string()).to_string(),
            "unknown severity `Moderate`"
        );
        let neg = ValidationError::NegativeValue {
            field: "response_time",
            value: -3.0,
        };
        assert_eq!(neg.to_string(), "negative value for `response_time`: -3");
    }

    #[test]
    fn test_dashboard_error_from_load_is_transparent() {
        let err: DashboardError = LoadError::NoDataFiles(PathBuf::from("/x")).into();
        assert_eq!(err.to_string(), "No JSONL files found in /x");
    }

    #[test]
    fn test_dashboard_error_display_config() {
        let err = DashboardError::Config("bad timezone".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad timezone");
    }

    #[test]
    fn test_dashboard_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DashboardError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_dashboard_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: DashboardError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
