use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Record {index} is malformed: {source}")]
    MalformedRecord {
        index: usize,
        #[source]
        source: MalformedRecordError,
    },

    #[error("Pipeline error: {message}")]
    PipelineError { message: String },
}

/// 單筆記錄的結構錯誤，只影響該筆記錄，不會中斷整個批次
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecordError {
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("record contains arrays but id field '{field}' is missing or null")]
    MissingIdField { field: String },

    #[error("id field '{field}' holds an unsupported {found} value")]
    UnsupportedIdValue { field: String, found: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::MalformedRecord { .. } => ErrorSeverity::Low,
            EtlError::ConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::ValidationError { .. } => ErrorSeverity::High,
            EtlError::SerializationError(_) | EtlError::CsvError(_) | EtlError::ZipError(_) => {
                ErrorSeverity::High
            }
            EtlError::IoError(_) => ErrorSeverity::Medium,
            EtlError::PipelineError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::MalformedRecord { .. } => {
                "Check the offending record; the rest of the batch was processed"
            }
            EtlError::ConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => {
                "Review the command line flags or the TOML configuration file"
            }
            EtlError::ValidationError { .. } => {
                "Make sure the request has TableName, IdField and Data set"
            }
            EtlError::SerializationError(_) => "Make sure the input is valid JSON",
            EtlError::IoError(_) => "Check that the input file exists and the output path is writable",
            EtlError::CsvError(_) | EtlError::ZipError(_) => {
                "Check free disk space and permissions on the output path"
            }
            EtlError::PipelineError { .. } => "Re-run with --verbose and report the log output",
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
