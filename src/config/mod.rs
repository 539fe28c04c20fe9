pub mod cli;
pub mod toml_config;

use crate::core::orchestrator::{DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CAPACITY, MAX_CONCURRENCY};
use crate::core::ConfigProvider;
use crate::domain::services::{TimestampLayout, WideningPolicy};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_path, validate_range, validate_table_name, Validate};
#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};
use toml_config::TomlConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "flat-etl")]
#[command(about = "Flatten nested JSON records into one table schema plus list mappings")]
pub struct CliConfig {
    /// Batch request JSON ({TableName, IdField, Data}) or a bare array of records
    #[arg(short, long)]
    pub input: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Overrides TableName from the request
    #[arg(long)]
    pub table_name: Option<String>,

    /// Overrides IdField from the request
    #[arg(long)]
    pub id_field: Option<String>,

    /// rfc3339 (default), rfc2822 or a strftime pattern
    #[arg(long)]
    pub timestamp_format: Option<String>,

    #[arg(long, help = "Worker pool size per phase")]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub queue_capacity: Option<usize>,

    #[arg(long)]
    pub separator: Option<String>,

    /// string (any conflict becomes string) or numeric (int -> long -> double first)
    #[arg(long)]
    pub widening: Option<WideningPolicy>,

    #[arg(long, help = "Keep original values in fields widened to string")]
    pub no_coerce: bool,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 合併命令列與 TOML 設定，命令列優先
    pub fn resolve(&self) -> Result<RunConfig> {
        let file = match &self.config {
            Some(path) => {
                let file = TomlConfig::from_file(path)?;
                file.validate()?;
                file
            }
            None => TomlConfig::default(),
        };

        let input_path = self
            .input
            .clone()
            .or_else(|| file.source.input_path.clone())
            .ok_or_else(|| EtlError::MissingConfigError {
                field: "input".to_string(),
            })?;

        Ok(RunConfig {
            input_path,
            output_path: self
                .output_path
                .clone()
                .or_else(|| file.load.output_path.clone())
                .unwrap_or_else(|| "./output".to_string()),
            table_name: self.table_name.clone().or(file.batch.table_name.clone()),
            id_field: self.id_field.clone().or(file.batch.id_field.clone()),
            timestamp_format: self
                .timestamp_format
                .clone()
                .or(file.batch.timestamp_format.clone()),
            concurrency: self
                .concurrency
                .or(file.pipeline.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            queue_capacity: self
                .queue_capacity
                .or(file.pipeline.queue_capacity)
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            separator: self
                .separator
                .clone()
                .or(file.pipeline.separator.clone())
                .unwrap_or_else(|| "_".to_string()),
            widening: self.widening.or(file.pipeline.widening).unwrap_or_default(),
            coerce_widened: !self.no_coerce && file.pipeline.coerce_widened.unwrap_or(true),
            monitor: self.monitor || file.monitoring_enabled(),
            json_logs: self.json_logs || file.json_logs(),
        })
    }
}

/// 合併完成的執行設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub input_path: String,
    pub output_path: String,
    pub table_name: Option<String>,
    pub id_field: Option<String>,
    pub timestamp_format: Option<String>,
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub separator: String,
    pub widening: WideningPolicy,
    pub coerce_widened: bool,
    pub monitor: bool,
    pub json_logs: bool,
}

impl RunConfig {
    pub fn new(input_path: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            table_name: None,
            id_field: None,
            timestamp_format: None,
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            separator: "_".to_string(),
            widening: WideningPolicy::default(),
            coerce_widened: true,
            monitor: false,
            json_logs: false,
        }
    }
}

impl Validate for RunConfig {
    fn validate(&self) -> Result<()> {
        validate_path("input", &self.input_path)?;
        validate_path("output_path", &self.output_path)?;
        if let Some(table) = &self.table_name {
            validate_table_name("table_name", table)?;
        }
        if let Some(format) = &self.timestamp_format {
            format.parse::<TimestampLayout>()?;
        }
        validate_range("concurrency", self.concurrency, 1, MAX_CONCURRENCY)?;
        validate_range("queue_capacity", self.queue_capacity, 1, 1_000_000)?;
        if self.separator.is_empty() {
            return Err(EtlError::InvalidConfigValueError {
                field: "separator".to_string(),
                value: String::new(),
                reason: "Separator cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl ConfigProvider for RunConfig {
    fn input_path(&self) -> &str {
        &self.input_path
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    fn timestamp_format(&self) -> Option<&str> {
        self.timestamp_format.as_deref()
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    fn separator(&self) -> &str {
        &self.separator
    }

    fn widening(&self) -> WideningPolicy {
        self.widening
    }

    fn coerce_widened(&self) -> bool {
        self.coerce_widened
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_defaults() {
        let cli = CliConfig::parse_from(["flat-etl", "--input", "batch.json"]);
        let run = cli.resolve().unwrap();

        assert_eq!(run.input_path, "batch.json");
        assert_eq!(run.output_path, "./output");
        assert_eq!(run.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(run.widening, WideningPolicy::String);
        assert!(run.coerce_widened);
        assert!(run.validate().is_ok());
    }

    #[test]
    fn test_missing_input_is_reported() {
        let cli = CliConfig::parse_from(["flat-etl"]);
        assert!(matches!(
            cli.resolve(),
            Err(EtlError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_cli_overrides_toml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"[source]\ninput_path = \"from_file.json\"\n[pipeline]\nconcurrency = 8\nwidening = \"numeric\"\n",
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = CliConfig::parse_from([
            "flat-etl",
            "--config",
            path.as_str(),
            "--concurrency",
            "3",
            "--no-coerce",
        ]);
        let run = cli.resolve().unwrap();

        assert_eq!(run.input_path, "from_file.json");
        assert_eq!(run.concurrency, 3);
        assert_eq!(run.widening, WideningPolicy::Numeric);
        assert!(!run.coerce_widened);
    }

    #[test]
    fn test_invalid_widening_flag() {
        let parsed = CliConfig::try_parse_from(["flat-etl", "--widening", "lossy"]);
        assert!(parsed.is_err());
    }
}
