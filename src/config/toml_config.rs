use crate::core::orchestrator::MAX_CONCURRENCY;
use crate::domain::services::{TimestampLayout, WideningPolicy};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_range, validate_table_name, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub input_path: Option<String>,
}

/// 覆寫請求中的批次欄位
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    pub table_name: Option<String>,
    pub id_field: Option<String>,
    pub timestamp_format: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub concurrency: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub separator: Option<String>,
    pub widening: Option<WideningPolicy>,
    pub coerce_widened: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub json_logs: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${INPUT_DIR})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.json_logs)
            .unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.source.input_path {
            validate_path("source.input_path", path)?;
        }
        if let Some(path) = &self.load.output_path {
            validate_path("load.output_path", path)?;
        }
        if let Some(table) = &self.batch.table_name {
            validate_table_name("batch.table_name", table)?;
        }
        if let Some(id_field) = &self.batch.id_field {
            validate_non_empty_string("batch.id_field", id_field)?;
        }
        if let Some(format) = &self.batch.timestamp_format {
            format.parse::<TimestampLayout>()?;
        }
        if let Some(concurrency) = self.pipeline.concurrency {
            validate_range("pipeline.concurrency", concurrency, 1, MAX_CONCURRENCY)?;
        }
        if let Some(capacity) = self.pipeline.queue_capacity {
            validate_range("pipeline.queue_capacity", capacity, 1, 1_000_000)?;
        }
        if let Some(separator) = &self.pipeline.separator {
            if separator.is_empty() {
                return Err(EtlError::InvalidConfigValueError {
                    field: "pipeline.separator".to_string(),
                    value: separator.clone(),
                    reason: "Separator cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}
