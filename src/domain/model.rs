use crate::domain::schema::{TableSchema, TimestampFieldSet};
use crate::domain::value::Scalar;
use crate::utils::error::{EtlError, MalformedRecordError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 單層的欄位路徑 → 純量對應
pub type FlatRecord = BTreeMap<String, Scalar>;

/// 補齊 null 之後的輸出列
pub type Row = FlatRecord;

/// 陣列中的一個元素，與所屬記錄分開存放
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMapping {
    #[serde(rename = "tableName")]
    pub table_name: String,
    #[serde(rename = "idField")]
    pub id_field: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: serde_json::Value,
}

impl ListMapping {
    /// 側表固定為四個字串欄位
    pub const COLUMNS: [&'static str; 4] = ["tableName", "idField", "Key", "Value"];

    /// 字串元素原樣輸出，其他元素輸出 JSON 文字
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 從請求解析器收到的批次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(rename = "TableName", alias = "table_name", default)]
    pub table_name: String,
    #[serde(rename = "IdField", alias = "id_field", default)]
    pub id_field: String,
    #[serde(
        rename = "TimestampFormat",
        alias = "timestamp_format",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp_format: Option<String>,
    #[serde(rename = "Data", alias = "data")]
    pub data: Vec<serde_json::Value>,
}

impl BatchRequest {
    /// 接受完整的請求物件或單純的記錄陣列
    pub fn from_json_slice(bytes: &[u8]) -> crate::utils::error::Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        match value {
            serde_json::Value::Array(data) => Ok(Self {
                table_name: String::new(),
                id_field: String::new(),
                timestamp_format: None,
                data,
            }),
            other => Ok(serde_json::from_value(other)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    #[serde(serialize_with = "serialize_display")]
    pub error: MalformedRecordError,
}

fn serialize_display<S: serde::Serializer>(
    error: &MalformedRecordError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl From<RecordFailure> for EtlError {
    fn from(failure: RecordFailure) -> Self {
        EtlError::MalformedRecord {
            index: failure.index,
            source: failure.error,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub input_records: usize,
    pub flattened_records: usize,
    pub failed_records: usize,
    pub list_mappings: usize,
    pub schema_fields: usize,
    pub widened_fields: usize,
    #[serde(with = "duration_millis")]
    pub extraction_time: Duration,
    #[serde(with = "duration_millis")]
    pub schema_time: Duration,
    #[serde(with = "duration_millis")]
    pub padding_time: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// 一個批次的完整輸出
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub schema: TableSchema,
    /// 已序列化的 schema 文件，交給編碼器使用
    pub schema_document: String,
    pub rows: Vec<Row>,
    pub list_mappings: Vec<ListMapping>,
    pub timestamp_fields: TimestampFieldSet,
    pub failures: Vec<RecordFailure>,
    pub stats: BatchStats,
}
