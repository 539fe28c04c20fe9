use crate::utils::error::Result;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// 欄位的主要型別，序列化後為小寫名稱
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Int,
    Long,
    Float,
    Double,
    Boolean,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Boolean => "boolean",
        }
    }

    /// 依整數位寬選擇 int 或 long
    pub fn for_integer(value: i64) -> Self {
        if i32::try_from(value).is_ok() {
            PrimitiveType::Int
        } else {
            PrimitiveType::Long
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub primary_type: PrimitiveType,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, primary_type: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            primary_type,
        }
    }
}

impl Serialize for FieldSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FieldSchema", 2)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", &[self.primary_type.as_str(), "null"])?;
        state.end()
    }
}

/// 一個批次的扁平表格 schema，只增不減
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub name: String,
    pub namespace: String,
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            record_type: "record",
            name: name.into(),
            namespace: namespace.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 被重新解讀為時間戳記的欄位名稱
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TimestampFieldSet(BTreeSet<String>);

impl TimestampFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str) -> bool {
        if self.0.contains(name) {
            return false;
        }
        self.0.insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn retain<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.0.retain(|name| keep(name));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
