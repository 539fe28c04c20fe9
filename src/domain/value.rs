//! 解碼後 JSON 值的分類與扁平化後的純量型別

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// 單一 JSON 值的分類結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kind {
    Null,
    Bool,
    Int64,
    /// `whole` 表示小數部分為零且可放進 i64
    Float64 { whole: bool },
    String,
    Object,
    Array,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Bool => "boolean",
            Kind::Int64 => "integer",
            Kind::Float64 { .. } => "float",
            Kind::String => "string",
            Kind::Object => "object",
            Kind::Array => "array",
        }
    }
}

pub fn classify(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Bool,
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(_), _) => Kind::Int64,
            (None, Some(f)) => Kind::Float64 {
                whole: whole_number(f).is_some(),
            },
            // arbitrary_precision 未啟用時不會發生
            (None, None) => Kind::Float64 { whole: false },
        },
        Value::String(_) => Kind::String,
        Value::Object(_) => Kind::Object,
        Value::Array(_) => Kind::Array,
    }
}

/// JSON 解碼器會把 `4.0` 之類的整數值當成浮點數
pub fn whole_number(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63

    if f.is_finite() && f.fract() == 0.0 && f >= -LIMIT && f < LIMIT {
        Some(f as i64)
    } else {
        None
    }
}

/// 扁平記錄中的值：永遠不會是物件或陣列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// 能放進 i64 的數字保留為整數，其餘一律視為浮點數
    pub fn from_number(n: &Number) -> Scalar {
        match n.as_i64() {
            Some(i) => Scalar::Int(i),
            None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}
