use crate::domain::model::{FlatRecord, ListMapping};
use crate::domain::value::{classify, whole_number, Scalar};
use crate::utils::error::MalformedRecordError;
use serde_json::{Map, Value};

type RecordId = std::result::Result<String, MalformedRecordError>;

/// 一筆原始記錄攤平後的結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flattened {
    pub record: FlatRecord,
    pub list_mappings: Vec<ListMapping>,
}

/// 把巢狀物件攤平成單層欄位，陣列則拆成 ListMapping
#[derive(Debug, Clone)]
pub struct Flattener {
    table_name: String,
    id_field: String,
    separator: String,
}

impl Flattener {
    pub fn new(table_name: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            id_field: id_field.into(),
            separator: "_".to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// 只有最外層呼叫回傳後，記錄才算完整
    pub fn flatten(&self, raw: Value) -> std::result::Result<Flattened, MalformedRecordError> {
        let object = match raw {
            Value::Object(object) => object,
            other => {
                return Err(MalformedRecordError::NotAnObject {
                    found: classify(&other).name(),
                })
            }
        };

        // id 只有在遇到陣列時才需要
        let id = self.record_id(&object);
        let mut out = Flattened::default();
        self.flatten_into(object, "", &id, &mut out)?;
        Ok(out)
    }

    fn flatten_into(
        &self,
        object: Map<String, Value>,
        prefix: &str,
        id: &RecordId,
        out: &mut Flattened,
    ) -> std::result::Result<(), MalformedRecordError> {
        for (key, value) in object {
            let full_key = if prefix.is_empty() {
                key
            } else {
                format!("{}{}{}", prefix, self.separator, key)
            };

            let scalar = match value {
                Value::Object(inner) => {
                    self.flatten_into(inner, &full_key, id, out)?;
                    continue;
                }
                Value::Array(items) => {
                    let id_value = id.as_ref().map_err(Clone::clone)?;
                    out.list_mappings
                        .extend(items.into_iter().map(|item| ListMapping {
                            table_name: self.table_name.clone(),
                            id_field: id_value.clone(),
                            key: full_key.clone(),
                            value: item,
                        }));
                    continue;
                }
                Value::Null => Scalar::Null,
                Value::Bool(b) => Scalar::Bool(b),
                Value::Number(n) => Scalar::from_number(&n),
                Value::String(s) => Scalar::String(s),
            };

            // 路徑重複時後寫入者勝出
            out.record.insert(full_key, scalar);
        }
        Ok(())
    }

    fn record_id(&self, object: &Map<String, Value>) -> RecordId {
        match object.get(&self.id_field) {
            None | Some(Value::Null) => Err(MalformedRecordError::MissingIdField {
                field: self.id_field.clone(),
            }),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            Some(Value::Number(n)) => Ok(match Scalar::from_number(n) {
                Scalar::Int(i) => i.to_string(),
                Scalar::Float(f) => whole_number(f)
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| f.to_string()),
                other => other.to_string(),
            }),
            Some(other) => Err(MalformedRecordError::UnsupportedIdValue {
                field: self.id_field.clone(),
                found: classify(other).name(),
            }),
        }
    }
}
