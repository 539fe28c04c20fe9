use crate::domain::model::FlatRecord;
use crate::domain::schema::{FieldSchema, PrimitiveType, TableSchema, TimestampFieldSet};
use crate::domain::services::timestamp::TimestampLayout;
use crate::domain::value::{whole_number, Scalar};
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// 同一欄位出現兩種型別時的處理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WideningPolicy {
    /// 任何衝突都直接改為 string
    #[default]
    String,
    /// 數值之間先放寬成 double，其他衝突才改為 string
    Numeric,
}

impl WideningPolicy {
    pub fn widen(&self, existing: PrimitiveType, incoming: PrimitiveType) -> PrimitiveType {
        use PrimitiveType::*;

        match (existing, incoming) {
            (a, b) if a == b => return existing,
            // int 與 long 同屬整數，只差寬度
            (Int, Long) | (Long, Int) => return Long,
            _ => {}
        }
        match self {
            WideningPolicy::String => String,
            WideningPolicy::Numeric => match (existing, incoming) {
                (Int | Long | Float | Double, Int | Long | Float | Double) => Double,
                _ => String,
            },
        }
    }
}

impl FromStr for WideningPolicy {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(WideningPolicy::String),
            "numeric" => Ok(WideningPolicy::Numeric),
            _ => Err(EtlError::InvalidConfigValueError {
                field: "widening".to_string(),
                value: s.to_string(),
                reason: "Expected 'string' or 'numeric'".to_string(),
            }),
        }
    }
}

impl fmt::Display for WideningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WideningPolicy::String => f.write_str("string"),
            WideningPolicy::Numeric => f.write_str("numeric"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    Added,
    Unchanged,
    Widened {
        from: PrimitiveType,
        to: PrimitiveType,
    },
}

/// 一次完整 fold 的結果
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSchema {
    pub schema: TableSchema,
    pub timestamp_fields: TimestampFieldSet,
    pub widened_fields: usize,
}

/// schema 的唯一寫入者，必須在擷取階段結束後依序執行
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: TableSchema,
    positions: HashMap<String, usize>,
    timestamp_fields: TimestampFieldSet,
    null_seen: BTreeSet<String>,
    plain_seen: BTreeSet<String>,
    layout: TimestampLayout,
    policy: WideningPolicy,
    widened: usize,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            schema: TableSchema::new(name, namespace),
            positions: HashMap::new(),
            timestamp_fields: TimestampFieldSet::new(),
            null_seen: BTreeSet::new(),
            plain_seen: BTreeSet::new(),
            layout: TimestampLayout::default(),
            policy: WideningPolicy::default(),
            widened: 0,
        }
    }

    pub fn with_layout(mut self, layout: TimestampLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_policy(mut self, policy: WideningPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn add_field(&mut self, name: &str, primary_type: PrimitiveType) -> FieldChange {
        let Some(&position) = self.positions.get(name) else {
            tracing::debug!(
                "New field added to {}: {} ({})",
                self.schema.namespace,
                name,
                primary_type
            );
            self.positions.insert(name.to_string(), self.schema.fields.len());
            self.schema.fields.push(FieldSchema::new(name, primary_type));
            return FieldChange::Added;
        };

        let field = &mut self.schema.fields[position];
        let widened = self.policy.widen(field.primary_type, primary_type);
        if widened == field.primary_type {
            return FieldChange::Unchanged;
        }

        let from = field.primary_type;
        field.primary_type = widened;
        self.widened += 1;
        tracing::debug!(
            "Field {} widened from {} to {} after seeing {}",
            name,
            from,
            widened,
            primary_type
        );
        FieldChange::Widened { from, to: widened }
    }

    /// 推斷記錄中每個欄位的型別，並就地改寫整數化的浮點數與時間戳記
    pub fn observe(&mut self, record: &mut FlatRecord) {
        for (name, value) in record.iter_mut() {
            let primary_type = match value {
                Scalar::Null => {
                    // null 不參與型別比較
                    if !self.positions.contains_key(name) {
                        self.null_seen.insert(name.clone());
                    }
                    continue;
                }
                Scalar::Bool(_) => PrimitiveType::Boolean,
                Scalar::Int(i) => PrimitiveType::for_integer(*i),
                Scalar::Float(f) => match whole_number(*f) {
                    Some(i) => {
                        *value = Scalar::Int(i);
                        PrimitiveType::for_integer(i)
                    }
                    None => PrimitiveType::Double,
                },
                Scalar::String(s) => match self.layout.parse_micros(s) {
                    Some(micros) => {
                        *value = Scalar::Int(micros);
                        self.timestamp_fields.insert(name);
                        self.add_field(name, PrimitiveType::Long);
                        continue;
                    }
                    None => PrimitiveType::String,
                },
            };
            if !self.plain_seen.contains(name) {
                self.plain_seen.insert(name.clone());
            }
            self.add_field(name, primary_type);
        }
    }

    pub fn widened_fields(&self) -> usize {
        self.widened
    }

    pub fn finalize(mut self) -> (TableSchema, TimestampFieldSet) {
        let null_only: Vec<String> = std::mem::take(&mut self.null_seen)
            .into_iter()
            .filter(|name| !self.positions.contains_key(name))
            .collect();
        for name in null_only {
            self.add_field(&name, PrimitiveType::String);
        }

        // 只要出現過一個非時間的值，該欄位就不是時間欄位
        let plain_seen = self.plain_seen;
        let mut timestamp_fields = self.timestamp_fields;
        timestamp_fields.retain(|name| !plain_seen.contains(name));

        (self.schema, timestamp_fields)
    }
}

/// 依序走過所有記錄產生 schema
pub fn generate_schema(
    records: &mut [FlatRecord],
    name: &str,
    namespace: &str,
    layout: TimestampLayout,
    policy: WideningPolicy,
) -> GeneratedSchema {
    let mut builder = SchemaBuilder::new(name, namespace)
        .with_layout(layout)
        .with_policy(policy);
    for record in records.iter_mut() {
        builder.observe(record);
    }
    let widened_fields = builder.widened_fields();
    let (schema, timestamp_fields) = builder.finalize();
    GeneratedSchema {
        schema,
        timestamp_fields,
        widened_fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(pairs: &[(&str, Scalar)]) -> FlatRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn build(records: &mut [FlatRecord]) -> (TableSchema, TimestampFieldSet) {
        build_with(records, WideningPolicy::default())
    }

    fn build_with(
        records: &mut [FlatRecord],
        policy: WideningPolicy,
    ) -> (TableSchema, TimestampFieldSet) {
        let generated = generate_schema(records, "t", "t.avsc", TimestampLayout::default(), policy);
        (generated.schema, generated.timestamp_fields)
    }

    fn type_of(schema: &TableSchema, name: &str) -> PrimitiveType {
        schema.field(name).unwrap().primary_type
    }

    #[test]
    fn test_add_field_outcomes() {
        let mut builder = SchemaBuilder::new("t", "t.avsc");
        assert_eq!(builder.add_field("x", PrimitiveType::Int), FieldChange::Added);
        assert_eq!(
            builder.add_field("x", PrimitiveType::Int),
            FieldChange::Unchanged
        );
        assert_eq!(
            builder.add_field("x", PrimitiveType::Boolean),
            FieldChange::Widened {
                from: PrimitiveType::Int,
                to: PrimitiveType::String
            }
        );
        assert_eq!(
            builder.add_field("x", PrimitiveType::Int),
            FieldChange::Unchanged
        );
        assert_eq!(builder.widened_fields(), 1);
    }

    #[test]
    fn test_int_then_string_widens() {
        let mut records = vec![
            record(&[("x", Scalar::Int(5))]),
            record(&[("x", Scalar::String("hello".into()))]),
        ];
        let (schema, _) = build(&mut records);
        assert_eq!(type_of(&schema, "x"), PrimitiveType::String);
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn test_int_then_float_collapses_to_string() {
        let mut records = vec![
            record(&[("x", Scalar::Int(5))]),
            record(&[("x", Scalar::Float(5.5))]),
        ];
        let (schema, _) = build(&mut records);
        assert_eq!(type_of(&schema, "x"), PrimitiveType::String);
    }

    #[test]
    fn test_numeric_policy() {
        let policy = WideningPolicy::Numeric;
        assert_eq!(
            policy.widen(PrimitiveType::Int, PrimitiveType::Long),
            PrimitiveType::Long
        );
        assert_eq!(
            policy.widen(PrimitiveType::Long, PrimitiveType::Double),
            PrimitiveType::Double
        );
        assert_eq!(
            policy.widen(PrimitiveType::Int, PrimitiveType::Boolean),
            PrimitiveType::String
        );
        assert_eq!(
            policy.widen(PrimitiveType::Int, PrimitiveType::Double),
            PrimitiveType::Double
        );
        assert_eq!(
            WideningPolicy::String.widen(PrimitiveType::Int, PrimitiveType::Long),
            PrimitiveType::Long
        );
        assert_eq!(
            WideningPolicy::String.widen(PrimitiveType::Long, PrimitiveType::Int),
            PrimitiveType::Long
        );
    }

    #[test]
    fn test_small_and_large_integers_share_long() {
        for policy in [WideningPolicy::String, WideningPolicy::Numeric] {
            let mut records = vec![
                record(&[("x", Scalar::Int(1))]),
                record(&[("x", Scalar::Int(5_000_000_000))]),
                record(&[("x", Scalar::Float(7.0))]),
            ];
            let (schema, _) = build_with(&mut records, policy);
            assert_eq!(type_of(&schema, "x"), PrimitiveType::Long);
            assert_eq!(records[0].get("x"), Some(&Scalar::Int(1)));
            assert_eq!(records[2].get("x"), Some(&Scalar::Int(7)));
        }
    }

    #[test]
    fn test_generate_schema_counts_widenings() {
        let mut records = vec![
            record(&[("a", Scalar::Int(1)), ("b", Scalar::Bool(true))]),
            record(&[("a", Scalar::String("x".into())), ("b", Scalar::Bool(false))]),
        ];
        let generated = generate_schema(
            &mut records,
            "t",
            "t.avsc",
            TimestampLayout::default(),
            WideningPolicy::String,
        );
        assert_eq!(generated.widened_fields, 1);
        assert_eq!(generated.schema.len(), 2);
    }

    #[test]
    fn test_whole_float_folds_to_int() {
        let mut records = vec![record(&[("n", Scalar::Float(4.0))])];
        let (schema, _) = build(&mut records);
        assert_eq!(type_of(&schema, "n"), PrimitiveType::Int);
        assert_eq!(records[0].get("n"), Some(&Scalar::Int(4)));
    }

    #[test]
    fn test_fractional_float_is_double() {
        let mut records = vec![record(&[("n", Scalar::Float(4.25))])];
        let (schema, _) = build(&mut records);
        assert_eq!(type_of(&schema, "n"), PrimitiveType::Double);
        assert_eq!(records[0].get("n"), Some(&Scalar::Float(4.25)));
    }

    #[test]
    fn test_wide_integer_is_long() {
        let mut records = vec![record(&[("big", Scalar::Int(5_000_000_000))])];
        let (schema, _) = build(&mut records);
        assert_eq!(type_of(&schema, "big"), PrimitiveType::Long);
    }

    #[test]
    fn test_timestamp_detection() {
        let mut records = vec![record(&[(
            "created",
            Scalar::String("2023-01-01T00:00:00Z".into()),
        )])];
        let (schema, timestamps) = build(&mut records);
        assert_eq!(type_of(&schema, "created"), PrimitiveType::Long);
        assert_eq!(
            records[0].get("created"),
            Some(&Scalar::Int(1_672_531_200_000_000))
        );
        assert!(timestamps.contains("created"));
    }

    #[test]
    fn test_widened_timestamp_leaves_timestamp_set() {
        let mut records = vec![
            record(&[("when", Scalar::String("2023-01-01T00:00:00Z".into()))]),
            record(&[("when", Scalar::String("yesterday".into()))]),
        ];
        let (schema, timestamps) = build(&mut records);
        assert_eq!(type_of(&schema, "when"), PrimitiveType::String);
        assert!(timestamps.is_empty());
    }

    #[test]
    fn test_integer_then_timestamp_is_not_a_timestamp_field() {
        let mut records = vec![
            record(&[("t", Scalar::Int(5))]),
            record(&[("t", Scalar::String("2023-01-01T00:00:00Z".into()))]),
        ];
        let (schema, timestamps) = build_with(&mut records, WideningPolicy::Numeric);
        assert_eq!(type_of(&schema, "t"), PrimitiveType::Long);
        assert!(!timestamps.contains("t"));

        // 順序相反也一樣
        let mut records = vec![
            record(&[("t", Scalar::String("2023-01-01T00:00:00Z".into()))]),
            record(&[("t", Scalar::Int(5))]),
        ];
        let (_, timestamps) = build(&mut records);
        assert!(timestamps.is_empty());
    }

    #[test]
    fn test_timestamps_with_nulls_stay_timestamps() {
        let mut records = vec![
            record(&[("t", Scalar::Null)]),
            record(&[("t", Scalar::String("2023-01-01T00:00:00Z".into()))]),
            record(&[("t", Scalar::String("2023-01-02T00:00:00Z".into()))]),
        ];
        let (schema, timestamps) = build(&mut records);
        assert_eq!(type_of(&schema, "t"), PrimitiveType::Long);
        assert!(timestamps.contains("t"));
    }

    #[test]
    fn test_null_is_not_a_conflict() {
        let mut records = vec![
            record(&[("x", Scalar::Null)]),
            record(&[("x", Scalar::Bool(true))]),
            record(&[("x", Scalar::Null)]),
        ];
        let (schema, _) = build(&mut records);
        assert_eq!(type_of(&schema, "x"), PrimitiveType::Boolean);
    }

    #[test]
    fn test_null_only_field_registered_as_string() {
        let mut records = vec![record(&[("a", Scalar::Int(1)), ("gone", Scalar::Null)])];
        let (schema, _) = build(&mut records);
        assert_eq!(type_of(&schema, "gone"), PrimitiveType::String);
        assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["a", "gone"]);
    }

    #[test]
    fn test_field_set_is_order_independent() {
        let batch = vec![
            record(&[("a", Scalar::Int(1)), ("b", Scalar::String("x".into()))]),
            record(&[("b", Scalar::Int(2)), ("c", Scalar::Float(1.5))]),
            record(&[("d", Scalar::Bool(false))]),
        ];

        let mut forward = batch.clone();
        let mut backward: Vec<FlatRecord> = batch.into_iter().rev().collect();
        let (s1, _) = build(&mut forward);
        let (s2, _) = build(&mut backward);

        let set = |s: &TableSchema| -> HashSet<(String, PrimitiveType)> {
            s.fields
                .iter()
                .map(|f| (f.name.clone(), f.primary_type))
                .collect()
        };
        assert_eq!(set(&s1), set(&s2));
    }
}
