use crate::domain::model::Row;
use crate::domain::schema::{PrimitiveType, TableSchema};
use crate::domain::value::Scalar;

/// 補上 schema 中有、但該列沒有的欄位
pub fn pad_row(schema: &TableSchema, row: &mut Row) {
    for field in &schema.fields {
        if !row.contains_key(&field.name) {
            row.insert(field.name.clone(), Scalar::Null);
        }
    }
}

pub fn pad_rows(schema: &TableSchema, mut rows: Vec<Row>) -> Vec<Row> {
    for row in rows.iter_mut() {
        pad_row(schema, row);
    }
    rows
}

/// 欄位被放寬成 string 時，把非字串的值轉成文字
pub fn conform_row(schema: &TableSchema, row: &mut Row) {
    for field in &schema.fields {
        if field.primary_type != PrimitiveType::String {
            continue;
        }
        if let Some(value) = row.get_mut(&field.name) {
            match value {
                Scalar::Null | Scalar::String(_) => {}
                other => *other = Scalar::String(other.to_string()),
            }
        }
    }
}
