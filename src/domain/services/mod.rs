// 批次轉換的核心演算法：攤平、schema 推斷、時間偵測、補 null

pub mod flatten;
pub mod padding;
pub mod schema_builder;
pub mod timestamp;

pub use flatten::{Flattened, Flattener};
pub use padding::{conform_row, pad_row, pad_rows};
pub use schema_builder::{
    generate_schema, FieldChange, GeneratedSchema, SchemaBuilder, WideningPolicy,
};
pub use timestamp::TimestampLayout;
