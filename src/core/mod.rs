pub mod etl;
pub mod orchestrator;
pub mod pipeline;

pub use crate::domain::model::{BatchOutput, BatchRequest, FlatRecord, ListMapping, Row};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
