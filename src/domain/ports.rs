use crate::domain::model::{BatchOutput, BatchRequest};
use crate::domain::services::WideningPolicy;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 批次設定來源；`None` 表示沿用請求本身帶的值
pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn table_name(&self) -> Option<&str>;
    fn id_field(&self) -> Option<&str>;
    fn timestamp_format(&self) -> Option<&str>;
    fn concurrency(&self) -> usize;
    fn queue_capacity(&self) -> usize;
    fn separator(&self) -> &str;
    fn widening(&self) -> WideningPolicy;
    fn coerce_widened(&self) -> bool;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<BatchRequest>;
    async fn transform(&self, request: BatchRequest) -> Result<BatchOutput>;
    async fn load(&self, output: BatchOutput) -> Result<String>;
}
