use crate::core::orchestrator::{BatchOptions, BatchOrchestrator};
use crate::core::{BatchOutput, BatchRequest, ConfigProvider, Pipeline, Storage};
use crate::domain::model::{BatchStats, ListMapping, RecordFailure};
use crate::domain::schema::TimestampFieldSet;
use crate::domain::services::TimestampLayout;
use crate::utils::error::{EtlError, Result};
use serde::Serialize;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// 批次附帶的說明檔，提供給建表與載入端
#[derive(Serialize)]
struct Manifest<'a> {
    table_name: &'a str,
    namespace: &'a str,
    timestamp_fields: &'a TimestampFieldSet,
    failures: &'a [RecordFailure],
    stats: &'a BatchStats,
}

pub struct FlattenPipeline<S: Storage, C: ConfigProvider> {
    source: S,
    sink: S,
    config: C,
}

impl<S: Storage, C: ConfigProvider> FlattenPipeline<S, C> {
    pub fn new(source: S, sink: S, config: C) -> Self {
        Self {
            source,
            sink,
            config,
        }
    }

    /// 設定值優先，其次才是請求中帶的值
    fn batch_options(&self, request: &BatchRequest) -> Result<BatchOptions> {
        let table_name = self
            .config
            .table_name()
            .filter(|s| !s.is_empty())
            .unwrap_or(request.table_name.as_str());
        if table_name.is_empty() {
            return Err(EtlError::ValidationError {
                message: "Batch request has no TableName and none is configured".to_string(),
            });
        }

        let id_field = self
            .config
            .id_field()
            .filter(|s| !s.is_empty())
            .unwrap_or(request.id_field.as_str());
        if id_field.is_empty() {
            return Err(EtlError::ValidationError {
                message: "Batch request has no IdField and none is configured".to_string(),
            });
        }

        let layout: TimestampLayout = self
            .config
            .timestamp_format()
            .or(request.timestamp_format.as_deref())
            .unwrap_or_default()
            .parse()?;

        Ok(BatchOptions::new(table_name, id_field)
            .with_timestamp_layout(layout)
            .with_concurrency(self.config.concurrency())
            .with_queue_capacity(self.config.queue_capacity())
            .with_separator(self.config.separator())
            .with_widening(self.config.widening())
            .with_coerce_widened(self.config.coerce_widened()))
    }
}

fn list_mappings_csv(mappings: &[ListMapping]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ListMapping::COLUMNS)?;
    for mapping in mappings {
        writer.write_record([
            mapping.table_name.as_str(),
            mapping.id_field.as_str(),
            mapping.key.as_str(),
            mapping.value_text().as_str(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for FlattenPipeline<S, C> {
    async fn extract(&self) -> Result<BatchRequest> {
        tracing::debug!("Reading batch request from: {}", self.config.input_path());
        let bytes = self.source.read_file(self.config.input_path()).await?;
        let request = BatchRequest::from_json_slice(&bytes)?;
        tracing::debug!(
            "Request table='{}' id_field='{}' records={}",
            request.table_name,
            request.id_field,
            request.data.len()
        );
        Ok(request)
    }

    async fn transform(&self, request: BatchRequest) -> Result<BatchOutput> {
        let options = self.batch_options(&request)?;
        let orchestrator = BatchOrchestrator::new(options)?;
        orchestrator.run(request.data).await
    }

    async fn load(&self, output: BatchOutput) -> Result<String> {
        let table = output.schema.name.as_str();
        let bundle_name = format!("{}.zip", table);

        tracing::debug!(
            "Creating ZIP bundle for {} rows and {} list mappings",
            output.rows.len(),
            output.list_mappings.len()
        );

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            // schema 文件
            zip.start_file::<_, ()>(format!("{}.avsc", table), FileOptions::default())?;
            zip.write_all(output.schema_document.as_bytes())?;

            // 補齊後的資料列
            zip.start_file::<_, ()>(format!("{}.json", table), FileOptions::default())?;
            zip.write_all(&serde_json::to_vec(&output.rows)?)?;

            // 陣列側表，沒有資料時不輸出
            if !output.list_mappings.is_empty() {
                zip.start_file::<_, ()>(
                    format!("{}.ListMappings.csv", table),
                    FileOptions::default(),
                )?;
                zip.write_all(&list_mappings_csv(&output.list_mappings)?)?;
            }

            let manifest = Manifest {
                table_name: table,
                namespace: &output.schema.namespace,
                timestamp_fields: &output.timestamp_fields,
                failures: &output.failures,
                stats: &output.stats,
            };
            zip.start_file::<_, ()>(format!("{}.manifest.json", table), FileOptions::default())?;
            zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;

            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.sink.write_file(&bundle_name, &zip_data).await?;

        Ok(format!("{}/{}", self.config.output_path(), bundle_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::WideningPolicy;
    use std::collections::HashMap;
    use std::io::Read;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn put(&self, path: &str, data: &[u8]) {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files
                .lock()
                .await
                .insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockConfig {
        table_name: Option<String>,
        id_field: Option<String>,
        timestamp_format: Option<String>,
    }

    impl ConfigProvider for MockConfig {
        fn input_path(&self) -> &str {
            "request.json"
        }

        fn output_path(&self) -> &str {
            "test_output"
        }

        fn table_name(&self) -> Option<&str> {
            self.table_name.as_deref()
        }

        fn id_field(&self) -> Option<&str> {
            self.id_field.as_deref()
        }

        fn timestamp_format(&self) -> Option<&str> {
            self.timestamp_format.as_deref()
        }

        fn concurrency(&self) -> usize {
            4
        }

        fn queue_capacity(&self) -> usize {
            8
        }

        fn separator(&self) -> &str {
            "_"
        }

        fn widening(&self) -> WideningPolicy {
            WideningPolicy::String
        }

        fn coerce_widened(&self) -> bool {
            true
        }
    }

    fn request(data: Vec<serde_json::Value>) -> BatchRequest {
        BatchRequest {
            table_name: "orders".to_string(),
            id_field: "id".to_string(),
            timestamp_format: None,
            data,
        }
    }

    fn zip_names(bytes: Vec<u8>) -> Vec<String> {
        let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_extract_reads_request() {
        let source = MockStorage::new();
        source
            .put(
                "request.json",
                br#"{"TableName": "orders", "IdField": "id", "Data": [{"id": 1}, {"id": 2}]}"#,
            )
            .await;
        let pipeline = FlattenPipeline::new(source, MockStorage::new(), MockConfig::default());

        let request = pipeline.extract().await.unwrap();
        assert_eq!(request.table_name, "orders");
        assert_eq!(request.data.len(), 2);
    }

    #[tokio::test]
    async fn test_extract_missing_file() {
        let pipeline = FlattenPipeline::new(
            MockStorage::new(),
            MockStorage::new(),
            MockConfig::default(),
        );
        assert!(matches!(
            pipeline.extract().await,
            Err(EtlError::IoError(_))
        ));
    }

    #[tokio::test]
    async fn test_transform_uses_config_overrides() {
        let config = MockConfig {
            table_name: Some("renamed".to_string()),
            ..Default::default()
        };
        let pipeline = FlattenPipeline::new(MockStorage::new(), MockStorage::new(), config);

        let output = pipeline
            .transform(request(vec![serde_json::json!({"id": 1})]))
            .await
            .unwrap();
        assert_eq!(output.schema.name, "renamed");
        assert_eq!(output.schema.namespace, "renamed.avsc");
    }

    #[tokio::test]
    async fn test_transform_requires_table_and_id() {
        let pipeline = FlattenPipeline::new(
            MockStorage::new(),
            MockStorage::new(),
            MockConfig::default(),
        );
        let mut bare = request(vec![]);
        bare.table_name.clear();
        assert!(matches!(
            pipeline.transform(bare).await,
            Err(EtlError::ValidationError { .. })
        ));

        let mut no_id = request(vec![]);
        no_id.id_field.clear();
        assert!(matches!(
            pipeline.transform(no_id).await,
            Err(EtlError::ValidationError { .. })
        ));
    }

    #[tokio::test]
    async fn test_transform_rejects_bad_timestamp_format() {
        let config = MockConfig {
            timestamp_format: Some("2006-01-02".to_string()),
            ..Default::default()
        };
        let pipeline = FlattenPipeline::new(MockStorage::new(), MockStorage::new(), config);
        assert!(matches!(
            pipeline.transform(request(vec![])).await,
            Err(EtlError::InvalidConfigValueError { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_writes_bundle() {
        let sink = MockStorage::new();
        let pipeline = FlattenPipeline::new(MockStorage::new(), sink.clone(), MockConfig::default());

        let output = pipeline
            .transform(request(vec![
                serde_json::json!({"id": 7, "tags": ["a", "b"]}),
                serde_json::json!({"id": 8, "note": "x"}),
            ]))
            .await
            .unwrap();
        let path = pipeline.load(output).await.unwrap();
        assert_eq!(path, "test_output/orders.zip");

        let bytes = sink.get_file("orders.zip").await.unwrap();
        assert_eq!(
            zip_names(bytes.clone()),
            vec![
                "orders.ListMappings.csv",
                "orders.avsc",
                "orders.json",
                "orders.manifest.json"
            ]
        );

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut csv_text = String::new();
        archive
            .by_name("orders.ListMappings.csv")
            .unwrap()
            .read_to_string(&mut csv_text)
            .unwrap();
        assert_eq!(
            csv_text,
            "tableName,idField,Key,Value\norders,7,tags,a\norders,7,tags,b\n"
        );
    }

    #[tokio::test]
    async fn test_load_without_list_mappings() {
        let sink = MockStorage::new();
        let pipeline = FlattenPipeline::new(MockStorage::new(), sink.clone(), MockConfig::default());

        let output = pipeline
            .transform(request(vec![serde_json::json!({"id": 1})]))
            .await
            .unwrap();
        pipeline.load(output).await.unwrap();

        let bytes = sink.get_file("orders.zip").await.unwrap();
        assert_eq!(
            zip_names(bytes),
            vec!["orders.avsc", "orders.json", "orders.manifest.json"]
        );
    }
}
