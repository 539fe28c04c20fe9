use crate::domain::model::{BatchOutput, BatchStats, FlatRecord, ListMapping, RecordFailure, Row};
use crate::domain::schema::TableSchema;
use crate::domain::services::{
    conform_row, generate_schema, pad_row, Flattened, Flattener, GeneratedSchema,
    TimestampLayout, WideningPolicy,
};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_range, validate_table_name, Validate,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

pub const DEFAULT_CONCURRENCY: usize = 100;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const MAX_CONCURRENCY: usize = 10_000;

/// 單一批次的設定，建立 orchestrator 時傳入
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub table_name: String,
    pub namespace: String,
    pub id_field: String,
    pub timestamp_layout: TimestampLayout,
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub separator: String,
    pub widening: WideningPolicy,
    pub coerce_widened: bool,
}

impl BatchOptions {
    pub fn new(table_name: impl Into<String>, id_field: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self {
            namespace: format!("{}.avsc", table_name),
            table_name,
            id_field: id_field.into(),
            timestamp_layout: TimestampLayout::default(),
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            separator: "_".to_string(),
            widening: WideningPolicy::default(),
            coerce_widened: true,
        }
    }

    pub fn with_timestamp_layout(mut self, layout: TimestampLayout) -> Self {
        self.timestamp_layout = layout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_widening(mut self, widening: WideningPolicy) -> Self {
        self.widening = widening;
        self
    }

    pub fn with_coerce_widened(mut self, coerce: bool) -> Self {
        self.coerce_widened = coerce;
        self
    }
}

impl Validate for BatchOptions {
    fn validate(&self) -> Result<()> {
        validate_table_name("table_name", &self.table_name)?;
        validate_non_empty_string("id_field", &self.id_field)?;
        validate_non_empty_string("separator", &self.separator)?;
        validate_range("concurrency", self.concurrency, 1, MAX_CONCURRENCY)?;
        validate_range("queue_capacity", self.queue_capacity, 1, 1_000_000)?;
        Ok(())
    }
}

/// 擷取階段的彙整結果
struct Extraction {
    records: Vec<FlatRecord>,
    list_mappings: Vec<ListMapping>,
    failures: Vec<RecordFailure>,
}

/// 兩階段批次處理：平行攤平 → 屏障 → 單一寫入者建 schema → 平行補 null
pub struct BatchOrchestrator {
    options: Arc<BatchOptions>,
}

impl BatchOrchestrator {
    pub fn new(options: BatchOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options: Arc::new(options),
        })
    }

    pub async fn run(&self, records: Vec<serde_json::Value>) -> Result<BatchOutput> {
        let input_records = records.len();
        tracing::info!(
            "🚀 Processing batch for table '{}': {} records, {} workers",
            self.options.table_name,
            input_records,
            self.options.concurrency
        );

        // 階段一：攤平與陣列擷取
        let started = Instant::now();
        let extraction = self.extract_phase(records).await?;
        let extraction_time = started.elapsed();
        tracing::info!(
            "📦 Extraction finished: {} records, {} list mappings, {} failures",
            extraction.records.len(),
            extraction.list_mappings.len(),
            extraction.failures.len()
        );

        // 階段二：屏障之後才建立 schema
        let started = Instant::now();
        let (
            flat_records,
            GeneratedSchema {
                schema,
                timestamp_fields,
                widened_fields,
            },
        ) = self.schema_phase(extraction.records).await?;
        let schema_time = started.elapsed();
        tracing::info!(
            "🧩 Schema finalized: {} fields, {} widened, {} timestamp fields",
            schema.len(),
            widened_fields,
            timestamp_fields.len()
        );

        // schema 無法序列化時整批失敗，不交給下游編碼
        let schema_document = schema.to_json().map_err(|e| {
            tracing::error!("❌ Failed to serialize schema: {}", e);
            e
        })?;

        // 階段三：補 null
        let started = Instant::now();
        let flattened_records = flat_records.len();
        let rows = self
            .padding_phase(Arc::new(schema.clone()), flat_records)
            .await?;
        let padding_time = started.elapsed();
        tracing::info!("✅ Padded {} rows", rows.len());

        let stats = BatchStats {
            input_records,
            flattened_records,
            failed_records: extraction.failures.len(),
            list_mappings: extraction.list_mappings.len(),
            schema_fields: schema.len(),
            widened_fields,
            extraction_time,
            schema_time,
            padding_time,
        };

        Ok(BatchOutput {
            schema,
            schema_document,
            rows,
            list_mappings: extraction.list_mappings,
            timestamp_fields,
            failures: extraction.failures,
            stats,
        })
    }

    fn worker_count(&self, items: usize) -> usize {
        self.options.concurrency.min(items).max(1)
    }

    async fn extract_phase(&self, records: Vec<serde_json::Value>) -> Result<Extraction> {
        let capacity = self.options.queue_capacity;
        let (input_tx, input_rx) = mpsc::channel::<(usize, serde_json::Value)>(capacity);
        let input_rx = Arc::new(Mutex::new(input_rx));
        let (flat_tx, mut flat_rx) = mpsc::channel::<(usize, FlatRecord)>(capacity);
        let (list_tx, mut list_rx) = mpsc::channel::<(usize, Vec<ListMapping>)>(capacity);

        // 兩個匯流收集器
        let flat_collector = tokio::spawn(async move {
            let mut collected = Vec::new();
            while let Some(item) = flat_rx.recv().await {
                collected.push(item);
            }
            collected
        });
        let list_collector = tokio::spawn(async move {
            let mut collected = Vec::new();
            while let Some(item) = list_rx.recv().await {
                collected.push(item);
            }
            collected
        });

        let flattener = Arc::new(
            Flattener::new(&self.options.table_name, &self.options.id_field)
                .with_separator(&self.options.separator),
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.worker_count(records.len()) {
            let input_rx = Arc::clone(&input_rx);
            let flat_tx = flat_tx.clone();
            let list_tx = list_tx.clone();
            let flattener = Arc::clone(&flattener);

            workers.spawn(async move {
                let mut failures = Vec::new();
                loop {
                    let next = input_rx.lock().await.recv().await;
                    let Some((index, raw)) = next else {
                        break;
                    };

                    match flattener.flatten(raw) {
                        Ok(Flattened {
                            record,
                            list_mappings,
                        }) => {
                            if !list_mappings.is_empty()
                                && list_tx.send((index, list_mappings)).await.is_err()
                            {
                                break;
                            }
                            if flat_tx.send((index, record)).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            tracing::debug!(
                                "Worker {} skipped record {}: {}",
                                worker_id,
                                index,
                                error
                            );
                            failures.push(RecordFailure { index, error });
                        }
                    }
                }
                failures
            });
        }
        // 只讓 worker 持有接收端與傳送端，全部結束時通道才會關閉
        drop(input_rx);
        drop(flat_tx);
        drop(list_tx);

        for (index, raw) in records.into_iter().enumerate() {
            if input_tx.send((index, raw)).await.is_err() {
                tracing::error!("❌ All extraction workers exited before the queue drained");
                break;
            }
        }
        drop(input_tx);

        let mut failures = Vec::new();
        while let Some(joined) = workers.join_next().await {
            let mut worker_failures = joined.map_err(|e| EtlError::PipelineError {
                message: format!("Extraction worker failed: {}", e),
            })?;
            failures.append(&mut worker_failures);
        }

        let mut flat = flat_collector.await.map_err(|e| EtlError::PipelineError {
            message: format!("Record collector failed: {}", e),
        })?;
        let mut lists = list_collector.await.map_err(|e| EtlError::PipelineError {
            message: format!("List mapping collector failed: {}", e),
        })?;

        // 還原輸入順序，讓 schema 欄位順序固定
        flat.sort_by_key(|(index, _)| *index);
        lists.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|f| f.index);

        Ok(Extraction {
            records: flat.into_iter().map(|(_, record)| record).collect(),
            list_mappings: lists.into_iter().flat_map(|(_, items)| items).collect(),
            failures,
        })
    }

    async fn schema_phase(
        &self,
        mut records: Vec<FlatRecord>,
    ) -> Result<(Vec<FlatRecord>, GeneratedSchema)> {
        let options = Arc::clone(&self.options);

        // fold 移入單一任務，整個階段只有它能寫入 schema
        tokio::task::spawn_blocking(move || {
            let generated = generate_schema(
                &mut records,
                &options.table_name,
                &options.namespace,
                options.timestamp_layout.clone(),
                options.widening,
            );
            (records, generated)
        })
        .await
        .map_err(|e| EtlError::PipelineError {
            message: format!("Schema builder failed: {}", e),
        })
    }

    async fn padding_phase(
        &self,
        schema: Arc<TableSchema>,
        records: Vec<FlatRecord>,
    ) -> Result<Vec<Row>> {
        let capacity = self.options.queue_capacity;
        let coerce = self.options.coerce_widened;
        let (row_tx, row_rx) = mpsc::channel::<(usize, Row)>(capacity);
        let row_rx = Arc::new(Mutex::new(row_rx));
        let (done_tx, mut done_rx) = mpsc::channel::<(usize, Row)>(capacity);

        let collector = tokio::spawn(async move {
            let mut collected = Vec::new();
            while let Some(item) = done_rx.recv().await {
                collected.push(item);
            }
            collected
        });

        let mut workers = JoinSet::new();
        for _ in 0..self.worker_count(records.len()) {
            let row_rx = Arc::clone(&row_rx);
            let done_tx = done_tx.clone();
            let schema = Arc::clone(&schema);

            workers.spawn(async move {
                loop {
                    let next = row_rx.lock().await.recv().await;
                    let Some((index, mut row)) = next else {
                        break;
                    };
                    pad_row(&schema, &mut row);
                    if coerce {
                        conform_row(&schema, &mut row);
                    }
                    if done_tx.send((index, row)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(row_rx);
        drop(done_tx);

        for item in records.into_iter().enumerate() {
            if row_tx.send(item).await.is_err() {
                tracing::error!("❌ All padding workers exited before the queue drained");
                break;
            }
        }
        drop(row_tx);

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| EtlError::PipelineError {
                message: format!("Padding worker failed: {}", e),
            })?;
        }

        let mut rows = collector.await.map_err(|e| EtlError::PipelineError {
            message: format!("Row collector failed: {}", e),
        })?;
        rows.sort_by_key(|(index, _)| *index);
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }
}
