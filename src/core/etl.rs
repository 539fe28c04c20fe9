use crate::core::Pipeline;
use crate::utils::error::{EtlError, Result};
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting ETL process...");
        self.monitor.log_stats("Start");

        // Extract
        let request = self.pipeline.extract().await?;
        tracing::info!("Extracted {} raw records", request.data.len());
        self.monitor.log_stats("Extract");

        // Transform
        let output = self.pipeline.transform(request).await?;
        tracing::info!(
            "Transformed {} rows into {} fields ({} list mappings, {} skipped)",
            output.rows.len(),
            output.schema.len(),
            output.list_mappings.len(),
            output.failures.len()
        );
        for failure in &output.failures {
            let error = EtlError::from(failure.clone());
            tracing::warn!(
                "⚠️ {} (Severity: {:?}). {}",
                error,
                error.severity(),
                error.recovery_suggestion()
            );
        }
        self.monitor.log_stats("Transform");

        // Load
        let output_path = self.pipeline.load(output).await?;
        tracing::info!("Output saved to: {}", output_path);
        self.monitor.log_stats("Load");
        self.monitor.log_final_stats();

        Ok(output_path)
    }
}
