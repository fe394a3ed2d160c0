use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("starting ETL run");

        let dataset = self.pipeline.extract().await?;
        tracing::info!(
            records = dataset.records.len(),
            columns = dataset.headers.len(),
            "extracted"
        );

        let result = self.pipeline.transform(dataset).await?;
        tracing::info!(records = result.processed_records.len(), "transformed");

        let output_path = self.pipeline.load(result).await?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "output saved to {}",
            output_path
        );

        Ok(output_path)
    }
}
