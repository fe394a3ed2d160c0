use crate::app::pipelines::table;
use crate::core::partition::{partition, worker_count};
use crate::core::{ConfigProvider, Dataset, Pipeline, Record, Storage, TransformResult};
use crate::domain::model::{CaseLocation, GeoSummary, Resolution};
use crate::geo::tiered::TieredGeocodingPipeline;
use crate::utils::error::{EtlError, Result};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

pub const CSV_FILE: &str = "cases_geocoded.csv";
pub const JSON_FILE: &str = "cases_geocoded.json";
pub const SUMMARY_FILE: &str = "summary.json";

/// Reads case rows, attaches a coordinate and precision tag to each one,
/// and writes the annotated table as a zip archive.
pub struct GeocodePipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    geocoding: Arc<TieredGeocodingPipeline>,
}

impl<S: Storage, C: ConfigProvider> GeocodePipeline<S, C> {
    pub fn new(storage: S, config: C, geocoding: TieredGeocodingPipeline) -> Self {
        Self {
            storage,
            config,
            geocoding: Arc::new(geocoding),
        }
    }

    pub fn geocoding(&self) -> &TieredGeocodingPipeline {
        &self.geocoding
    }

    /// Resolves every location on up to `workers` tasks that share the
    /// cache and throttle. Output order matches input order.
    async fn resolve_all(&self, locations: Vec<CaseLocation>) -> Result<Vec<Resolution>> {
        let total = locations.len();
        let workers = worker_count(total, self.config.workers());
        let chunks = partition(locations.into_iter().enumerate().collect(), workers)?;

        let mut handles = Vec::with_capacity(workers);
        for (worker, chunk) in chunks.into_iter().enumerate() {
            if chunk.is_empty() {
                continue;
            }
            let geocoding = Arc::clone(&self.geocoding);
            handles.push(tokio::spawn(async move {
                let mut resolved = Vec::with_capacity(chunk.len());
                for (index, location) in chunk {
                    let resolution = geocoding.resolve(&location).await;
                    tracing::debug!(
                        worker,
                        row = index + 1,
                        precision = resolution.precision.label(),
                        "row resolved"
                    );
                    resolved.push((index, resolution));
                }
                resolved
            }));
        }

        let mut slots: Vec<Option<Resolution>> = (0..total).map(|_| None).collect();
        for handle in handles {
            let resolved = handle.await.map_err(|e| EtlError::ProcessingError {
                message: format!("geocoding worker failed: {}", e),
            })?;
            for (index, resolution) in resolved {
                slots[index] = Some(resolution);
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| EtlError::ProcessingError {
                    message: format!("row {} was not resolved", index + 1),
                })
            })
            .collect()
    }

    fn annotate(&self, record: &Record, resolution: &Resolution) -> (Record, Value) {
        let output = self.config.output_columns();
        let mut annotated = record.clone();
        let mut json: Map<String, Value> = record
            .data
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        let (latitude, longitude) = match resolution.coordinate {
            Some(c) => (Some(c.latitude), Some(c.longitude)),
            None => (None, None),
        };
        for (column, value) in [(&output.latitude, latitude), (&output.longitude, longitude)] {
            annotated.data.insert(
                column.clone(),
                value.map(|v| v.to_string()).unwrap_or_default(),
            );
            json.insert(column.clone(), value.map_or(Value::Null, Value::from));
        }

        let label = resolution.precision.label();
        annotated
            .data
            .insert(output.precision.clone(), label.to_string());
        json.insert(output.precision.clone(), Value::from(label));

        (annotated, Value::Object(json))
    }

    fn log_summary(summary: &GeoSummary) {
        tracing::info!(
            total = summary.total,
            exact = summary.exact,
            region_approx = summary.region_approx,
            municipality_approx = summary.municipality_approx,
            geocoding_failed = summary.geocoding_failed,
            insufficient_data = summary.insufficient_data,
            "geocoding summary"
        );
        tracing::info!(
            external_lookups = summary.external_lookups,
            cache_hits = summary.cache_hits,
            "{} rows left without coordinates",
            summary.without_coordinates()
        );
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for GeocodePipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        let bytes = self.storage.read_file(self.config.input_path()).await?;
        let dataset = table::read_csv(&bytes)?;

        let columns = self.config.columns();
        for column in [&columns.location_text, &columns.locality, &columns.subdivision] {
            if !dataset.headers.contains(column) {
                tracing::warn!("input has no '{}' column, treating it as empty", column);
            }
        }

        Ok(dataset)
    }

    async fn transform(&self, data: Dataset) -> Result<TransformResult> {
        let columns = self.config.columns();
        let locations: Vec<CaseLocation> =
            data.records.iter().map(|r| columns.location(r)).collect();

        tracing::info!(records = locations.len(), "resolving locations");
        let resolutions = self.resolve_all(locations).await?;

        let mut summary = GeoSummary::tally(&resolutions);
        let resolver = self.geocoding.resolver();
        summary.external_lookups = resolver.external_lookups();
        summary.cache_hits = resolver.cache().hits();
        summary.generated_at = Some(chrono::Utc::now());
        Self::log_summary(&summary);

        let (processed_records, json_records) = data
            .records
            .iter()
            .zip(&resolutions)
            .map(|(record, resolution)| self.annotate(record, resolution))
            .unzip();

        let output = self.config.output_columns();
        Ok(TransformResult {
            headers: table::with_columns(
                &data.headers,
                &[
                    output.latitude.as_str(),
                    output.longitude.as_str(),
                    output.precision.as_str(),
                ],
            ),
            processed_records,
            json_records,
            summary: serde_json::to_value(&summary)?,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let csv = table::write_csv(&result.headers, &result.processed_records)?;
        let json = serde_json::to_vec_pretty(&result.json_records)?;
        let summary = serde_json::to_vec_pretty(&result.summary)?;

        let archive = table::zip_files(&[
            (CSV_FILE, csv.as_slice()),
            (JSON_FILE, json.as_slice()),
            (SUMMARY_FILE, summary.as_slice()),
        ])?;

        let output_path = Path::new(self.config.output_path())
            .join(self.config.archive_name())
            .to_string_lossy()
            .into_owned();
        tracing::debug!("writing archive ({} bytes)", archive.len());
        self.storage.write_file(&output_path, &archive).await?;

        Ok(output_path)
    }
}
