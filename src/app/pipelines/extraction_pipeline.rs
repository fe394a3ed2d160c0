use crate::app::extraction::{
    CaseClassifier, CaseExtraction, DamageAssessment, ImpactCategory, NULL_VALUE,
};
use crate::app::pipelines::table;
use crate::core::partition::{partition, worker_count};
use crate::core::rotation::Fallback;
use crate::core::{ConfigProvider, Dataset, Pipeline, Record, Storage, TransformResult};
use crate::utils::error::{EtlError, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Answers for one row of raw text.
#[derive(Debug, Clone)]
pub struct CaseAnswers {
    pub assessment: DamageAssessment,
    pub extraction: CaseExtraction,
    pub category: ImpactCategory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionSummary {
    pub total: usize,
    pub without_text: usize,
    pub environmental_damage: usize,
    pub no_damage: usize,
    pub failed_assessments: usize,
    pub failed_extractions: usize,
}

impl ExtractionSummary {
    fn tally(answers: &[Option<CaseAnswers>]) -> Self {
        let mut summary = Self {
            total: answers.len(),
            ..Self::default()
        };
        for answer in answers {
            let Some(answer) = answer else {
                summary.without_text += 1;
                continue;
            };
            if answer.assessment.is_fallback() {
                summary.failed_assessments += 1;
            } else if answer.assessment.is_environmental_damage {
                summary.environmental_damage += 1;
                if answer.extraction.is_fallback() {
                    summary.failed_extractions += 1;
                }
            } else {
                summary.no_damage += 1;
            }
        }
        summary
    }
}

/// Damage assessment first; extraction and categorization only run for
/// texts that describe environmental damage.
async fn answer_case(classifier: &CaseClassifier, text: &str) -> CaseAnswers {
    let assessment = classifier.assess(text).await;

    if assessment.is_fallback() {
        return CaseAnswers {
            assessment,
            extraction: CaseExtraction::fallback(),
            category: ImpactCategory::fallback(),
        };
    }
    if !assessment.is_environmental_damage {
        return CaseAnswers {
            assessment,
            extraction: CaseExtraction::not_applicable(),
            category: ImpactCategory {
                generalized_category: NULL_VALUE.to_string(),
            },
        };
    }

    let extraction = classifier.extract(text).await;
    let category = classifier.categorize(&extraction.impact_type).await;
    CaseAnswers {
        assessment,
        extraction,
        category,
    }
}

/// Reads raw judgment texts and writes one row of structured case fields
/// per input row.
pub struct ExtractionPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    classifier: Arc<CaseClassifier>,
    text_column: String,
    output_file: String,
}

impl<S: Storage, C: ConfigProvider> ExtractionPipeline<S, C> {
    pub fn new(
        storage: S,
        config: C,
        classifier: CaseClassifier,
        text_column: impl Into<String>,
        output_file: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            config,
            classifier: Arc::new(classifier),
            text_column: text_column.into(),
            output_file: output_file.into(),
        }
    }

    fn annotate(record: &Record, answers: Option<&CaseAnswers>) -> Record {
        let mut row = record.clone();
        let Some(answers) = answers else {
            return row;
        };

        let flag = if answers.assessment.is_environmental_damage {
            "True"
        } else {
            "False"
        };
        let [damage_column, justification_column] = DamageAssessment::COLUMNS;
        row.data.insert(damage_column.to_string(), flag.to_string());
        row.data.insert(
            justification_column.to_string(),
            answers.assessment.justification.clone(),
        );
        for (column, value) in CaseExtraction::COLUMNS
            .iter()
            .zip(answers.extraction.values())
        {
            row.data.insert(column.to_string(), value.to_string());
        }
        row.data.insert(
            ImpactCategory::COLUMN.to_string(),
            answers.category.generalized_category.clone(),
        );
        row
    }

    fn output_columns() -> Vec<&'static str> {
        DamageAssessment::COLUMNS
            .into_iter()
            .chain(CaseExtraction::COLUMNS)
            .chain([ImpactCategory::COLUMN])
            .collect()
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for ExtractionPipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        let bytes = self.storage.read_file(self.config.input_path()).await?;
        let dataset = table::read_csv(&bytes)?;

        if !dataset.headers.contains(&self.text_column) {
            return Err(EtlError::ValidationError {
                message: format!("input has no '{}' column", self.text_column),
            });
        }
        Ok(dataset)
    }

    async fn transform(&self, data: Dataset) -> Result<TransformResult> {
        let texts: Vec<(usize, Option<String>)> = data
            .records
            .iter()
            .map(|r| r.field(&self.text_column).map(String::from))
            .enumerate()
            .collect();
        let total = texts.len();
        let workers = worker_count(total, self.config.workers());
        tracing::info!(records = total, workers, "classifying texts");

        let mut handles = Vec::with_capacity(workers);
        for (worker, chunk) in partition(texts, workers)?.into_iter().enumerate() {
            if chunk.is_empty() {
                continue;
            }
            let classifier = Arc::clone(&self.classifier);
            handles.push(tokio::spawn(async move {
                let mut answered = Vec::with_capacity(chunk.len());
                for (index, text) in chunk {
                    let answers = match text {
                        Some(text) => Some(answer_case(&classifier, &text).await),
                        None => {
                            tracing::warn!(row = index + 1, "row has no text, skipping");
                            None
                        }
                    };
                    tracing::debug!(worker, row = index + 1, "row classified");
                    answered.push((index, answers));
                }
                answered
            }));
        }

        let mut answers: Vec<Option<CaseAnswers>> = (0..total).map(|_| None).collect();
        for handle in handles {
            let answered = handle.await.map_err(|e| EtlError::ProcessingError {
                message: format!("extraction worker failed: {}", e),
            })?;
            for (index, answer) in answered {
                answers[index] = answer;
            }
        }

        let summary = ExtractionSummary::tally(&answers);
        tracing::info!(
            total = summary.total,
            environmental_damage = summary.environmental_damage,
            no_damage = summary.no_damage,
            failed_assessments = summary.failed_assessments,
            failed_extractions = summary.failed_extractions,
            without_text = summary.without_text,
            "extraction summary"
        );

        let processed_records: Vec<Record> = data
            .records
            .iter()
            .zip(&answers)
            .map(|(record, answer)| Self::annotate(record, answer.as_ref()))
            .collect();
        let json_records = processed_records
            .iter()
            .map(|r| serde_json::to_value(&r.data))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(TransformResult {
            headers: table::with_columns(&data.headers, &Self::output_columns()),
            processed_records,
            json_records,
            summary: serde_json::to_value(&summary)?,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let csv = table::write_csv(&result.headers, &result.processed_records)?;

        let output_path = Path::new(self.config.output_path())
            .join(&self.output_file)
            .to_string_lossy()
            .into_owned();
        self.storage.write_file(&output_path, &csv).await?;

        Ok(output_path)
    }
}
