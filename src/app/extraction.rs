//! Structured extraction of case fields from raw judicial text.
//!
//! Each question to the text model goes through the shared
//! [`CredentialRotationCaller`]; when every key fails the caller gets the
//! type's fallback, whose text fields all read
//! [`AUTO_CLASSIFICATION_FAILED`].

use crate::core::rotation::{CredentialRotationCaller, Fallback};
use crate::domain::model::is_missing;
use crate::domain::ports::TextModel;
use crate::geo::throttle::Throttle;
use crate::utils::error::ExtractionError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const AUTO_CLASSIFICATION_FAILED: &str = "Erro na classificação automática";

/// Written when the model found nothing for a field.
pub const NULL_VALUE: &str = "NULL";

pub const IMPACT_CATEGORIES: [&str; 16] = [
    "Poluição Hídrica",
    "Poluição do Solo",
    "Poluição do Ar e Sonora",
    "Desmatamento e Danos à Flora",
    "Incêndios e Queimadas",
    "Danos à Fauna",
    "Gestão Inadequada de Resíduos",
    "Ocupação e Construção Irregular",
    "Erosão, Assoreamento e Impactos Geológicos",
    "Extração Ilegal de Recursos Naturais",
    "Falhas e Riscos de Infraestrutura",
    "Impactos Sociais e à Saúde Pública",
    "Danos ao Patrimônio e Bens Públicos",
    "Infrações Administrativas e Legais",
    "Derramamento de Petróleo",
    "Dano Ambiental Genérico / Outros",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageAssessment {
    #[serde(rename = "isDanoAmbiental")]
    pub is_environmental_damage: bool,
    #[serde(rename = "justificativa")]
    pub justification: String,
}

impl DamageAssessment {
    pub const COLUMNS: [&'static str; 2] = ["isDanoAmbiental", "justificativa"];

    pub fn schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "isDanoAmbiental": { "type": "BOOLEAN" },
                "justificativa": { "type": "STRING" }
            },
            "required": ["isDanoAmbiental", "justificativa"]
        })
    }
}

impl Fallback for DamageAssessment {
    fn fallback() -> Self {
        Self {
            is_environmental_damage: false,
            justification: AUTO_CLASSIFICATION_FAILED.to_string(),
        }
    }

    fn is_fallback(&self) -> bool {
        self.justification == AUTO_CLASSIFICATION_FAILED
    }
}

/// The case fields pulled from one judgment. Values are kept as text;
/// numeric and boolean answers are rendered as the model sent them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseExtraction {
    #[serde(rename = "numero_processo", deserialize_with = "lenient_text")]
    pub process_number: String,
    #[serde(rename = "georreferencia", deserialize_with = "lenient_text")]
    pub location_text: String,
    #[serde(rename = "uf", deserialize_with = "lenient_text")]
    pub subdivision: String,
    #[serde(rename = "municipio", deserialize_with = "lenient_text")]
    pub locality: String,
    #[serde(rename = "responsavel", deserialize_with = "lenient_text")]
    pub responsible_party: String,
    #[serde(rename = "categoria_responsavel", deserialize_with = "lenient_text")]
    pub responsible_category: String,
    #[serde(rename = "tipo_impacto", deserialize_with = "lenient_text")]
    pub impact_type: String,
    #[serde(rename = "descricao_impacto", deserialize_with = "lenient_text")]
    pub impact_description: String,
    #[serde(rename = "data_impacto", deserialize_with = "lenient_text")]
    pub impact_date: String,
    #[serde(rename = "area_afetada", deserialize_with = "lenient_text")]
    pub affected_area: String,
    #[serde(rename = "unidade_area", deserialize_with = "lenient_text")]
    pub area_unit: String,
    #[serde(rename = "houve_compensacao", deserialize_with = "lenient_text")]
    pub has_compensation: String,
    #[serde(rename = "categoria_compensacao", deserialize_with = "lenient_text")]
    pub compensation_category: String,
    #[serde(rename = "tipo_multa", deserialize_with = "lenient_text")]
    pub fine_type: String,
    #[serde(rename = "valor_multa", deserialize_with = "lenient_text")]
    pub fine_amount: String,
    #[serde(rename = "valor_multa_diaria", deserialize_with = "lenient_text")]
    pub daily_fine_amount: String,
}

impl CaseExtraction {
    pub const COLUMNS: [&'static str; 16] = [
        "numero_processo",
        "georreferencia",
        "uf",
        "municipio",
        "responsavel",
        "categoria_responsavel",
        "tipo_impacto",
        "descricao_impacto",
        "data_impacto",
        "area_afetada",
        "unidade_area",
        "houve_compensacao",
        "categoria_compensacao",
        "tipo_multa",
        "valor_multa",
        "valor_multa_diaria",
    ];

    pub fn schema() -> Value {
        let properties: serde_json::Map<String, Value> = Self::COLUMNS
            .iter()
            .map(|column| {
                let kind = match *column {
                    "houve_compensacao" => "BOOLEAN",
                    _ => "STRING",
                };
                (column.to_string(), json!({ "type": kind }))
            })
            .collect();
        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": Self::COLUMNS,
        })
    }

    /// Values in [`COLUMNS`](Self::COLUMNS) order.
    pub fn values(&self) -> [&str; 16] {
        [
            self.process_number.as_str(),
            self.location_text.as_str(),
            self.subdivision.as_str(),
            self.locality.as_str(),
            self.responsible_party.as_str(),
            self.responsible_category.as_str(),
            self.impact_type.as_str(),
            self.impact_description.as_str(),
            self.impact_date.as_str(),
            self.affected_area.as_str(),
            self.area_unit.as_str(),
            self.has_compensation.as_str(),
            self.compensation_category.as_str(),
            self.fine_type.as_str(),
            self.fine_amount.as_str(),
            self.daily_fine_amount.as_str(),
        ]
    }

    fn filled_with(value: &str) -> Self {
        let v = || value.to_string();
        Self {
            process_number: v(),
            location_text: v(),
            subdivision: v(),
            locality: v(),
            responsible_party: v(),
            responsible_category: v(),
            impact_type: v(),
            impact_description: v(),
            impact_date: v(),
            affected_area: v(),
            area_unit: v(),
            has_compensation: v(),
            compensation_category: v(),
            fine_type: v(),
            fine_amount: v(),
            daily_fine_amount: v(),
        }
    }

    /// Row for a text that describes no environmental damage.
    pub fn not_applicable() -> Self {
        Self::filled_with(NULL_VALUE)
    }
}

impl Fallback for CaseExtraction {
    fn fallback() -> Self {
        Self::filled_with(AUTO_CLASSIFICATION_FAILED)
    }

    fn is_fallback(&self) -> bool {
        self.values().iter().all(|v| *v == AUTO_CLASSIFICATION_FAILED)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactCategory {
    #[serde(rename = "categoria_generalizada", deserialize_with = "lenient_text")]
    pub generalized_category: String,
}

impl ImpactCategory {
    pub const COLUMN: &'static str = "categoria_generalizada";

    pub fn schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "categoria_generalizada": { "type": "STRING", "enum": IMPACT_CATEGORIES }
            },
            "required": ["categoria_generalizada"]
        })
    }

    fn new(category: &str) -> Self {
        Self {
            generalized_category: category.to_string(),
        }
    }
}

impl Fallback for ImpactCategory {
    fn fallback() -> Self {
        Self::new(AUTO_CLASSIFICATION_FAILED)
    }

    fn is_fallback(&self) -> bool {
        self.generalized_category == AUTO_CLASSIFICATION_FAILED
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => NULL_VALUE.to_string(),
        other => other.to_string(),
    })
}

fn assessment_prompt(text: &str) -> String {
    format!(
        "Você é um especialista em direito ambiental. Analise o texto abaixo e responda \
         apenas se ele descreve um dano efetivo e direto ao meio ambiente natural (água, \
         solo, ar, fauna, flora ou paisagem) causado por ação ou omissão humana. Ignore \
         danos materiais, morais, ao consumidor ou patrimoniais sem relação com o meio \
         ambiente. Se houver dano ambiental, justifique em no máximo 20 palavras; caso \
         contrário, responda \"Não há dano ambiental\".\n\nTexto: {text}"
    )
}

fn extraction_prompt(text: &str) -> String {
    format!(
        "Você extrai dados de textos judiciais sobre danos socioambientais. Preencha cada \
         campo do esquema com a informação do texto e use NULL quando ela não existir. \
         Formatos: numero_processo \"0000000-00.0000.0.00.0000\"; georreferencia em graus, \
         minutos e segundos com hemisfério; uf como sigla; categoria_responsavel \"Pessoa \
         Física\" ou \"Pessoa Jurídica\"; descricao_impacto em até 30 palavras; data_impacto \
         DD/MM/AA; area_afetada em m2 ou ha, sem separador de milhar; tipo_multa 0 (única), \
         1 (diária) ou 2 (ambas); valores monetários com ponto decimal.\n\nTexto: {text}"
    )
}

fn category_prompt(impact_type: &str) -> String {
    format!(
        "Você é um especialista em meio ambiente e direito ambiental. Classifique o tipo de \
         impacto abaixo em exatamente uma destas categorias: {}.\n\nTipo de impacto: {impact_type}",
        IMPACT_CATEGORIES.join("; ")
    )
}

/// Asks the text model the three questions of the extraction flow.
pub struct CaseClassifier {
    model: Arc<dyn TextModel>,
    rotation: CredentialRotationCaller,
    throttle: Arc<Throttle>,
}

impl CaseClassifier {
    pub fn new(
        model: Arc<dyn TextModel>,
        rotation: CredentialRotationCaller,
        throttle: Arc<Throttle>,
    ) -> Self {
        Self {
            model,
            rotation,
            throttle,
        }
    }

    pub async fn assess(&self, text: &str) -> DamageAssessment {
        self.ask(&assessment_prompt(text), &DamageAssessment::schema())
            .await
    }

    pub async fn extract(&self, text: &str) -> CaseExtraction {
        self.ask(&extraction_prompt(text), &CaseExtraction::schema())
            .await
    }

    /// Maps a specific impact type onto one of [`IMPACT_CATEGORIES`].
    /// Missing types and exact category names are answered locally.
    pub async fn categorize(&self, impact_type: &str) -> ImpactCategory {
        let impact_type = impact_type.trim();
        if is_missing(impact_type) {
            return ImpactCategory::new(NULL_VALUE);
        }
        if impact_type == AUTO_CLASSIFICATION_FAILED {
            return ImpactCategory::fallback();
        }
        if let Some(category) = IMPACT_CATEGORIES
            .iter()
            .find(|c| c.eq_ignore_ascii_case(impact_type))
        {
            return ImpactCategory::new(category);
        }

        self.ask(&category_prompt(impact_type), &ImpactCategory::schema())
            .await
    }

    async fn ask<T>(&self, prompt: &str, schema: &Value) -> T
    where
        T: DeserializeOwned + Fallback,
    {
        let model = &self.model;
        let throttle = &self.throttle;

        self.rotation
            .call(|credential| async move {
                throttle.wait().await;
                tracing::debug!(credential = credential.label(), "querying text model");
                let text = model.generate(prompt, schema, &credential).await?;
                Ok::<T, ExtractionError>(serde_json::from_str(&text)?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rotation::{Credential, CredentialPool};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies from a script; an exhausted script answers with a 503.
    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<VecDeque<std::result::Result<String, u16>>>,
        keys: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<std::result::Result<&str, u16>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(String::from))
                        .collect(),
                ),
                keys: Mutex::default(),
            }
        }

        fn calls(&self) -> usize {
            self.keys.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn generate(
            &self,
            _prompt: &str,
            _schema: &Value,
            credential: &Credential,
        ) -> std::result::Result<String, ExtractionError> {
            self.keys.lock().unwrap().push(credential.label().to_string());
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Err(503));
            reply.map_err(|status| ExtractionError::Status {
                status,
                body: String::new(),
            })
        }
    }

    fn classifier(model: Arc<ScriptedModel>, keys: usize) -> CaseClassifier {
        let pool = CredentialPool::new(
            (1..=keys)
                .map(|n| Credential::new(format!("GEMINI_API_KEY_{n}"), format!("k{n}")))
                .collect(),
        )
        .unwrap();
        CaseClassifier::new(
            model,
            CredentialRotationCaller::new(pool, Duration::ZERO),
            Arc::new(Throttle::new(Duration::from_millis(1))),
        )
    }

    const EXTRACTION: &str = r#"{
        "numero_processo": "0001234-56.2019.8.04.0001",
        "georreferencia": "3°06'S 60°01'O",
        "uf": "AM",
        "municipio": "Manaus",
        "responsavel": "Madeireira X",
        "categoria_responsavel": "Pessoa Jurídica",
        "tipo_impacto": "Desmatamento de APP",
        "descricao_impacto": "Supressão de vegetação em área de preservação permanente.",
        "data_impacto": "12/03/19",
        "area_afetada": "15000",
        "unidade_area": "m2",
        "houve_compensacao": true,
        "categoria_compensacao": "Obrigações de Fazer (com custo)",
        "tipo_multa": 0,
        "valor_multa": 50000.5,
        "valor_multa_diaria": null
    }"#;

    #[tokio::test]
    async fn test_assessment_parses_model_answer() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(
            r#"{"isDanoAmbiental": true, "justificativa": "Desmatamento de APP."}"#,
        )]));
        let classifier = classifier(model.clone(), 2);

        let assessment = classifier.assess("texto").await;

        assert!(assessment.is_environmental_damage);
        assert!(!assessment.is_fallback());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_extraction_renders_values_as_text() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(EXTRACTION)]));
        let classifier = classifier(model, 1);

        let extraction = classifier.extract("texto").await;

        assert_eq!(extraction.subdivision, "AM");
        assert_eq!(extraction.has_compensation, "true");
        assert_eq!(extraction.fine_type, "0");
        assert_eq!(extraction.fine_amount, "50000.5");
        assert_eq!(extraction.daily_fine_amount, NULL_VALUE);
        assert_eq!(extraction.values()[3], "Manaus");
    }

    #[tokio::test]
    async fn test_rotates_past_failing_and_malformed_answers() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(429),
            Ok("not json"),
            Ok(r#"{"categoria_generalizada": "Desmatamento e Danos à Flora"}"#),
        ]));
        let classifier = classifier(model.clone(), 3);

        let category = classifier.categorize("Corte raso de mata nativa").await;

        assert_eq!(category.generalized_category, "Desmatamento e Danos à Flora");
        assert_eq!(
            *model.keys.lock().unwrap(),
            vec!["GEMINI_API_KEY_1", "GEMINI_API_KEY_2", "GEMINI_API_KEY_3"]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_yields_sentinel_everywhere() {
        let model = Arc::new(ScriptedModel::new(vec![Err(500), Err(500), Err(500)]));
        let classifier = classifier(model.clone(), 3);

        let extraction = classifier.extract("texto").await;

        assert_eq!(model.calls(), 3);
        assert!(extraction.is_fallback());
        assert!(extraction
            .values()
            .iter()
            .all(|v| *v == AUTO_CLASSIFICATION_FAILED));
    }

    #[tokio::test]
    async fn test_failed_assessment_is_not_damage() {
        let model = Arc::new(ScriptedModel::default());
        let classifier = classifier(model, 2);

        let assessment = classifier.assess("texto").await;

        assert!(assessment.is_fallback());
        assert!(!assessment.is_environmental_damage);
    }

    #[tokio::test]
    async fn test_categorize_answers_locally_when_possible() {
        let model = Arc::new(ScriptedModel::default());
        let classifier = classifier(model.clone(), 1);

        assert_eq!(classifier.categorize("NULL").await.generalized_category, NULL_VALUE);
        assert_eq!(
            classifier.categorize(" Derramamento de Petróleo ").await.generalized_category,
            "Derramamento de Petróleo"
        );
        assert!(classifier
            .categorize(AUTO_CLASSIFICATION_FAILED)
            .await
            .is_fallback());
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_schemas_list_every_column() {
        let schema = CaseExtraction::schema();
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 16);
        assert_eq!(properties["houve_compensacao"]["type"], "BOOLEAN");
        assert_eq!(schema["required"].as_array().unwrap().len(), 16);
    }
}
