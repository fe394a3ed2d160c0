use crate::core::rotation::Credential;
use crate::domain::ports::TextModel;
use crate::utils::error::{ExtractionError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// `generateContent` client constrained to JSON output.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: 1.0,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn request_body(&self, prompt: &str, schema: &Value) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
                "temperature": self.temperature,
            }
        })
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        schema: &Value,
        credential: &Credential,
    ) -> std::result::Result<String, ExtractionError> {
        let key = credential.secret().ok_or_else(|| ExtractionError::Shape {
            message: format!("credential {} has no key", credential.label()),
        })?;

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", key)
            .json(&self.request_body(prompt, schema))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().await?;
        response_text(&body)
    }
}

/// Text of the first candidate's first part.
fn response_text(body: &Value) -> std::result::Result<String, ExtractionError> {
    body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| ExtractionError::Shape {
            message: "response has no candidate text".to_string(),
        })
}
