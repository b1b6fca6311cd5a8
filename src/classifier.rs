use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::domain::Severity;
use crate::error::ClassifierError;

/// Maps free alert text to a severity.
///
/// Callers treat any error as "unset" and fall back to MEDIUM.
#[async_trait]
pub trait PriorityClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Severity, ClassifierError>;
}

/// Used when no classifier is configured; every call fails fast.
pub struct DisabledClassifier;

#[async_trait]
impl PriorityClassifier for DisabledClassifier {
    async fn classify(&self, _text: &str) -> Result<Severity, ClassifierError> {
        Err(ClassifierError::Disabled)
    }
}

const PROMPT: &str = "You triage alerts for a dairy and beef cattle herd. \n\
Classify the urgency of the following alert for the farm team. \n\
Answer with exactly one word: LOW, MEDIUM or HIGH. \n\
HIGH means an animal's health or a birth needs action within 48 hours. \n\
Alert:\n";

pub struct GeminiClassifier {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClassifier {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    async fn generate_content(&self, text: &str) -> Result<String, ClassifierError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{}{}", PROMPT, text) }]
            }],
            "generationConfig": { "temperature": 0.0, "maxOutputTokens": 8 }
        });

        let res = self.client.post(&url).json(&body).send().await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let message = res.text().await.unwrap_or_default();
            return Err(ClassifierError::Api { status, message });
        }

        let json: Value = res.json().await?;

        // candidates[0].content.parts[0].text
        json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ClassifierError::InvalidResponse("no text in Gemini response".into()))
    }
}

#[async_trait]
impl PriorityClassifier for GeminiClassifier {
    async fn classify(&self, text: &str) -> Result<Severity, ClassifierError> {
        let answer = self.generate_content(text).await?;
        parse_answer(&answer)
    }
}

/// Accepts the bare label, optionally wrapped in markdown fences or followed
/// by punctuation.
fn parse_answer(answer: &str) -> Result<Severity, ClassifierError> {
    let clean = answer
        .trim()
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    clean
        .split(|c: char| !c.is_alphabetic())
        .find_map(Severity::parse_label)
        .ok_or_else(|| ClassifierError::InvalidResponse(clean.to_string()))
}
