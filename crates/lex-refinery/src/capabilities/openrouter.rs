//! OpenRouter enrichment provider.
//!
//! This module provides the [`OpenRouterProvider`] which implements
//! [`TextCorrector`], [`LabelMatcher`] and [`ZeroShotClassifier`] on top of the
//! OpenRouter chat-completions API (<https://openrouter.ai/>).

use super::{CapabilityError, Classification, LabelMatcher, TextCorrector, ZeroShotClassifier};
use anyhow::{Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model used for enrichment calls.
const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Low temperature keeps answers close to deterministic.
const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Corrections and label maps are short.
const DEFAULT_MAX_TOKENS: u32 = 400;

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

/// Connection settings for [`OpenRouterProvider`].
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// Model slug, e.g. `"openai/gpt-4o-mini"`.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// HTTP timeout in seconds. The pipeline's call policy adds its own bound.
    pub timeout_secs: u64,
    /// Chat-completions endpoint; override for proxies.
    pub base_url: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl OpenRouterConfig {
    /// Defaults with a different model.
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// OpenRouter-backed enrichment provider.
///
/// # Example
///
/// ```rust,ignore
/// use lex_refinery::capabilities::{OpenRouterConfig, OpenRouterProvider};
/// use std::sync::Arc;
///
/// let config = OpenRouterConfig::with_model("openai/gpt-4o-mini");
/// let provider = Arc::new(OpenRouterProvider::with_config(api_key, config)?);
///
/// let pipeline = Pipeline::builder()
///     .text_corrector(provider.clone())
///     .label_matcher(provider)
///     .build()?;
/// ```
pub struct OpenRouterProvider {
    api_key: String,
    config: OpenRouterConfig,
    client: Client,
}

impl OpenRouterProvider {
    /// Provider with [`OpenRouterConfig::default`].
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, OpenRouterConfig::default())
    }

    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn with_config(api_key: impl Into<String>, config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            api_key: api_key.into(),
            config,
            client,
        })
    }

    /// Model used for every call.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn call_api(&self, prompt: &str) -> Result<String> {
        let request = OpenRouterRequest {
            model: self.config.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "lex-refinery")
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "OpenRouter API Error {}: {}",
                response.status(),
                response.text()?
            ));
        }

        let result: OpenRouterResponse = response.json()?;

        result
            .choices
            .as_ref()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.message.as_ref())
            .map(|msg| msg.content.clone())
            .ok_or_else(|| anyhow!("No response content from OpenRouter API"))
    }
}

fn correction_prompt(text: &str) -> String {
    format!(
        "Fix spelling, grammar and spacing in the text below. Keep its meaning, \
        language and tone. Return ONLY the corrected text, without quotes or commentary.\n\n\
        TEXT: {}",
        text
    )
}

fn matching_prompt(values: &[String], reference: &[String]) -> String {
    format!(
        "You normalize categorical labels. For each VALUE that means the same thing as \
        one of the REFERENCE labels (abbreviation, synonym, spelling variant), map it to \
        that reference label. Omit values with no equivalent.\n\n\
        VALUES: {:?}\nREFERENCE: {:?}\n\n\
        Return ONLY a JSON object of the form {{\"value\": \"reference\"}}.",
        values, reference
    )
}

fn classification_prompt(text: &str, labels: &[String]) -> String {
    format!(
        "Classify the text into exactly one of the labels.\n\n\
        TEXT: {}\nLABELS: {:?}\n\n\
        Return ONLY one line in the form label|confidence where confidence is between 0 and 1.",
        text, labels
    )
}

/// Strip surrounding quotes and whitespace from a free-text answer.
fn parse_correction(response: &str) -> std::result::Result<String, CapabilityError> {
    let cleaned = response.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if cleaned.is_empty() {
        return Err(CapabilityError::InvalidResponse(
            "empty correction".to_string(),
        ));
    }
    Ok(cleaned.to_string())
}

/// Extract the JSON object from an answer and keep only known keys/targets.
fn parse_matches(
    response: &str,
    values: &[String],
    reference: &[String],
) -> std::result::Result<HashMap<String, String>, CapabilityError> {
    let start = response.find('{');
    let end = response.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &response[s..=e],
        _ => {
            return Err(CapabilityError::InvalidResponse(
                "no JSON object in response".to_string(),
            ));
        }
    };

    let raw: HashMap<String, String> = serde_json::from_str(json)
        .map_err(|e| CapabilityError::InvalidResponse(e.to_string()))?;

    Ok(raw
        .into_iter()
        .filter(|(value, target)| values.contains(value) && reference.contains(target))
        .collect())
}

/// Parse a `label|confidence` line, matching the label case-insensitively.
fn parse_classification(
    response: &str,
    labels: &[String],
) -> std::result::Result<Classification, CapabilityError> {
    let line = response.trim().lines().next().unwrap_or_default();
    let (raw_label, raw_confidence) = line.rsplit_once('|').ok_or_else(|| {
        CapabilityError::InvalidResponse(format!("expected label|confidence, got '{}'", line))
    })?;

    let raw_label = raw_label.trim().trim_matches(|c| c == '"' || c == '\'');
    let label = labels
        .iter()
        .find(|l| l.eq_ignore_ascii_case(raw_label))
        .ok_or_else(|| CapabilityError::InvalidResponse(format!("unknown label '{}'", raw_label)))?;

    let confidence = raw_confidence
        .trim()
        .parse::<f64>()
        .map_err(|e| CapabilityError::InvalidResponse(e.to_string()))?
        .clamp(0.0, 1.0);

    Ok(Classification {
        label: label.clone(),
        confidence,
    })
}

impl TextCorrector for OpenRouterProvider {
    fn correct(&self, text: &str) -> std::result::Result<String, CapabilityError> {
        let response = self.call_api(&correction_prompt(text))?;
        debug!("OpenRouter correction: '{}' -> '{}'", text, response.trim());
        parse_correction(&response)
    }

    fn name(&self) -> &str {
        "OpenRouter"
    }
}

impl LabelMatcher for OpenRouterProvider {
    fn embed_and_match(
        &self,
        values: &[String],
        reference: &[String],
    ) -> std::result::Result<HashMap<String, String>, CapabilityError> {
        let response = self.call_api(&matching_prompt(values, reference))?;
        parse_matches(&response, values, reference)
    }

    fn name(&self) -> &str {
        "OpenRouter"
    }
}

impl ZeroShotClassifier for OpenRouterProvider {
    fn classify(
        &self,
        text: &str,
        labels: &[String],
    ) -> std::result::Result<Classification, CapabilityError> {
        let response = self.call_api(&classification_prompt(text, labels))?;
        parse_classification(&response, labels)
    }

    fn name(&self) -> &str {
        "OpenRouter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_with_model_keeps_defaults() {
        let config = OpenRouterConfig::with_model("openai/gpt-4o-mini");
        assert_eq!(config.model, "openai/gpt-4o-mini");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.base_url.ends_with("/chat/completions"));
    }

    #[test]
    fn test_parse_correction_strips_quotes() {
        assert_eq!(
            parse_correction("  \"The quick fox.\"\n").unwrap(),
            "The quick fox."
        );
        assert!(parse_correction("  ").is_err());
    }

    #[test]
    fn test_parse_matches_filters_unknown_entries() {
        let values = labels(&["M", "F", "X"]);
        let reference = labels(&["Male", "Female"]);
        let response = "Sure! {\"M\": \"Male\", \"F\": \"Female\", \"Q\": \"Male\", \"X\": \"Other\"}";

        let matches = parse_matches(response, &values, &reference).unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches.get("M").map(String::as_str), Some("Male"));
        assert_eq!(matches.get("F").map(String::as_str), Some("Female"));
    }

    #[test]
    fn test_parse_matches_rejects_non_json() {
        let result = parse_matches("no idea", &labels(&["a"]), &labels(&["b"]));
        assert!(matches!(result, Err(CapabilityError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_classification() {
        let result = parse_classification("positive|0.93", &labels(&["Positive", "Negative"])).unwrap();
        assert_eq!(result.label, "Positive");
        assert!((result.confidence - 0.93).abs() < 1e-9);

        assert!(parse_classification("neutral|0.9", &labels(&["Positive"])).is_err());
        assert!(parse_classification("Positive", &labels(&["Positive"])).is_err());
    }

    #[test]
    fn test_provider_creation() {
        let provider = OpenRouterProvider::new("test-key").unwrap();
        assert_eq!(provider.model(), DEFAULT_MODEL);
        assert_eq!(TextCorrector::name(&provider), "OpenRouter");
    }
}
