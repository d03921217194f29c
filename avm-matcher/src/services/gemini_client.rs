//! Gemini `generateContent` oracle client
//!
//! Images are sent inline as base64 JPEG parts, probe first, then candidates,
//! then the prompt text. All calls share one rate limiter, so concurrent
//! comparator tasks are paced together.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use avm_common::config::OracleConfig;

use super::annotator::flatten_on_white;
use super::oracle::{
    parse_classification, parse_ordinal, ClassifierOracle, OracleError, ProbeClassification,
};

/// Connection settings for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiClientConfig {
    pub api_key: String,
    pub model: String,
    /// API root, e.g. `https://generativelanguage.googleapis.com/v1beta`
    pub base_url: String,
    pub timeout: Duration,
    pub requests_per_second: u32,
}

impl GeminiClientConfig {
    pub fn from_oracle_config(config: &OracleConfig, api_key: String) -> Self {
        Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout: config.timeout(),
            requests_per_second: config.requests_per_second,
        }
    }
}

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self, OracleError> {
        let rps = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            OracleError::Config("requests_per_second must be at least 1".to_string())
        })?;
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleError::Network(e.to_string()))?;

        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key,
            rate_limiter,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one multimodal request and return the concatenated response text
    async fn generate(&self, images: Vec<DynamicImage>, prompt: &str) -> Result<String, OracleError> {
        let image_count = images.len();
        let encoded = tokio::task::spawn_blocking(move || {
            images
                .iter()
                .map(encode_jpeg_base64)
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| OracleError::Encode(e.to_string()))??;

        let mut parts: Vec<Part> = encoded
            .into_iter()
            .map(|data| Part::InlineData {
                inline_data: Blob {
                    mime_type: "image/jpeg",
                    data,
                },
            })
            .collect();
        parts.push(Part::Text {
            text: prompt.to_string(),
        });

        let request = GenerateContentRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                response_mime_type: "text/plain",
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        };

        self.rate_limiter.until_ready().await;

        debug!(endpoint = %self.endpoint, images = image_count, "Sending oracle request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        let text = body.text();
        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ClassifierOracle for GeminiClient {
    async fn classify_probe(&self, probe: &DynamicImage) -> Result<ProbeClassification, OracleError> {
        let text = self.generate(vec![probe.clone()], CLASSIFICATION_PROMPT).await?;
        let classification = parse_classification(&text);
        debug!(
            gender = %classification.gender,
            is_minor = classification.is_minor,
            "Probe classified"
        );
        Ok(classification)
    }

    async fn compare_batch(
        &self,
        labeled_probe: &DynamicImage,
        candidates: &[DynamicImage],
    ) -> Result<i64, OracleError> {
        let mut images = Vec::with_capacity(candidates.len() + 1);
        images.push(labeled_probe.clone());
        images.extend(candidates.iter().cloned());

        let prompt = batch_comparison_prompt(candidates.len());
        let text = self.generate(images, &prompt).await?;
        parse_ordinal(&text).ok_or_else(|| OracleError::Parse(truncate(&text, 200)))
    }
}

const CLASSIFICATION_PROMPT: &str = "Look at the person in this photo. \
Reply with a JSON object only, in the form {\"gender\": \"male\" or \"female\", \
\"child\": \"true\" or \"false\"}. Use child = true if the person appears to be under 18.";

fn batch_comparison_prompt(count: usize) -> String {
    format!(
        "The first image, labeled \"Real Photo\", is a photo of a real person. \
The next {count} images are avatars labeled 1 to {count}. \
Pick the avatar whose face looks most like the person in the real photo. \
Compare face shape, skin tone, hair, eyes, nose and mouth; ignore clothing, \
background and art style. Reply with the avatar's number only, between 1 and {count}."
    )
}

/// JPEG-encode an image (transparency composited over white) and base64 it
fn encode_jpeg_base64(image: &DynamicImage) -> Result<String, OracleError> {
    let rgb = DynamicImage::ImageRgb8(flatten_on_white(image));
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| OracleError::Encode(e.to_string()))?;
    Ok(BASE64_STANDARD.encode(buffer.into_inner()))
}

fn map_reqwest_error(err: reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout
    } else {
        OracleError::Network(err.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}
