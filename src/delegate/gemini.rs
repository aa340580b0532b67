//! Gemini API delegate
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{DelegatePurpose, DelegateRequest, DelegateResponse, ModelDelegate};
use crate::error::AssistantError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiDelegate {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiDelegate {
    pub fn new(api_key: String, model: String, request_timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// The key travels in a header so it never appears in a URL.
    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ModelDelegate for GeminiDelegate {
    fn provider(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &DelegateRequest) -> crate::Result<DelegateResponse> {
        if self.api_key.is_empty() {
            return Err(AssistantError::Delegate(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let body = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_user_turn(request),
                }],
            }],
            generation_config: generation_config(request.purpose),
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_prompt(request.purpose).to_string(),
                }],
            },
        };

        info!(model = %self.model, purpose = ?request.purpose, "Calling Gemini API");

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                AssistantError::Delegate(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(AssistantError::Delegate(format!(
                "Gemini API returned {}",
                status
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            let e = e.without_url();
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::Delegate(format!("Gemini parse error: {}", e))
        })?;

        let content = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AssistantError::Delegate("Empty response from Gemini".to_string()))?;

        let token_usage = gemini_response.usage_metadata.as_ref().map(|u| {
            u.total_token_count
                .unwrap_or(u.prompt_token_count + u.candidates_token_count)
        });

        info!(tokens = ?token_usage, "Gemini response received");

        Ok(DelegateResponse {
            content,
            provider: self.provider().to_string(),
            token_usage,
        })
    }
}

fn system_prompt(purpose: DelegatePurpose) -> &'static str {
    match purpose {
        DelegatePurpose::Answer => {
            r#"You are a professional financial assistant embedded in a portfolio tracker.

Guidelines:
- Provide accurate and educational financial information
- Be structured and concise
- Reference the user's holdings when they are provided
- Emphasize research and risk awareness
- Never claim to have executed trades or changed the portfolio"#
        }
        DelegatePurpose::CompleteCommand => {
            r#"You complete partially specified portfolio commands.

Reply with a single JSON object and nothing else:
{"quantity": "<decimal or null>", "price": "<decimal or null>", "clarification": "<question or null>"}

Rules:
- Only fill a field when the user's words state it explicitly or it follows exactly from the holdings provided
- Never invent a quantity or price
- When anything is ambiguous, leave the fields null and ask one short clarifying question"#
        }
    }
}

fn generation_config(purpose: DelegatePurpose) -> GenerationConfig {
    match purpose {
        DelegatePurpose::Answer => GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
        },
        DelegatePurpose::CompleteCommand => GenerationConfig {
            temperature: 0.0,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 256,
        },
    }
}

fn build_user_turn(request: &DelegateRequest) -> String {
    if request.prompt_context.trim().is_empty() {
        request.message.clone()
    } else {
        format!(
            "{}\n\n---\n\nUser message: {}",
            request.prompt_context, request.message
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    total_token_count: Option<u32>,
}
