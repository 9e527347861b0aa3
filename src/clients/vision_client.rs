use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::sync::OnceLock;
use tracing::{debug, instrument, warn};

use crate::config::settings::AiConfig;
use crate::error::{AppError, AppResult};
use crate::models::product::ProductContent;
use crate::models::usage::UsageRecord;

/// A previously generated product, fed back into the prompt so repeat
/// sellers get consistent styling and vendor names.
#[derive(Debug, Clone)]
pub struct PriorProduct {
    pub title: String,
    pub product_type: String,
}

impl PriorProduct {
    /// Pulls title/type pairs out of recent ledger records. Records whose
    /// payload is missing either field are skipped.
    pub fn from_records(records: &[UsageRecord]) -> Vec<Self> {
        records
            .iter()
            .filter_map(|record| {
                let content = record.generated_content.as_ref()?;
                Some(Self {
                    title: content.get("title")?.as_str()?.to_string(),
                    product_type: content
                        .get("product_type")
                        .and_then(|v| v.as_str())
                        .unwrap_or("N/A")
                        .to_string(),
                })
            })
            .collect()
    }
}

/// One product image in, one filled product form out.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
    pub hints: Option<String>,
    pub prior_products: Vec<PriorProduct>,
}

/// The AI boundary. The accounting flow treats this as an opaque call with
/// its own latency, cost, and failure modes.
#[async_trait]
pub trait VisionEngine: Send + Sync {
    async fn generate_product(&self, request: GenerationRequest) -> AppResult<ProductContent>;
}

const SYSTEM_PROMPT: &str = r#"You are an e-commerce product assistant. Generate comprehensive product details from the uploaded image.

Return a JSON object with the following structure:
{
  "title": "SEO-optimized product title (60 chars max)",
  "description": "HTML formatted description with benefits and features",
  "price": "suggested price as string",
  "compare_at_price": "optional higher price for discount",
  "sku": "generated SKU code",
  "weight": "estimated weight in kg as string",
  "variants": [{"price": "", "compare_at_price": "", "sku": "", "weight": ""}],
  "meta_title": "SEO title",
  "meta_description": "SEO description (160 chars max)",
  "status": "published",
  "published_scope": "web",
  "product_type": "product category",
  "vendor": "suggested brand/vendor name",
  "collections": ["category1", "category2", "category3"],
  "tags": "comma-separated tags"
}

Make it compelling, accurate, and ready for e-commerce."#;

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client for product generation.
pub struct OpenAiVisionClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiVisionClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            http: Client::new(),
            api_key: config.openai_api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.vision_model.clone(),
        }
    }

    fn system_prompt(prior_products: &[PriorProduct]) -> String {
        if prior_products.is_empty() {
            return SYSTEM_PROMPT.to_string();
        }
        let context = prior_products
            .iter()
            .take(3)
            .map(|p| format!("- {} ({})", p.title, p.product_type))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\n\nUser's previous products context (use for consistency in style/vendor if relevant):\n{}",
            SYSTEM_PROMPT, context
        )
    }

    fn user_content(request: &GenerationRequest) -> serde_json::Value {
        let text = match &request.hints {
            Some(hints) => format!(
                "Generate complete product details for this image. Product hints: {}",
                hints
            ),
            None => "Generate complete product details for this image:".to_string(),
        };
        let image_url = format!(
            "data:{};base64,{}",
            request.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&request.image)
        );
        serde_json::json!([
            {"type": "text", "text": text},
            {"type": "image_url", "image_url": {"url": image_url}}
        ])
    }

    /// The model often wraps its JSON in markdown fences; take the outermost
    /// object from the raw text.
    fn extract_json_block(content: &str) -> AppResult<&str> {
        static JSON_BLOCK: OnceLock<Regex> = OnceLock::new();
        let re = JSON_BLOCK.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid literal regex"));
        re.find(content)
            .map(|m| m.as_str())
            .ok_or_else(|| AppError::External("No valid JSON found in model response".to_string()))
    }
}

#[async_trait]
impl VisionEngine for OpenAiVisionClient {
    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate_product(&self, request: GenerationRequest) -> AppResult<ProductContent> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: serde_json::Value::String(Self::system_prompt(
                        &request.prior_products,
                    )),
                },
                ChatMessage {
                    role: "user",
                    content: Self::user_content(&request),
                },
            ],
            max_tokens: Some(1500),
            temperature: Some(0.7),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Vision provider request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, "vision provider returned an error");
            return Err(AppError::External(format!(
                "Vision provider returned {}: {}",
                status, detail
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::External(format!("Invalid vision provider response: {}", e)))?;

        let content = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::External("Vision provider returned no content".to_string()))?;

        debug!(length = content.len(), "received model content");

        let json_block = Self::extract_json_block(&content)?;
        let product: ProductContent = serde_json::from_str(json_block)
            .map_err(|e| AppError::External(format!("Failed to parse generated product: {}", e)))?;
        product.ensure_required()?;

        Ok(product)
    }
}
