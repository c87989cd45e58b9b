use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::data::cache::{CachedEntry, SummaryCache};
use crate::data::sources::{SummaryGenerator, SummaryOutcome, SummaryPayload};
use crate::execution::persistence::AnalysisDatabase;

pub const SOURCE_MODEL: &str = "model";
pub const SOURCE_RULE_BASED: &str = "rule_based";

/// Stable cache key: SHA-256 of the payload's JSON.
pub fn hash_payload(payload: &SummaryPayload) -> Result<String> {
    let value = serde_json::to_string(payload)?;
    Ok(hex::encode(Sha256::digest(value.as_bytes())))
}

/// Deterministic four-section report used when no model is configured or it fails.
pub fn rule_based_summary(payload: &SummaryPayload) -> String {
    let p_model = payload.p_model.unwrap_or(0.0);
    let edge = payload.edge.unwrap_or(0.0);
    let ev_net = payload.ev_net.unwrap_or(0.0);
    let failed = payload.gates.failed();

    let risk = if failed.is_empty() {
        "No gate failures detected.".to_string()
    } else {
        format!("Failed gates {}.", failed.join(", "))
    };

    let plan = if ev_net > 0.0 && edge > 0.0 {
        "Take only with stable gates and disciplined sizing."
    } else {
        "Stand down for now and re-check after the next forecast update."
    };

    [
        format!(
            "Executive Summary: {}. Model {:.2}% vs market {:.2}%.",
            payload.signal,
            p_model * 100.0,
            payload.market_price * 100.0
        ),
        format!(
            "Model View: Edge {:.2} pts and EV net {:.2} pts.",
            edge * 100.0,
            ev_net * 100.0
        ),
        format!("Risk Check: {}", risk),
        format!("Trade Plan: {}", plan),
    ]
    .join("\n\n")
}

/// Chat-completions client for narrative summaries.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<serde_json::Value>,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build summary HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model for a report. `Ok(None)` when it answers with nothing usable.
    pub async fn generate(&self, payload: &SummaryPayload) -> Result<Option<String>> {
        let prompt = format!(
            "Write a compact trading report in plain text with exactly these section headers:\n\
             Executive Summary:\nModel View:\nRisk Check:\nTrade Plan:\n\n\
             Rules:\n\
             - Include concrete numbers from payload (probability, price, edge, EV, signal).\n\
             - If edge or EV is negative, Trade Plan should explicitly say avoid or wait.\n\
             - If gates fail, mention the failed gate names.\n\
             - Keep each section to one short paragraph.\n\
             - No markdown bullets or tables.\n\n\
             Payload:\n{}",
            serde_json::to_string(payload)?
        );

        let body = json!({
            "model": self.model,
            "temperature": 0.1,
            "max_tokens": 220,
            "messages": [
                { "role": "system", "content": "You are a concise quantitative weather market analyst." },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to call summary model")?;

        if !response.status().is_success() {
            warn!("Summary model returned HTTP {}", response.status());
            return Ok(None);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse summary model response")?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .and_then(|content| read_content(&content))
            .map(|text| normalize_summary(&text)))
    }
}

fn read_content(content: &serde_json::Value) -> Option<String> {
    let text = match content {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        _ => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Collapse model output to at most eight non-empty paragraphs.
fn normalize_summary(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(8)
        .collect();

    if lines.is_empty() {
        text.to_string()
    } else {
        lines.join("\n\n")
    }
}

/// Summary lookup chain: memory, then the summary table, then generation.
pub struct SummaryService {
    db: Arc<AnalysisDatabase>,
    cache: SummaryCache,
    llm: Option<OpenAiClient>,
}

impl SummaryService {
    pub fn new(db: Arc<AnalysisDatabase>, cache: SummaryCache, llm: Option<OpenAiClient>) -> Self {
        if llm.is_none() {
            info!("No summary model configured, using rule-based summaries");
        }
        Self { db, cache, llm }
    }

    async fn generate(&self, payload: &SummaryPayload) -> (String, &'static str) {
        if let Some(llm) = &self.llm {
            match llm.generate(payload).await {
                Ok(Some(text)) => return (text, SOURCE_MODEL),
                Ok(None) => debug!("Summary model returned no content"),
                Err(e) => warn!("Summary model failed, falling back to rules: {:#}", e),
            }
        }
        (rule_based_summary(payload), SOURCE_RULE_BASED)
    }
}

#[async_trait]
impl SummaryGenerator for SummaryService {
    async fn get_or_create(&self, payload: &SummaryPayload) -> Result<SummaryOutcome> {
        let cache_key = hash_payload(payload)?;

        if let Some(hit) = self.cache.get(&cache_key) {
            return Ok(SummaryOutcome {
                id: hit.id,
                text: hit.text,
                source: hit.source,
                cached: true,
            });
        }

        if let Some(stored) = self.db.find_summary(&cache_key)? {
            self.cache.insert(cache_key, CachedEntry {
                id: Some(stored.id),
                text: stored.summary.clone(),
                source: stored.source.clone(),
            });
            return Ok(SummaryOutcome {
                id: Some(stored.id),
                text: stored.summary,
                source: stored.source,
                cached: true,
            });
        }

        let (text, source) = self.generate(payload).await;
        let model = match source {
            SOURCE_MODEL => self.llm.as_ref().map(|l| l.model()),
            _ => None,
        };
        let id = self.db.upsert_summary(
            &cache_key,
            &text,
            source,
            model,
            &serde_json::to_string(payload)?,
        )?;

        self.cache.insert(cache_key, CachedEntry {
            id: Some(id),
            text: text.clone(),
            source: source.to_string(),
        });
        debug!("Stored {} summary, {} cached in memory", source, self.cache.len());

        Ok(SummaryOutcome {
            id: Some(id),
            text,
            source: source.to_string(),
            cached: false,
        })
    }
}
