//! Routine generation via an OpenAI-compatible chat-completions API.
//!
//! The client is an explicitly constructed value carried in `AppContext` —
//! configuration comes in through `[generation]` in config.toml plus the
//! `ROUTINED_API_KEY` environment variable, never from module-level state.

use anyhow::{bail, Context as _, Result};
use serde_json::json;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::engine::schedule::parse_schedule;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that helps people optimize \
their daily routines. When given a description of someone's current routine and their \
goals, you provide: a detailed, time-blocked schedule; specific suggestions for \
improvement; and tips for maintaining consistency. Format the response in clear \
markdown sections. End your response with a fenced ```json code block containing the \
schedule as an array of objects with \"time\" (24-hour H:MM), \"activity\", and \
\"description\" fields.";

/// What the completion API produced for one prompt: the narrative text and,
/// when the model's schedule block parsed, the structured schedule document.
#[derive(Debug, Clone)]
pub struct GeneratedRoutine {
    pub narrative: String,
    pub schedule: Option<String>,
}

pub struct GenerationClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GenerationClient {
    /// Build a client from config. Returns `None` when no API key is
    /// configured — callers surface that as a dependency error at request
    /// time rather than failing startup.
    pub fn from_config(cfg: &GenerationConfig) -> Result<Option<Self>> {
        let Some(api_key) = cfg.api_key.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("failed to build completion HTTP client")?;
        Ok(Some(Self {
            http,
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
        }))
    }

    /// One chat-completion round trip: prompt in, narrative + optional
    /// structured schedule out.
    pub async fn generate_routine(&self, prompt: &str) -> Result<GeneratedRoutine> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("completion request failed")?;
        if !resp.status().is_success() {
            bail!("completion API returned {}", resp.status());
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .context("completion response was not JSON")?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .context("completion response had no message content")?;

        let generated = split_response(content);
        debug!(
            model = %self.model,
            has_schedule = generated.schedule.is_some(),
            "routine generated"
        );
        Ok(generated)
    }
}

/// Split a model response into narrative text and a validated schedule
/// document. A missing or unparsable schedule block is soft: the routine is
/// stored without structure, mirroring the schedule parser's behavior.
pub fn split_response(content: &str) -> GeneratedRoutine {
    match extract_json_block(content) {
        Some((block, rest)) if !parse_schedule(Some(&block)).is_empty() => GeneratedRoutine {
            narrative: rest.trim().to_string(),
            schedule: Some(block),
        },
        _ => GeneratedRoutine {
            narrative: content.trim().to_string(),
            schedule: None,
        },
    }
}

/// Pull the first fenced ```json block out of `content`, returning the block
/// body and the content with the fence removed.
fn extract_json_block(content: &str) -> Option<(String, String)> {
    let open = content.find("```json")?;
    let body_start = open + "```json".len();
    let close_rel = content[body_start..].find("```")?;
    let block = content[body_start..body_start + close_rel].trim().to_string();
    let mut rest = String::with_capacity(content.len());
    rest.push_str(&content[..open]);
    rest.push_str(&content[body_start + close_rel + 3..]);
    Some((block, rest))
}
