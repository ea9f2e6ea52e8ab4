use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::{
    config::AppConfig,
    error::DispatchError,
    gate::Credential,
    models::{Message, Model},
};

/**
 * \brief Remote service seam used by the gate and the dispatch loop.
 */
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /**
     * \brief Read-only listing call, used to confirm a credential is accepted.
     */
    async fn list_models(&self, credential: &Credential) -> Result<Vec<String>>;

    /**
     * \brief Single non-streaming completion; returns the text of the first choice.
     */
    async fn complete(
        &self,
        credential: &Credential,
        model: Model,
        messages: &[Message],
    ) -> Result<String, DispatchError>;
}

/**
 * \brief OpenAI-compatible HTTP client.
 */
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_base: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[async_trait]
impl CompletionApi for OpenAiClient {
    async fn list_models(&self, credential: &Credential) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(self.url("/v1/models"))
            .header(AUTHORIZATION, bearer(credential))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("list models failed: {} -> {}", status, text));
        }
        parse_model_list(resp.json().await?)
    }

    async fn complete(
        &self,
        credential: &Credential,
        model: Model,
        messages: &[Message],
    ) -> Result<String, DispatchError> {
        let body = json!({
            "model": model.as_str(),
            "messages": messages,
        });

        let resp = self
            .http
            .post(self.url("/v1/chat/completions"))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, bearer(credential))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Status { status, body });
        }
        let v: Value = resp
            .json()
            .await
            .map_err(|e| DispatchError::Malformed(e.to_string()))?;
        extract_openai_content(&v)
            .ok_or_else(|| DispatchError::Malformed("missing choices[0].message.content".to_string()))
    }
}

fn bearer(credential: &Credential) -> String {
    format!("Bearer {}", credential.expose())
}

fn extract_openai_content(v: &Value) -> Option<String> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}

fn parse_model_list(v: Value) -> Result<Vec<String>> {
    if let Some(arr) = v.get("data").and_then(|x| x.as_array()) {
        Ok(arr
            .iter()
            .filter_map(|item| item.get("id").and_then(|s| s.as_str()))
            .map(|s| s.to_string())
            .collect())
    } else {
        Err(anyhow!("unexpected models payload: {}", v))
    }
}
