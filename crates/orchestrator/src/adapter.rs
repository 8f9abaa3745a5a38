//! Target adapter: delivers customer messages to the system under test and
//! reads back its reply, intent classification, and latency.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatprobe_core::config::TargetConfig;
use chatprobe_core::types::TargetReply;
use chatprobe_core::{ProbeError, ProbeResult};
use serde_json::{json, Value};
use tracing::debug;

/// Trait for talking to the system under test. Implementations can target
/// HTTP chat APIs, browser sessions, or in-process stubs.
///
/// Implementations enforce their own timeout; the runner never retries.
#[async_trait]
pub trait TargetAdapter: Send + Sync {
    async fn send(
        &self,
        message: &str,
        session_id: &str,
        context: Option<&Value>,
    ) -> ProbeResult<TargetReply>;
}

/// Map a raw confidence onto 0–1. Values in (1, 100] are read as percentages.
pub fn normalize_confidence(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    if raw > 1.0 && raw <= 100.0 {
        Some(raw / 100.0)
    } else {
        Some(raw.clamp(0.0, 1.0))
    }
}

/// Adapter for chat backends exposing a JSON message endpoint.
pub struct HttpTargetAdapter {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
    timeout_ms: u64,
}

impl HttpTargetAdapter {
    pub fn new(config: &TargetConfig) -> ProbeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProbeError::Adapter(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.message_path.trim_start_matches('/')
        );

        Ok(Self {
            client,
            endpoint,
            auth_token: config.auth_token.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TargetAdapter for HttpTargetAdapter {
    async fn send(
        &self,
        message: &str,
        session_id: &str,
        context: Option<&Value>,
    ) -> ProbeResult<TargetReply> {
        let started = Instant::now();

        let mut request = self.client.post(&self.endpoint).json(&json!({
            "message": message,
            "sessionId": session_id,
            "context": context,
        }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Adapter(format!("request timed out after {}ms", self.timeout_ms))
            } else {
                ProbeError::Adapter(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Adapter(format!("target returned HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProbeError::Adapter(format!("malformed reply: {e}")))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        debug!(session_id, latency_ms, "Target replied");
        parse_reply(&body, latency_ms)
    }
}

/// Extract a reply from the loosely-shaped JSON chat backends return.
///
/// Text is read from `response`, `reply`, or `message`. The intent may be a
/// plain string or an object with `name` and `confidence`.
pub fn parse_reply(body: &Value, latency_ms: u64) -> ProbeResult<TargetReply> {
    let response = ["response", "reply", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .ok_or_else(|| ProbeError::Adapter("malformed reply: no response text".into()))?
        .to_string();

    let (intent, nested_confidence) = match body.get("intent") {
        Some(Value::String(name)) => (Some(name.clone()), None),
        Some(Value::Object(obj)) => (
            obj.get("name").and_then(Value::as_str).map(str::to_string),
            obj.get("confidence").and_then(Value::as_f64),
        ),
        _ => (None, None),
    };

    let confidence = body
        .get("confidence")
        .and_then(Value::as_f64)
        .or(nested_confidence);

    Ok(TargetReply {
        response,
        intent,
        confidence,
        latency_ms,
    })
}
