//! Generative policy backed by an Ollama-compatible `/api/generate` endpoint.
//!
//! The context is rendered into a prompt, sent as one non-streaming JSON
//! completion request, and the model's `response` text is parsed as an
//! action. Every failure along that path collapses into [`GenerateError`] and
//! is answered with [`fallback_action`].

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error};

use crate::error::GenerateError;
use crate::model::{is_unit, Action, ActionType, Context, Decision, RiskLevel};

pub const GENERATIVE_POLICY_VERSION: &str = "ollama_v0";
pub const FALLBACK_MODEL_ID: &str = "error";
pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const MISSING_MESSAGE: &str = "无法生成建议";
const FALLBACK_MESSAGE: &str = "AI 服务暂时不可用";

/// The action returned whenever generation fails.
pub fn fallback_action() -> Action {
    Action::new(
        ActionType::DoNotDisturb,
        FALLBACK_MESSAGE,
        1.0,
        0.0,
        RiskLevel::Low,
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateEnvelope {
    response: Option<String>,
}

/// Action as the model emits it. Omitted fields take defaults; an explicit
/// `null` is rejected.
#[derive(Debug, Deserialize)]
struct ActionPayload {
    #[serde(default, deserialize_with = "present")]
    action_type: Option<ActionType>,
    #[serde(default, deserialize_with = "present")]
    message: Option<String>,
    #[serde(default, deserialize_with = "present")]
    confidence: Option<Score>,
    #[serde(default, deserialize_with = "present")]
    cost: Option<Score>,
    #[serde(default, deserialize_with = "present")]
    risk_level: Option<RiskLevel>,
}

/// Only runs for keys that are present, so `null` hits `T`'s own
/// deserializer and fails there.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Models emit scores as numbers or as numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Score {
    Number(f64),
    Text(String),
}

impl Score {
    fn into_unit(self, field: &'static str) -> Result<f64, GenerateError> {
        let value = match self {
            Score::Number(n) => n,
            Score::Text(s) => s.trim().parse::<f64>().map_err(|_| GenerateError::OutOfRange {
                field,
                value: s.clone(),
            })?,
        };
        if is_unit(value) {
            Ok(value)
        } else {
            Err(GenerateError::OutOfRange {
                field,
                value: value.to_string(),
            })
        }
    }
}

fn unit_or(score: Option<Score>, field: &'static str, default: f64) -> Result<f64, GenerateError> {
    score.map_or(Ok(default), |s| s.into_unit(field))
}

impl ActionPayload {
    fn into_action(self) -> Result<Action, GenerateError> {
        Ok(Action {
            action_type: self.action_type.unwrap_or(ActionType::DoNotDisturb),
            message: self.message.unwrap_or_else(|| MISSING_MESSAGE.to_string()),
            confidence: unit_or(self.confidence, "confidence", 0.5)?,
            cost: unit_or(self.cost, "cost", 0.0)?,
            risk_level: self.risk_level.unwrap_or(RiskLevel::Low),
        })
    }
}

/// Parses a raw `/api/generate` response body into an action.
pub fn parse_generation(body: &[u8]) -> Result<Action, GenerateError> {
    let envelope: GenerateEnvelope =
        serde_json::from_slice(body).map_err(GenerateError::Envelope)?;
    let raw = envelope.response.ok_or(GenerateError::MissingResponse)?;
    let payload: ActionPayload = serde_json::from_str(&raw).map_err(GenerateError::Payload)?;
    payload.into_action()
}

/// Renders the context into the instruction block sent to the model.
pub fn build_prompt(ctx: &Context) -> String {
    let app_name = ctx.signal("focus_app").unwrap_or("Unknown");
    let window_title = ctx.signal("focus_window_title").unwrap_or("");
    let focus_minutes = ctx.signal("focus_minutes").unwrap_or("0");

    let mut prompt = String::from(
        "\nYou are Luma, an intelligent desktop companion.\n\
         Your goal is to help the user stay focused, healthy, and productive.\n",
    );
    if let Some(profile) = ctx.profile() {
        prompt.push_str(&format!(
            "\nUser Profile (Preferences & Traits):\n{profile}\n"
        ));
    }
    if let Some(memory) = ctx.memory() {
        prompt.push_str(&format!("\nRecent Memory Events:\n{memory}\n"));
    }
    prompt.push_str(&format!(
        "\nCurrent Context:\n\
         - Mode: {mode} ({mode_hint}; SILENT: minimize disturbance, \
         LIGHT: gentle reminders, ACTIVE: proactive)\n\
         - Current App: {app_name}\n\
         - Window Title: {window_title}\n\
         - Focus Duration: {focus_minutes} minutes\n\
         - User Input: \"{user_text}\" (If empty, infer from screen context)\n",
        mode = ctx.mode.as_str(),
        mode_hint = ctx.mode.describe(),
        user_text = ctx.user_text,
    ));
    prompt.push_str(
        "\nTask:\n\
         Analyze the context and decide on the best action.\n\
         If the user is working on a productive task for a long time, maybe suggest a break.\n\
         If the user is distracted (e.g. social media) during work hours, \
         suggest getting back to work.\n\
         If the user asks for help, provide it.\n\
         Consider the User Profile and Recent Memories to personalize your advice.\n\
         Choose exactly one action type.\n\
         \nOutput Format (JSON only):\n\
         {\n\
         \x20 \"action_type\": \"DO_NOT_DISTURB\" | \"ENCOURAGE\" | \
         \"TASK_BREAKDOWN\" | \"REST_REMINDER\" | \"REFRAME\",\n\
         \x20 \"message\": \"A short, friendly message to the user (in Chinese)\",\n\
         \x20 \"confidence\": 0.0 to 1.0,\n\
         \x20 \"cost\": 0.0 to 1.0 (interruption cost),\n\
         \x20 \"risk_level\": \"LOW\" | \"MEDIUM\" | \"HIGH\"\n\
         }\n",
    );
    prompt
}

#[derive(Debug, Clone)]
pub struct GenerativePolicy {
    client: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl Default for GenerativePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TIMEOUT)
    }
}

impl GenerativePolicy {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            tracing::warn!("failed to build http client, falling back to default: {}", e);
            Client::new()
        });
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Always yields a complete decision; failures become the fallback with
    /// model id `"error"`.
    pub async fn decide(&self, ctx: &Context) -> Decision {
        let prompt = build_prompt(ctx);
        match self.generate(&prompt).await {
            Ok(action) => {
                debug!(
                    model = %self.model,
                    action = action.action_type.as_str(),
                    "generation succeeded"
                );
                Decision::new(action, GENERATIVE_POLICY_VERSION, self.model.as_str())
            }
            Err(err) => {
                error!(
                    endpoint = %self.endpoint,
                    model = %self.model,
                    error = %err,
                    "generation failed, using fallback action"
                );
                Decision::new(fallback_action(), GENERATIVE_POLICY_VERSION, FALLBACK_MODEL_ID)
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<Action, GenerateError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerateError::Status(status));
        }

        let body = response.bytes().await?;
        parse_generation(&body)
    }
}
