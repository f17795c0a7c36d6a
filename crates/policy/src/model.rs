//! Value types exchanged between callers and policies.
//!
//! All enums travel over the wire as `SCREAMING_SNAKE_CASE` strings so the
//! JSON shape matches what the desktop client and the generation endpoint
//! produce.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How proactive the companion may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Silent,
    Light,
    Active,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Silent => "SILENT",
            Mode::Light => "LIGHT",
            Mode::Active => "ACTIVE",
        }
    }

    /// One-line meaning of the mode, used in generated prompts.
    pub fn describe(self) -> &'static str {
        match self {
            Mode::Silent => "minimize disturbance",
            Mode::Light => "gentle reminders",
            Mode::Active => "proactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    DoNotDisturb,
    Encourage,
    TaskBreakdown,
    RestReminder,
    Reframe,
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [
        ActionType::DoNotDisturb,
        ActionType::Encourage,
        ActionType::TaskBreakdown,
        ActionType::RestReminder,
        ActionType::Reframe,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::DoNotDisturb => "DO_NOT_DISTURB",
            ActionType::Encourage => "ENCOURAGE",
            ActionType::TaskBreakdown => "TASK_BREAKDOWN",
            ActionType::RestReminder => "REST_REMINDER",
            ActionType::Reframe => "REFRAME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

/// Snapshot of the user's situation at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub mode: Mode,
    /// Free-form input, possibly empty.
    #[serde(default)]
    pub user_text: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    /// Opaque focus signals such as `focus_app` or `focus_minutes`.
    #[serde(default)]
    pub signals: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_summary: Option<String>,
}

impl Context {
    pub fn new(mode: Mode, user_text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            mode,
            user_text: user_text.into(),
            timestamp,
            signals: BTreeMap::new(),
            profile_summary: None,
            memory_summary: None,
        }
    }

    pub fn with_signal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.signals.insert(key.into(), value.into());
        self
    }

    pub fn with_profile_summary(mut self, summary: impl Into<String>) -> Self {
        self.profile_summary = Some(summary.into());
        self
    }

    pub fn with_memory_summary(mut self, summary: impl Into<String>) -> Self {
        self.memory_summary = Some(summary.into());
        self
    }

    pub fn signal(&self, key: &str) -> Option<&str> {
        self.signals.get(key).map(String::as_str)
    }

    /// Profile summary, only if it carries text.
    pub fn profile(&self) -> Option<&str> {
        non_blank(self.profile_summary.as_deref())
    }

    /// Memory summary, only if it carries text.
    pub fn memory(&self) -> Option<&str> {
        non_blank(self.memory_summary.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// The recommended intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub message: String,
    pub confidence: f64,
    /// Interruption cost.
    pub cost: f64,
    pub risk_level: RiskLevel,
}

impl Action {
    pub fn new(
        action_type: ActionType,
        message: impl Into<String>,
        confidence: f64,
        cost: f64,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            action_type,
            message: message.into(),
            confidence,
            cost,
            risk_level,
        }
    }

    /// True when both scores are finite and inside `[0, 1]`.
    pub fn is_well_formed(&self) -> bool {
        is_unit(self.confidence) && is_unit(self.cost)
    }
}

pub(crate) fn is_unit(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// An action together with the identifiers of what produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub policy_version: String,
    pub model_id: String,
}

impl Decision {
    pub fn new(
        action: Action,
        policy_version: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            action,
            policy_version: policy_version.into(),
            model_id: model_id.into(),
        }
    }
}
