//! Policy name resolution.
//!
//! An empty or missing name selects the default (generative) policy. Any other
//! name that is not known resolves to [`Policy::Unavailable`], never to the
//! default.

use crate::config::ServiceConfig;
use crate::generative::GenerativePolicy;
use crate::model::{Action, ActionType, Context, Decision, RiskLevel};
use crate::rule::RulePolicy;

pub const UNAVAILABLE_POLICY_VERSION: &str = "unavailable";
pub const UNAVAILABLE_MODEL_ID: &str = "none";
const UNAVAILABLE_MESSAGE: &str = "该能力暂不可用。";

/// The decision returned for an unrecognised policy name.
pub fn unavailable_decision() -> Decision {
    Decision::new(
        Action::new(
            ActionType::DoNotDisturb,
            UNAVAILABLE_MESSAGE,
            0.0,
            0.0,
            RiskLevel::Low,
        ),
        UNAVAILABLE_POLICY_VERSION,
        UNAVAILABLE_MODEL_ID,
    )
}

#[derive(Debug, Clone)]
pub enum Policy {
    Rule(RulePolicy),
    Generative(GenerativePolicy),
    Unavailable,
}

impl Policy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Rule(_) => PolicyKind::Rule,
            Policy::Generative(_) => PolicyKind::Generative,
            Policy::Unavailable => PolicyKind::Unavailable,
        }
    }

    pub async fn decide(&self, ctx: &Context) -> Decision {
        match self {
            Policy::Rule(rule) => rule.decide(ctx),
            Policy::Generative(generative) => generative.decide(ctx).await,
            Policy::Unavailable => unavailable_decision(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Rule,
    Generative,
    Unavailable,
}

impl PolicyKind {
    /// Resolves a configured name. Matching is case-insensitive and ignores
    /// surrounding whitespace.
    pub fn parse(name: Option<&str>) -> Self {
        let key = name.map(|n| n.trim().to_ascii_lowercase()).unwrap_or_default();
        match key.as_str() {
            "" | "ollama" | "generative" => PolicyKind::Generative,
            "rule" | "rule_v0" => PolicyKind::Rule,
            _ => PolicyKind::Unavailable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Rule => "rule",
            PolicyKind::Generative => "ollama",
            PolicyKind::Unavailable => "unavailable",
        }
    }
}

/// Owns one instance of every policy and hands out references by name.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    rule: Policy,
    generative: Policy,
    unavailable: Policy,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new(RulePolicy::default(), GenerativePolicy::default())
    }
}

impl PolicyRegistry {
    pub fn new(rule: RulePolicy, generative: GenerativePolicy) -> Self {
        Self {
            rule: Policy::Rule(rule),
            generative: Policy::Generative(generative),
            unavailable: Policy::Unavailable,
        }
    }

    pub fn from_config(cfg: &ServiceConfig) -> Self {
        Self::new(cfg.rule_policy(), cfg.generative_policy())
    }

    pub fn lookup(&self, name: Option<&str>) -> &Policy {
        match PolicyKind::parse(name) {
            PolicyKind::Rule => &self.rule,
            PolicyKind::Generative => &self.generative,
            PolicyKind::Unavailable => &self.unavailable,
        }
    }
}
