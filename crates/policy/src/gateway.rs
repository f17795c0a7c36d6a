//! Post-decision permission checks.
//!
//! Only high-risk actions are blocked. Low quality and silent-mode mismatches
//! are reported as advisories and leave the action untouched.

use serde::Serialize;

use crate::model::{Action, ActionType, Context, Decision, Mode, RiskLevel};

pub const GATEWAY_BLOCK_SUFFIX: &str = ":gateway_block";
const BLOCKED_MESSAGE: &str = "高风险动作已被权限网关拦截。";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayReason {
    HighRiskBlocked,
    LowQualityAction,
    ModeSilentOverride,
}

impl GatewayReason {
    pub fn as_str(self) -> &'static str {
        match self {
            GatewayReason::HighRiskBlocked => "high_risk_blocked",
            GatewayReason::LowQualityAction => "low_quality_action",
            GatewayReason::ModeSilentOverride => "mode_silent_override",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayVerdict {
    pub decision: Decision,
    pub blocked: bool,
    pub reasons: Vec<GatewayReason>,
}

fn blocked_action() -> Action {
    Action::new(ActionType::DoNotDisturb, BLOCKED_MESSAGE, 1.0, 0.0, RiskLevel::Low)
}

fn is_low_quality(action: &Action) -> bool {
    action.message.trim().is_empty() || action.confidence < 0.5
}

/// Reviews a decision against the context it was made for.
pub fn review(ctx: &Context, decision: Decision) -> GatewayVerdict {
    let mut reasons = Vec::new();

    if decision.action.risk_level == RiskLevel::High {
        reasons.push(GatewayReason::HighRiskBlocked);
        let decision = Decision {
            action: blocked_action(),
            policy_version: format!("{}{GATEWAY_BLOCK_SUFFIX}", decision.policy_version),
            model_id: decision.model_id,
        };
        return GatewayVerdict {
            decision,
            blocked: true,
            reasons,
        };
    }

    if is_low_quality(&decision.action) {
        reasons.push(GatewayReason::LowQualityAction);
    }
    if ctx.mode == Mode::Silent && decision.action.action_type != ActionType::DoNotDisturb {
        reasons.push(GatewayReason::ModeSilentOverride);
    }

    GatewayVerdict {
        decision,
        blocked: false,
        reasons,
    }
}
