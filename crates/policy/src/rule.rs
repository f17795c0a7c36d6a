//! Heuristic rule policy.
//!
//! Four rules are tried in order and the first one that fires decides: the
//! silent-mode guard, the late-night window, the stress-keyword match and the
//! default spread. Ties inside a rule are broken by the injected random
//! source, so a seeded RNG yields a fully reproducible decision.

use chrono::{DateTime, FixedOffset, Local, Timelike, Utc};
use rand::Rng;

use crate::model::{Action, ActionType, Context, Decision, Mode, RiskLevel};

pub const RULE_POLICY_VERSION: &str = "rule_v0";
pub const RULE_MODEL_ID: &str = "stub";

/// Probability that SILENT mode short-circuits to do-not-disturb.
const SILENT_QUIET_PROBABILITY: f64 = 0.8;

const QUIET_MESSAGE: &str = "保持安静。如果需要帮助，随时告诉我。";
const LATE_REST_MESSAGE: &str = "时间有点晚了，建议做个短暂休息或伸展一下。";
const LATE_ENCOURAGE_MESSAGE: &str = "深夜工作很辛苦，你已经做得很好了。";
const BREAKDOWN_MESSAGE: &str = "可以先列出接下来三个最小的步骤，降低压力。";
const REFRAME_MESSAGE: &str = "这件事很重，但你以前也扛过困难。";
const DEFAULT_ENCOURAGE_MESSAGE: &str = "继续加油，小进步也很重要。";
const DEFAULT_QUIET_MESSAGE: &str = "暂时不介入，需要时我会在。";
const DEFAULT_REST_MESSAGE: &str = "可以短暂休息一下，帮助恢复专注。";

/// Stress keywords matched against lower-cased user text.
pub fn default_stress_keywords() -> Vec<String> {
    ["赶", "截止", "来不及", "压力", "deadline", "stress"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Where the local hour-of-day comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalClock {
    /// The host's local time zone.
    System,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl LocalClock {
    /// Fixed offset given in minutes east of UTC; `None` if out of range.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(LocalClock::Fixed)
    }

    /// Hour-of-day for a millisecond timestamp. Timestamps chrono cannot
    /// represent are read as "now".
    pub fn hour(&self, timestamp_ms: i64) -> u32 {
        let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or_else(Utc::now);
        match self {
            LocalClock::System => utc.with_timezone(&Local).hour(),
            LocalClock::Fixed(offset) => utc.with_timezone(offset).hour(),
        }
    }
}

fn is_late_night(hour: u32) -> bool {
    hour >= 23 || hour <= 5
}

#[derive(Debug, Clone)]
pub struct RulePolicy {
    keywords: Vec<String>,
    clock: LocalClock,
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self::new(default_stress_keywords(), LocalClock::System)
    }
}

impl RulePolicy {
    /// Keywords are lower-cased; blank entries are dropped since they would
    /// match every input.
    pub fn new(keywords: impl IntoIterator<Item = String>, clock: LocalClock) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords, clock }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn clock(&self) -> LocalClock {
        self.clock
    }

    /// Decides using the thread-local RNG.
    pub fn decide(&self, ctx: &Context) -> Decision {
        self.decide_with(ctx, &mut rand::thread_rng())
    }

    /// Decides using the given random source.
    pub fn decide_with<R: Rng + ?Sized>(&self, ctx: &Context, rng: &mut R) -> Decision {
        let action = self.choose(ctx, rng);
        Decision::new(action, RULE_POLICY_VERSION, RULE_MODEL_ID)
    }

    fn choose<R: Rng + ?Sized>(&self, ctx: &Context, rng: &mut R) -> Action {
        if ctx.mode == Mode::Silent && rng.gen::<f64>() < SILENT_QUIET_PROBABILITY {
            return Action::new(
                ActionType::DoNotDisturb,
                QUIET_MESSAGE,
                0.82,
                0.1,
                RiskLevel::Low,
            );
        }

        if is_late_night(self.clock.hour(ctx.timestamp)) {
            let (action_type, message) = if rng.gen_bool(0.5) {
                (ActionType::RestReminder, LATE_REST_MESSAGE)
            } else {
                (ActionType::Encourage, LATE_ENCOURAGE_MESSAGE)
            };
            return Action::new(action_type, message, 0.7, 0.2, RiskLevel::Low);
        }

        if self.mentions_stress(&ctx.user_text) {
            let (action_type, message) = if rng.gen_bool(0.5) {
                (ActionType::TaskBreakdown, BREAKDOWN_MESSAGE)
            } else {
                (ActionType::Reframe, REFRAME_MESSAGE)
            };
            return Action::new(action_type, message, 0.78, 0.3, RiskLevel::Low);
        }

        let (action_type, message) = match rng.gen_range(0..3) {
            0 => (ActionType::Encourage, DEFAULT_ENCOURAGE_MESSAGE),
            1 => (ActionType::DoNotDisturb, DEFAULT_QUIET_MESSAGE),
            _ => (ActionType::RestReminder, DEFAULT_REST_MESSAGE),
        };
        let confidence = (rng.gen_range(0.55..=0.85_f64) * 100.0).round() / 100.0;
        Action::new(action_type, message, confidence, 0.2, RiskLevel::Low)
    }

    fn mentions_stress(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn utc_policy() -> RulePolicy {
        RulePolicy::new(
            default_stress_keywords(),
            LocalClock::from_offset_minutes(0).unwrap(),
        )
    }

    fn at_hour(hour: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, 14, hour, 30, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn silent_mode_is_quiet_about_eighty_percent_of_the_time() {
        let policy = utc_policy();
        let mut rng = StdRng::seed_from_u64(7);
        // Late night so the fall-through never yields do-not-disturb itself.
        let ctx = Context::new(Mode::Silent, "", at_hour(2));
        let runs = 10_000;
        let quiet = (0..runs)
            .filter(|_| {
                policy.decide_with(&ctx, &mut rng).action.action_type == ActionType::DoNotDisturb
            })
            .count();
        let ratio = quiet as f64 / runs as f64;
        assert!((0.77..=0.83).contains(&ratio), "ratio was {ratio}");
    }

    #[test]
    fn silent_quiet_branch_has_fixed_scores() {
        let policy = utc_policy();
        let mut rng = StdRng::seed_from_u64(1);
        let ctx = Context::new(Mode::Silent, "", at_hour(2));
        let quiet = (0..50)
            .map(|_| policy.decide_with(&ctx, &mut rng))
            .find(|d| d.action.action_type == ActionType::DoNotDisturb)
            .expect("at least one quiet decision in 50 draws");
        assert_eq!(quiet.action.confidence, 0.82);
        assert_eq!(quiet.action.cost, 0.1);
        assert_eq!(quiet.action.risk_level, RiskLevel::Low);
        assert_eq!(quiet.policy_version, RULE_POLICY_VERSION);
        assert_eq!(quiet.model_id, RULE_MODEL_ID);
    }

    #[test]
    fn late_night_only_rests_or_encourages() {
        let policy = utc_policy();
        let mut rng = StdRng::seed_from_u64(42);
        for hour in [23, 0, 1, 2, 3, 4, 5] {
            let ctx = Context::new(Mode::Active, "deadline stress", at_hour(hour));
            for _ in 0..50 {
                let decision = policy.decide_with(&ctx, &mut rng);
                assert!(
                    matches!(
                        decision.action.action_type,
                        ActionType::RestReminder | ActionType::Encourage
                    ),
                    "hour {hour} gave {:?}",
                    decision.action.action_type
                );
                assert_eq!(decision.action.confidence, 0.7);
                assert_eq!(decision.action.cost, 0.2);
            }
        }
    }

    #[test]
    fn stress_keywords_pick_breakdown_or_reframe() {
        let policy = utc_policy();
        let mut rng = StdRng::seed_from_u64(3);
        for text in ["The DEADLINE is tomorrow", "好大的压力", "so much stress"] {
            let ctx = Context::new(Mode::Light, text, at_hour(14));
            for _ in 0..50 {
                let action = policy.decide_with(&ctx, &mut rng).action;
                assert!(matches!(
                    action.action_type,
                    ActionType::TaskBreakdown | ActionType::Reframe
                ));
                assert_eq!(action.confidence, 0.78);
                assert_eq!(action.cost, 0.3);
            }
        }
    }

    #[test]
    fn default_branch_spreads_and_rounds_confidence() {
        let policy = utc_policy();
        let mut rng = StdRng::seed_from_u64(11);
        let ctx = Context::new(Mode::Active, "writing docs", at_hour(10));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            let action = policy.decide_with(&ctx, &mut rng).action;
            assert!(matches!(
                action.action_type,
                ActionType::Encourage | ActionType::DoNotDisturb | ActionType::RestReminder
            ));
            assert!((0.55..=0.85).contains(&action.confidence));
            let cents = action.confidence * 100.0;
            assert!((cents - cents.round()).abs() < 1e-9);
            assert_eq!(action.cost, 0.2);
            seen.insert(action.action_type);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn same_seed_same_decision() {
        let policy = utc_policy();
        let ctx = Context::new(Mode::Light, "", at_hour(9));
        let a = policy.decide_with(&ctx, &mut StdRng::seed_from_u64(99));
        let b = policy.decide_with(&ctx, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn every_decision_is_well_formed() {
        let policy = utc_policy();
        let mut rng = StdRng::seed_from_u64(5);
        for mode in [Mode::Silent, Mode::Light, Mode::Active] {
            for hour in 0..24 {
                for text in ["", "deadline", "hello"] {
                    let ctx = Context::new(mode, text, at_hour(hour));
                    let action = policy.decide_with(&ctx, &mut rng).action;
                    assert!(action.is_well_formed());
                    assert!(!action.message.is_empty());
                }
            }
        }
    }

    #[test]
    fn blank_keywords_are_ignored() {
        let policy = RulePolicy::new(
            vec!["".to_string(), "  ".to_string(), "Crunch".to_string()],
            LocalClock::from_offset_minutes(0).unwrap(),
        );
        assert_eq!(policy.keywords(), ["crunch".to_string()]);
        assert!(!policy.mentions_stress("nothing to see"));
        assert!(policy.mentions_stress("CRUNCH time"));
    }

    #[test]
    fn fixed_offset_shifts_the_hour() {
        let ts = at_hour(20);
        assert_eq!(LocalClock::from_offset_minutes(0).unwrap().hour(ts), 20);
        assert_eq!(LocalClock::from_offset_minutes(8 * 60).unwrap().hour(ts), 4);
        assert!(LocalClock::from_offset_minutes(48 * 60).is_none());
    }
}
