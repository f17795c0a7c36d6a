use clap::{Parser, Subcommand, ValueEnum};
use companion_policy::{Context, DecisionService, FeedbackSink, Mode, ServiceConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "companion", version, about = "Desktop companion decision CLI")]
struct Cli {
    /// More log output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one decision locally and print it as JSON
    Decide {
        /// What the user typed (may be empty)
        #[arg(long, default_value = "")]
        text: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Light)]
        mode: ModeArg,
        /// Policy name; overrides COMPANION_POLICY and the config file
        #[arg(long)]
        policy: Option<String>,
        /// Focus signal as key=value, repeatable
        #[arg(long = "signal", value_parser = parse_signal)]
        signals: Vec<(String, String)>,
        /// Fixed UTC offset in minutes for the hour-of-day rules
        #[arg(long, allow_hyphen_values = true)]
        utc_offset_minutes: Option<i32>,
    },
    /// Append a feedback record to the configured log
    Feedback { request_id: String, feedback: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Silent,
    Light,
    Active,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Silent => Mode::Silent,
            ModeArg::Light => Mode::Light,
            ModeArg::Active => Mode::Active,
        }
    }
}

fn parse_signal(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut cfg = ServiceConfig::from_env();

    match cli.command {
        Commands::Decide {
            text,
            mode,
            policy,
            signals,
            utc_offset_minutes,
        } => {
            if policy.is_some() {
                cfg.policy = policy;
            }
            if utc_offset_minutes.is_some() {
                cfg.utc_offset_minutes = utc_offset_minutes;
            }
            let ctx = signals.into_iter().fold(
                Context::new(mode.into(), text, chrono::Utc::now().timestamp_millis()),
                |ctx, (key, value)| ctx.with_signal(key, value),
            );
            let outcome = DecisionService::from_config(&cfg).decide(&ctx).await;
            let report = serde_json::json!({
                "action": outcome.decision.action,
                "policy_version": outcome.decision.policy_version,
                "model_id": outcome.decision.model_id,
                "latency_ms": outcome.latency_ms,
                "gateway_blocked": outcome.gateway_blocked,
                "advisories": outcome.advisories,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Feedback {
            request_id,
            feedback,
        } => {
            let sink = FeedbackSink::new(cfg.feedback_log_path());
            let record = sink.append(&request_id, &feedback).await?;
            println!("{}", serde_json::to_string(&record)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_parse_as_key_value() {
        assert_eq!(
            parse_signal("focus_app = Code").unwrap(),
            ("focus_app".to_string(), "Code".to_string())
        );
        assert_eq!(
            parse_signal("focus_window_title=a=b").unwrap(),
            ("focus_window_title".to_string(), "a=b".to_string())
        );
        assert!(parse_signal("novalue").is_err());
        assert!(parse_signal("=x").is_err());
    }

    #[test]
    fn cli_parses_decide_arguments() {
        let cli = Cli::try_parse_from([
            "companion",
            "decide",
            "--text",
            "deadline",
            "--mode",
            "silent",
            "--signal",
            "focus_minutes=40",
            "--utc-offset-minutes",
            "-300",
        ])
        .unwrap();
        match cli.command {
            Commands::Decide {
                text,
                mode,
                signals,
                utc_offset_minutes,
                policy,
            } => {
                assert_eq!(text, "deadline");
                assert!(matches!(Mode::from(mode), Mode::Silent));
                assert_eq!(signals, vec![("focus_minutes".into(), "40".into())]);
                assert_eq!(utc_offset_minutes, Some(-300));
                assert!(policy.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
