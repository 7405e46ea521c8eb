//! coach-infer — one-shot clinical inference over a member fact bundle.
//!
//! Reads a static fact bundle (JSON file, or the built-in stub fetcher
//! when no file is given), runs one rule-engine pass plus
//! reconciliation, and prints the resulting actions as JSON on stdout.
//! The actions are instructions for the external applier; nothing is
//! persisted here.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use coach_core::config::{load_dotenv, Config};
use coach_inference::fetch::{FactBundle, FactFetcher, StubFetcher};
use coach_inference::loader::{self, LoadStatus};
use coach_inference::{catalog, Engine, ReconcilePolicy, Reconciler};

// ── CLI ─────────────────────────────────────────────────────────────

/// One-shot clinical inference run.
#[derive(Parser, Debug)]
#[command(name = "coach-infer", version, about)]
struct Cli {
    /// Path to a fact bundle JSON file. Omit to use the stub fetcher.
    #[arg(long, env = "COACH_FACTS")]
    facts: Option<PathBuf>,

    /// Member id passed to the stub fetcher when no facts file is given.
    #[arg(long, env = "COACH_MEMBER_ID", default_value = "member-1")]
    member_id: String,

    /// Directory of YAML rule definitions overriding the built-in catalog.
    #[arg(long, env = "COACH_RULES_DIR")]
    rules_dir: Option<PathBuf>,

    /// Emit delete actions for persisted entities no event matched.
    #[arg(long, env = "COACH_RETIRE", default_value_t = false)]
    retire: bool,

    /// Collapse duplicate same-subtype events within the run.
    #[arg(long, env = "COACH_DEDUPE", default_value_t = false)]
    dedupe: bool,

    /// Pretty-print the action list.
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env().context("invalid environment configuration")?;
    config.log_summary();

    let engine = build_engine(&cli, &config)?;

    let bundle: FactBundle = match &cli.facts {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read fact bundle {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse fact bundle {}", path.display()))?
        }
        None => StubFetcher.fetch(&cli.member_id).await?,
    };

    let result = engine.run(bundle.static_facts()?).await;
    for failure in &result.failures {
        warn!(rule = %failure.rule, error = %failure.error, "rule failed during run");
    }

    let mut policy = ReconcilePolicy::default();
    if cli.retire {
        policy = policy.with_retirement();
    }
    if cli.dedupe {
        policy = policy.with_dedupe();
    }
    let actions = Reconciler::with_policy(policy).reconcile(&result, &bundle.current_state());
    info!(
        run_id = %result.run_id,
        events = result.events.len(),
        actions = actions.len(),
        "reconciliation complete"
    );

    let output = if cli.pretty {
        serde_json::to_string_pretty(&actions)?
    } else {
        serde_json::to_string(&actions)?
    };
    println!("{output}");
    Ok(())
}

/// Build the engine from the rules directory when configured, falling
/// back to the built-in clinical catalog.
fn build_engine(cli: &Cli, config: &Config) -> anyhow::Result<Engine> {
    let rules_dir = cli.rules_dir.clone().or_else(|| config.rules.rules_dir.clone());

    let definitions = match rules_dir {
        Some(dir) => {
            let outcome = loader::load_dir(&dir)
                .with_context(|| format!("failed to load rules from {}", dir.display()))?;
            for result in &outcome.results {
                if let LoadStatus::Failed { error } = &result.status {
                    warn!(path = %result.path.display(), error = %error, "rule file rejected");
                }
            }
            outcome.definitions
        }
        None => catalog::definitions(&config.engine),
    };

    let engine = Engine::builder()
        .rules(definitions)
        .handlers(catalog::handlers())
        .dynamic_facts(catalog::dynamic_facts())
        .allow_undefined_facts(config.engine.allow_undefined_facts)
        .build()?;
    Ok(engine)
}
