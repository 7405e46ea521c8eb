use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoachError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// A set-but-unparsable variable is a configuration error; only an
/// unset variable falls back to the default.
fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool, CoachError> {
    match raw {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(CoachError::Config {
            key: key.to_string(),
            value: v,
            message: "expected true/false or 1/0".to_string(),
        }),
    }
}

fn parse_i32(key: &str, raw: Option<String>, default: i32) -> Result<i32, CoachError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e| CoachError::Config {
            key: key.to_string(),
            value: v,
            message: format!("{e}"),
        }),
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub rules: RulesConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, CoachError> {
        Ok(Self {
            engine: EngineConfig::from_env()?,
            rules: RulesConfig::from_env(),
        })
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  engine: allow_undefined_facts={}, barrier_priority={}, care_plan_priority={}",
            self.engine.allow_undefined_facts,
            self.engine.barrier_priority,
            self.engine.care_plan_priority,
        );
        tracing::info!(
            "  rules:  dir={}",
            self.rules
                .rules_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(built-in catalog)".to_string()),
        );
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// When true, resolving an unregistered fact yields an undefined
    /// sentinel instead of failing the rule.
    pub allow_undefined_facts: bool,
    /// Priority assigned to every barrier-producing rule.
    pub barrier_priority: i32,
    /// Priority assigned to every care-plan-producing rule. Must stay
    /// below `barrier_priority` so barrier handlers complete first.
    pub care_plan_priority: i32,
}

impl EngineConfig {
    fn from_env() -> Result<Self, CoachError> {
        Ok(Self {
            allow_undefined_facts: parse_bool(
                "COACH_ALLOW_UNDEFINED_FACTS",
                env_opt("COACH_ALLOW_UNDEFINED_FACTS"),
                false,
            )?,
            barrier_priority: parse_i32(
                "COACH_BARRIER_PRIORITY",
                env_opt("COACH_BARRIER_PRIORITY"),
                100,
            )?,
            care_plan_priority: parse_i32(
                "COACH_CARE_PLAN_PRIORITY",
                env_opt("COACH_CARE_PLAN_PRIORITY"),
                10,
            )?,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_undefined_facts: false,
            barrier_priority: 100,
            care_plan_priority: 10,
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Optional directory of YAML rule definitions. When unset, the
    /// built-in clinical catalog is used.
    pub rules_dir: Option<PathBuf>,
}

impl RulesConfig {
    fn from_env() -> Self {
        Self {
            rules_dir: env_opt("COACH_RULES_DIR").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults_keep_barriers_above_care_plans() {
        let cfg = EngineConfig::default();
        assert!(cfg.barrier_priority > cfg.care_plan_priority);
        assert!(!cfg.allow_undefined_facts);
    }

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        assert!(parse_bool("K", None, true).unwrap());
        assert_eq!(parse_i32("K", None, 42).unwrap(), 42);
    }

    #[test]
    fn set_variables_parse() {
        assert!(parse_bool("K", Some("1".into()), false).unwrap());
        assert!(!parse_bool("K", Some("false".into()), true).unwrap());
        assert_eq!(parse_i32("K", Some("7".into()), 0).unwrap(), 7);
    }

    #[test]
    fn garbage_values_are_config_errors() {
        let err = parse_i32("COACH_BARRIER_PRIORITY", Some("lots".into()), 100).unwrap_err();
        match err {
            CoachError::Config { key, value, .. } => {
                assert_eq!(key, "COACH_BARRIER_PRIORITY");
                assert_eq!(value, "lots");
            }
        }
        assert!(parse_bool("COACH_RETIRE", Some("yep".into()), false).is_err());
    }
}
