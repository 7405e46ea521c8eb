//! Construction-time validation of rule definitions.
//!
//! Collects every problem in one pass rather than failing on the
//! first, so a misconfigured rule set reports all of its defects at
//! once. Errors block engine construction; warnings are advisory.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::operators::OperatorRegistry;
use crate::rule::{HandlerRegistry, RuleDefinition};

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Location, e.g. `"loneliness.conditions.all[1]"`.
    pub path: String,
    pub message: String,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// One-line summary of all errors, for error messages.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a rule definition list against the operator and handler
/// registries it will run with.
pub fn validate_definitions(
    definitions: &[RuleDefinition],
    operators: &OperatorRegistry,
    handlers: &HandlerRegistry,
) -> ValidationResult {
    let mut result = ValidationResult::new();
    let mut names: HashSet<&str> = HashSet::new();
    let mut emitted: HashSet<(String, String)> = HashSet::new();

    for def in definitions {
        let name = if def.name.is_empty() { "(unnamed)" } else { def.name.as_str() };

        if def.name.is_empty() {
            result.error(name, "rule name must not be empty");
        } else if !names.insert(def.name.as_str()) {
            result.error(name, "duplicate rule name");
        }

        check_condition(&def.conditions, &format!("{name}.conditions"), operators, &mut result);

        if def.event.params.subtype.is_empty() {
            result.error(
                format!("{name}.event.params.type"),
                "event subtype must not be empty",
            );
        }

        if let Some(category) = &def.handler {
            if !handlers.contains(category) {
                result.error(
                    format!("{name}.handler"),
                    format!("unknown handler category '{category}'"),
                );
            }
        }

        let key = (def.event.kind.to_string(), def.event.params.subtype.clone());
        if !emitted.insert(key) {
            result.warn(
                format!("{name}.event"),
                "another rule emits the same entity kind and subtype; duplicate events \
                 are not deduplicated by default",
            );
        }
    }

    result
}

fn check_condition(
    condition: &Condition,
    path: &str,
    operators: &OperatorRegistry,
    result: &mut ValidationResult,
) {
    match condition {
        Condition::All { all } => {
            if all.is_empty() {
                result.error(path, "'all' must have at least one child");
            }
            for (i, child) in all.iter().enumerate() {
                check_condition(child, &format!("{path}.all[{i}]"), operators, result);
            }
        }
        Condition::Any { any } => {
            if any.is_empty() {
                result.error(path, "'any' must have at least one child");
            }
            for (i, child) in any.iter().enumerate() {
                check_condition(child, &format!("{path}.any[{i}]"), operators, result);
            }
        }
        Condition::Leaf(comparison) => {
            if comparison.fact.is_empty() {
                result.error(path, "fact id must not be empty");
            }
            if !operators.contains(&comparison.operator) {
                result.error(
                    path,
                    format!("unknown operator '{}'", comparison.operator),
                );
            }
        }
    }
}
