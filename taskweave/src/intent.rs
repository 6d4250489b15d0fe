//! Coarse intent classification for raw requests.
//!
//! Classification is keyword driven against ordered rule sets; this is not a
//! natural-language parser. The first matching rule set becomes the primary
//! tag, later matches become secondary tags, and a couple of regexes pull
//! out obvious entities (quoted strings, file paths).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Primary tag used when no rule set matches.
pub const GENERAL_INTENT: &str = "general";

/// Classification of a raw request. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub primary: String,
    pub secondary: Vec<String>,
    pub entities: HashMap<String, String>,
}

struct IntentRule {
    tag: &'static str,
    keywords: &'static [&'static str],
}

// Order matters: the first matching rule set wins the primary slot.
static RULES: &[IntentRule] = &[
    IntentRule {
        tag: "file_operation",
        keywords: &[
            "file", "read", "write", "create", "delete", "move", "copy", "rename", "directory",
            "folder",
        ],
    },
    IntentRule {
        tag: "code_analysis",
        keywords: &["review", "analyze", "lint", "refactor", "audit", "code quality"],
    },
    IntentRule {
        tag: "search",
        keywords: &["search", "find", "look for", "grep", "locate", "where is"],
    },
];

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("static regex"));
static PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[\w.\-]+/)+[\w.\-]+|\b[\w\-]+\.[a-zA-Z]{1,8}\b").expect("static regex"));

/// Stateless classifier. `analyze` has no side effects.
pub struct IntentAnalyzer;

impl IntentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Classify a raw request. Fails with a validation error on empty input.
    pub fn analyze(&self, request: &str) -> Result<Intent> {
        let trimmed = request.trim();
        if trimmed.is_empty() {
            return Err(OrchestratorError::Validation(
                "request must not be empty".to_string(),
            ));
        }

        let lowered = trimmed.to_lowercase();
        let mut matched: Vec<&'static str> = Vec::new();
        for rule in RULES {
            if rule.keywords.iter().any(|k| lowered.contains(k)) {
                matched.push(rule.tag);
            }
        }

        let (primary, secondary) = match matched.split_first() {
            Some((first, rest)) => (
                first.to_string(),
                rest.iter().map(|t| t.to_string()).collect(),
            ),
            None => (GENERAL_INTENT.to_string(), Vec::new()),
        };

        Ok(Intent {
            primary,
            secondary,
            entities: extract_entities(trimmed),
        })
    }
}

impl Default for IntentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_entities(request: &str) -> HashMap<String, String> {
    let mut entities = HashMap::new();

    if let Some(caps) = QUOTED.captures(request) {
        let quoted = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string());
        if let Some(text) = quoted {
            entities.insert("quoted".to_string(), text);
        }
    }

    if let Some(m) = PATH.find(request) {
        entities.insert("path".to_string(), m.as_str().to_string());
    }

    entities
}
