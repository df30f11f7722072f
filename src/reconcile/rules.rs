//! Rule tables for the token classifier.
//!
//! Loaded once at startup from the embedded JSON asset (or a user file)
//! and shared read-only by every frame.

use crate::error::RulesError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Rules JSON structure
#[derive(Debug, Deserialize)]
struct RulesJson {
    blacklist: Vec<String>,
    #[serde(default)]
    garbage_substrings: Vec<String>,
}

/// Embedded default rules
const RULES_JSON: &str = include_str!("../../assets/rules.json");

/// Broadcast-UI terms and OCR garbage patterns, lowercased
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTables {
    blacklist: HashSet<String>,
    garbage_substrings: Vec<String>,
}

impl RuleTables {
    pub fn new<I, J, S, T>(blacklist: I, garbage_substrings: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            blacklist: blacklist
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            garbage_substrings: garbage_substrings
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Load the tables shipped with the crate
    pub fn embedded() -> Result<Self, RulesError> {
        Self::from_json(RULES_JSON)
    }

    /// Load tables from a user-supplied JSON file
    pub fn load_from(path: &Path) -> Result<Self, RulesError> {
        let content = fs::read_to_string(path).map_err(|e| RulesError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        let tables = Self::from_json(&content).map_err(|e| match e {
            RulesError::Invalid(msg) => RulesError::LoadFailed {
                path: path.display().to_string(),
                source: msg.into(),
            },
            other => other,
        })?;
        tracing::info!(
            "Loaded rule tables from {} ({} blacklist terms)",
            path.display(),
            tables.blacklist.len()
        );
        Ok(tables)
    }

    /// User file when given, embedded tables otherwise
    pub fn resolve(path: Option<&Path>) -> Result<Self, RulesError> {
        match path {
            Some(p) => Self::load_from(p),
            None => Self::embedded(),
        }
    }

    fn from_json(json: &str) -> Result<Self, RulesError> {
        let parsed: RulesJson =
            serde_json::from_str(json).map_err(|e| RulesError::Invalid(e.to_string()))?;
        if parsed.blacklist.is_empty() {
            return Err(RulesError::Invalid("blacklist is empty".to_string()));
        }
        Ok(Self::new(parsed.blacklist, parsed.garbage_substrings))
    }

    /// Case-insensitive exact match against the blacklist
    pub fn is_blacklisted(&self, text: &str) -> bool {
        self.blacklist.contains(&text.trim().to_lowercase())
    }

    /// Case-insensitive substring match against the garbage patterns
    pub fn contains_garbage(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.garbage_substrings
            .iter()
            .any(|pattern| lower.contains(pattern.as_str()))
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }
}
