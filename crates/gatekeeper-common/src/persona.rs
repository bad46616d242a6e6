//! Reviewer personas and static reviewer configuration.
//!
//! A persona selects the system prompt a reviewer agent runs under. Each
//! built-in persona carries default focus areas; a [`ReviewerConfig`] can add
//! to them or replace the whole system prompt.
//!
//! ## Personas
//!
//! | Persona | Name | Focus |
//! |---------|------|-------|
//! | [`Persona::General`] | `general` | correctness, readability, tests |
//! | [`Persona::Security`] | `security` | injection, secrets, auth |
//! | [`Persona::Performance`] | `performance` | complexity, allocations, blocking |
//! | [`Persona::Architecture`] | `architecture` | coupling, layering, abstractions |
//! | [`Persona::MultiPersona`] | `multi` | coordinator covering all of the above |
//!
//! ```
//! use gatekeeper_common::{Persona, ReviewerConfig};
//!
//! assert_eq!(Persona::from_name("security-sentinel"), Some(Persona::Security));
//! let config = ReviewerConfig::for_persona(Persona::Performance);
//! assert_eq!(config.persona(), Persona::Performance);
//! assert!(config.effective_focus_areas().iter().any(|a| a.contains("N+1")));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Model used when the configuration does not name one.
pub const DEFAULT_REVIEWER_MODEL: &str = "claude-sonnet-4-5";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    General,
    Security,
    Performance,
    Architecture,
    #[serde(rename = "multi")]
    MultiPersona,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Architecture => "architecture",
            Self::MultiPersona => "multi",
        }
    }

    /// Resolve a persona from a configured reviewer name.
    ///
    /// Accepts the short names plus the long specialist-style forms
    /// (`security-sentinel`, `performance_oracle`, `coordinator`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "general" | "default" | "reviewer" => Some(Self::General),
            "security" | "security-sentinel" => Some(Self::Security),
            "performance" | "performance-oracle" => Some(Self::Performance),
            "architecture" | "architecture-strategist" => Some(Self::Architecture),
            "multi" | "multi-persona" | "coordinator" => Some(Self::MultiPersona),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::General => "General Reviewer",
            Self::Security => "Security Sentinel",
            Self::Performance => "Performance Oracle",
            Self::Architecture => "Architecture Strategist",
            Self::MultiPersona => "Review Coordinator",
        }
    }

    /// Default focus areas for this persona.
    pub fn focus_areas(&self) -> Vec<&'static str> {
        match self {
            Self::General => vec![
                "Logic errors and incorrect edge-case handling",
                "Error handling and failure paths",
                "Readability and naming",
                "Missing or weak test coverage",
                "Documentation drift",
            ],
            Self::Security => vec![
                "SQL injection vulnerabilities",
                "Cross-site scripting (XSS)",
                "Authentication bypass risks",
                "Secrets exposure in code or logs",
                "Input validation gaps",
                "Command injection vectors",
                "Path traversal vulnerabilities",
                "Insecure deserialization",
            ],
            Self::Performance => vec![
                "N+1 query patterns",
                "Missing database indexes",
                "Memory leaks and unbounded growth",
                "Algorithmic complexity issues",
                "Unnecessary allocations",
                "Blocking operations in async code",
            ],
            Self::Architecture => vec![
                "Excessive coupling between modules",
                "Layering violations",
                "Separation of concerns issues",
                "Circular dependencies",
                "Inconsistent abstraction levels",
                "God objects or functions",
            ],
            Self::MultiPersona => vec![
                "Correctness and error handling",
                "Security vulnerabilities",
                "Performance regressions",
                "Architectural fit",
                "Test coverage",
            ],
        }
    }

    pub fn all() -> [Self; 5] {
        [
            Self::General,
            Self::Security,
            Self::Performance,
            Self::Architecture,
            Self::MultiPersona,
        ]
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration for one reviewer. Not mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Full system-prompt override. When set, persona prompts are not used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_name() -> String {
    Persona::General.as_str().to_string()
}

fn default_model() -> String {
    DEFAULT_REVIEWER_MODEL.to_string()
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            model: default_model(),
            focus_areas: Vec::new(),
            ignore_patterns: Vec::new(),
            system_prompt: None,
        }
    }
}

impl ReviewerConfig {
    pub fn for_persona(persona: Persona) -> Self {
        Self {
            name: persona.as_str().to_string(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Persona named by `name`, falling back to [`Persona::General`].
    pub fn persona(&self) -> Persona {
        Persona::from_name(&self.name).unwrap_or_default()
    }

    /// Persona defaults followed by any configured extra focus areas,
    /// without duplicates.
    pub fn effective_focus_areas(&self) -> Vec<String> {
        let mut areas: Vec<String> = self
            .persona()
            .focus_areas()
            .into_iter()
            .map(String::from)
            .collect();
        for extra in &self.focus_areas {
            if !areas.iter().any(|a| a.eq_ignore_ascii_case(extra)) {
                areas.push(extra.clone());
            }
        }
        areas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_accepts_long_forms() {
        assert_eq!(Persona::from_name("general"), Some(Persona::General));
        assert_eq!(
            Persona::from_name("performance_oracle"),
            Some(Persona::Performance)
        );
        assert_eq!(
            Persona::from_name("Architecture-Strategist"),
            Some(Persona::Architecture)
        );
        assert_eq!(Persona::from_name("coordinator"), Some(Persona::MultiPersona));
        assert_eq!(Persona::from_name("astrologer"), None);
    }

    #[test]
    fn test_as_str_round_trips_through_from_name() {
        for persona in Persona::all() {
            assert_eq!(Persona::from_name(persona.as_str()), Some(persona));
        }
    }

    #[test]
    fn test_config_defaults() {
        let config: ReviewerConfig = parse_json("{}");
        assert_eq!(config.name, "general");
        assert_eq!(config.model, DEFAULT_REVIEWER_MODEL);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_unknown_persona_name_falls_back_to_general() {
        let config = ReviewerConfig {
            name: "mystery".into(),
            ..ReviewerConfig::default()
        };
        assert_eq!(config.persona(), Persona::General);
    }

    #[test]
    fn test_effective_focus_areas_dedupes_extras() {
        let config = ReviewerConfig {
            name: "security".into(),
            focus_areas: vec![
                "sql injection vulnerabilities".into(),
                "Unsafe FFI".into(),
            ],
            ..ReviewerConfig::default()
        };
        let areas = config.effective_focus_areas();
        assert_eq!(
            areas.len(),
            Persona::Security.focus_areas().len() + 1
        );
        assert_eq!(areas.last().map(String::as_str), Some("Unsafe FFI"));
    }

    fn parse_json(json: &str) -> ReviewerConfig {
        serde_json::from_str(json).unwrap()
    }
}
