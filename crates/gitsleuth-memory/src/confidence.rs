use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[CONFIDENCE:\s*(high|medium|low)\s*\]").unwrap());

const HIGH_CERTAINTY: &[&str] = &["definitely", "certainly", "clearly", "always"];
const HEDGING: &[&str] = &["may", "might", "probably", "possibly", "perhaps", "likely"];

/// Discrete confidence label attached to an answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Extract an inline `[CONFIDENCE: high|medium|low]` tag, case-insensitive.
    #[must_use]
    pub fn from_marker(text: &str) -> Option<Self> {
        let caps = MARKER_RE.captures(text)?;
        caps.get(1)?.as_str().parse().ok()
    }

    /// Guess a label from wording when no explicit value was supplied.
    ///
    /// An inline tag wins; otherwise certainty words, then hedging words, then low.
    #[must_use]
    pub fn infer_from_text(text: &str) -> Self {
        if let Some(marked) = Self::from_marker(text) {
            return marked;
        }
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.iter().any(|w| HIGH_CERTAINTY.contains(w)) {
            Self::High
        } else if words.iter().any(|w| HEDGING.contains(w)) {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown confidence level: {other}")),
        }
    }
}
