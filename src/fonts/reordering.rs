//! Visual glyph reordering rules.
//!
//! Some scripts (Indic scripts in particular) need characters moved before
//! shaping-unaware glyph lookup, e.g. a pre-base vowel sign written after
//! its consonant in logical order. A font may carry a table of regular
//! expression rules that rewrite text into visual order. Rules run in
//! sequence; a repeating rule runs until the text stops changing or a pass
//! limit is hit.

use regex::Regex;

use crate::error::{Error, Result};

/// One rewrite rule.
#[derive(Debug, Clone)]
pub struct ReorderRule {
    pattern: Regex,
    replacement: String,
    repeat: bool,
}

impl ReorderRule {
    /// Compile a rule. The replacement uses `$1`-style group references.
    pub fn new(pattern: &str, replacement: &str, repeat: bool) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            Error::InvalidFontFile(format!("bad reordering pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
            repeat,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat
    }
}

/// An ordered set of rules.
#[derive(Debug, Clone)]
pub struct Reordering {
    rules: Vec<ReorderRule>,
    max_passes: usize,
}

impl Reordering {
    pub fn new(rules: Vec<ReorderRule>, max_passes: usize) -> Self {
        Self {
            rules,
            max_passes: max_passes.max(1),
        }
    }

    pub fn rules(&self) -> &[ReorderRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrite `text` into visual order.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            if !rule.repeat {
                out = rule.pattern.replace_all(&out, rule.replacement.as_str()).into_owned();
                continue;
            }
            let mut passes = 0;
            loop {
                let next = rule.pattern.replace_all(&out, rule.replacement.as_str());
                if next == out {
                    break;
                }
                out = next.into_owned();
                passes += 1;
                if passes >= self.max_passes {
                    log::warn!(
                        "Reordering rule '{}' still changing text after {} passes",
                        rule.pattern(),
                        passes
                    );
                    break;
                }
            }
        }
        out
    }
}
