//! Data-driven description of how one provider's output maps to events

use std::path::PathBuf;

use regex::Regex;
use serde_json::Value;

use crate::normalize::event::EventKind;
use crate::normalize::text::{discriminator_text, lookup};
use crate::stream::FramingMode;

/// How successive streaming deltas combine into one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    /// Each delta carries new text to append
    Append,
    /// Each delta carries the whole text so far
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaSpec {
    pub text_path: String,
    /// Field identifying the logical turn; contiguous deltas share a turn when absent
    pub turn_path: Option<String>,
    pub mode: DeltaMode,
}

impl DeltaSpec {
    pub fn append(text_path: &str) -> Self {
        Self {
            text_path: text_path.to_string(),
            turn_path: None,
            mode: DeltaMode::Append,
        }
    }

    pub fn replace(text_path: &str) -> Self {
        Self {
            mode: DeltaMode::Replace,
            ..Self::append(text_path)
        }
    }

    pub fn keyed_by(mut self, turn_path: &str) -> Self {
        self.turn_path = Some(turn_path.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Emit(EventKind),
    Delta(DeltaSpec),
    /// Provider-internal output that produces no event
    Noise,
}

/// Copy a nested field into a canonical payload key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAlias {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindRule {
    /// Native type key, the `:`-joined discriminator values
    pub native: String,
    pub action: RuleAction,
    pub aliases: Vec<FieldAlias>,
}

impl KindRule {
    pub fn alias(mut self, from: &str, to: &str) -> Self {
        self.aliases.push(FieldAlias {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }
}

/// A plain-text line pattern; named capture groups become payload fields
#[derive(Debug, Clone)]
pub struct TextPattern {
    pub regex: Regex,
    pub kind: EventKind,
    pub fixed: Vec<(String, String)>,
}

impl TextPattern {
    pub fn new(pattern: &str, kind: EventKind) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            kind,
            fixed: Vec::new(),
        })
    }

    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fixed.push((key.to_string(), value.to_string()));
        self
    }
}

/// Everything the core knows about one provider
#[derive(Debug, Clone)]
pub struct ProviderMapping {
    pub id: String,
    /// False for the fail-closed stand-in used for unknown providers
    pub registered: bool,
    pub framing_hint: Option<FramingMode>,
    pub discriminator_paths: Vec<String>,
    pub rules: Vec<KindRule>,
    pub fallback_kind: EventKind,
    pub timestamp_paths: Vec<String>,
    pub text_patterns: Vec<TextPattern>,
    pub text_noise: Vec<Regex>,
    /// Side-channel directory; relative paths resolve against the working directory
    pub state_dir: Option<PathBuf>,
    /// File names under `state_dir` to watch; empty watches every file
    pub watched_files: Vec<String>,
}

impl ProviderMapping {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            registered: true,
            framing_hint: None,
            discriminator_paths: vec!["type".to_string()],
            rules: Vec::new(),
            fallback_kind: EventKind::Message,
            timestamp_paths: Vec::new(),
            text_patterns: Vec::new(),
            text_noise: Vec::new(),
            state_dir: None,
            watched_files: Vec::new(),
        }
    }

    /// Mapping used when a provider has no registration: plain text, no
    /// patterns, no activity fallback
    pub fn unregistered(id: impl Into<String>) -> Self {
        Self {
            registered: false,
            framing_hint: Some(FramingMode::PlainText),
            discriminator_paths: Vec::new(),
            ..Self::new(id)
        }
    }

    pub fn framing(mut self, mode: FramingMode) -> Self {
        self.framing_hint = Some(mode);
        self
    }

    pub fn discriminate(mut self, paths: &[&str]) -> Self {
        self.discriminator_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn emit(self, native: &str, kind: EventKind) -> Self {
        self.rule(native, RuleAction::Emit(kind), |r| r)
    }

    pub fn emit_with(
        self,
        native: &str,
        kind: EventKind,
        aliases: &[(&str, &str)],
    ) -> Self {
        self.rule(native, RuleAction::Emit(kind), |rule| {
            aliases
                .iter()
                .fold(rule, |rule, (from, to)| rule.alias(from, to))
        })
    }

    pub fn delta(self, native: &str, spec: DeltaSpec) -> Self {
        self.rule(native, RuleAction::Delta(spec), |r| r)
    }

    pub fn noise(mut self, natives: &[&str]) -> Self {
        for native in natives {
            self = self.rule(native, RuleAction::Noise, |r| r);
        }
        self
    }

    pub fn timestamps(mut self, paths: &[&str]) -> Self {
        self.timestamp_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn pattern(mut self, pattern: TextPattern) -> Self {
        self.text_patterns.push(pattern);
        self
    }

    pub fn text_noise(mut self, regex: Regex) -> Self {
        self.text_noise.push(regex);
        self
    }

    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn watch(mut self, files: &[&str]) -> Self {
        self.watched_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    fn rule(
        mut self,
        native: &str,
        action: RuleAction,
        configure: impl FnOnce(KindRule) -> KindRule,
    ) -> Self {
        let rule = configure(KindRule {
            native: native.to_string(),
            action,
            aliases: Vec::new(),
        });
        self.rules.push(rule);
        self
    }

    /// Native type key of a provider object, if any discriminator is present
    pub fn discriminator(&self, value: &Value) -> Option<String> {
        let parts: Vec<String> = self
            .discriminator_paths
            .iter()
            .filter_map(|path| lookup(value, path).and_then(discriminator_text))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(":"))
        }
    }

    /// Most specific rule for a native type key.
    ///
    /// `a:b:c` is tried first, then `a:b`, then `a`.
    pub fn rule_for(&self, native: &str) -> Option<&KindRule> {
        let mut key = native;
        loop {
            if let Some(rule) = self.rules.iter().find(|r| r.native == key) {
                return Some(rule);
            }
            match key.rfind(':') {
                Some(idx) => key = &key[..idx],
                None => return None,
            }
        }
    }

    pub fn has_activity_fallback(&self) -> bool {
        self.registered && self.state_dir.is_some()
    }
}
