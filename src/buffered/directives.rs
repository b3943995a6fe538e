// Copyright 2026 The Causeway Project
// SPDX-License-Identifier: Apache-2.0

// Inline control directives.
//
// Users can steer reasoning through bracket tags embedded in plain
// message text: `[think]`, `[no-think]`, `[think:low|medium|high]`.
// Only plain string content is scanned; the last matching tag across
// all scanned messages wins. Tags are stripped before forwarding so
// the upstream never sees them.

use regex::Regex;
use std::sync::OnceLock;

/// Reasoning depth requested by a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    pub fn as_str(self) -> &'static str {
        match self {
            Effort::Low => "low",
            Effort::Medium => "medium",
            Effort::High => "high",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Effort::Low),
            "medium" => Some(Effort::Medium),
            "high" => Some(Effort::High),
            _ => None,
        }
    }
}

/// Reasoning configuration extracted from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveConfig {
    pub thinking: bool,
    pub effort: Option<Effort>,
}

impl DirectiveConfig {
    /// The configuration recorded when request translation fails.
    pub fn disabled() -> Self {
        Self {
            thinking: false,
            effort: None,
        }
    }
}

fn directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(?:(no-think)|think(?::(low|medium|high))?)\]").expect("static pattern")
    })
}

/// Scan one plain-string message.
///
/// Returns the last directive found in the text (if any) and the text
/// with every directive tag removed.
pub fn scan(text: &str) -> (Option<DirectiveConfig>, String) {
    let re = directive_re();

    let mut found = None;
    for caps in re.captures_iter(text) {
        found = Some(if caps.get(1).is_some() {
            DirectiveConfig {
                thinking: false,
                effort: None,
            }
        } else {
            DirectiveConfig {
                thinking: true,
                effort: caps.get(2).and_then(|m| Effort::parse(m.as_str())),
            }
        });
    }

    let stripped = re.replace_all(text, "").into_owned();
    (found, stripped)
}
