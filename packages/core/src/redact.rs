//! PII redaction: a stateless text transform applied to log message bodies
//! before they leave the process.
//!
//! Rules are an ordered list of (pattern, replacement) pairs applied left to
//! right. False negatives on leaked secrets are the failure mode that
//! matters, so rules favor over-matching; the credit-card rule is the one
//! exception and ships disabled until a deployment opts in (13-16 digit runs
//! collide with order numbers and similar benign ids).

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Email addresses, case-insensitive. The whole address is replaced.
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,6}")
        .expect("checked literal pattern")
});

/// US social security numbers in dashed form.
static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("checked literal pattern"));

/// 13-16 digit runs, optionally separated by spaces or dashes.
static CREDIT_CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]*?){13,16}\b").expect("checked literal pattern"));

/// Values of well-known sensitive keys in JSON-like text. Captures the key
/// name so the replacement can keep it while masking the value.
static SENSITIVE_JSON_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"(password|secret|token|apikey|key)"\s*:\s*"[^"]+""#)
        .expect("checked literal pattern")
});

/// Tuning knobs for [`Redactor`] construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionOptions {
    /// Enables the 13-16 digit credit-card rule. Off by default to avoid
    /// masking benign long numbers.
    pub mask_credit_cards: bool,
}

#[derive(Debug)]
struct Rule {
    pattern: &'static Regex,
    replacement: &'static str,
}

/// Ordered sequence of masking rules over plain text.
#[derive(Debug)]
pub struct Redactor {
    rules: Vec<Rule>,
}

impl Redactor {
    /// Builds the rule list for the given options. Rule order is fixed:
    /// emails, SSNs, credit cards (when enabled), then sensitive JSON
    /// fields.
    #[must_use]
    pub fn new(options: RedactionOptions) -> Self {
        let mut rules = vec![
            Rule {
                pattern: &EMAIL,
                replacement: "[EMAIL]",
            },
            Rule {
                pattern: &SSN,
                replacement: "[SSN]",
            },
        ];
        if options.mask_credit_cards {
            rules.push(Rule {
                pattern: &CREDIT_CARD,
                replacement: "[CARD]",
            });
        }
        rules.push(Rule {
            pattern: &SENSITIVE_JSON_FIELD,
            replacement: r#""${1}":"***""#,
        });
        Self { rules }
    }

    /// Applies every rule in order. Returns the input borrowed when nothing
    /// matched.
    #[must_use]
    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(input);
        for rule in &self.rules {
            if rule.pattern.is_match(&out) {
                let replaced = rule.pattern.replace_all(&out, rule.replacement).into_owned();
                out = Cow::Owned(replaced);
            }
        }
        out
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(RedactionOptions::default())
    }
}

static DEFAULT_REDACTOR: LazyLock<Redactor> = LazyLock::new(Redactor::default);

/// Redacts with the process-default rule set (credit-card rule off).
#[must_use]
pub fn redact(input: &str) -> Cow<'_, str> {
    DEFAULT_REDACTOR.redact(input)
}
