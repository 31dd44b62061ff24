//! Ordered pattern rules: the first rule whose pattern matches wins.

use regex::Regex;
use serde::Serialize;

/// How distinctive a matched phrase is. Ordered from strongest to weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Title,
    FormCode,
    Keyword,
}

#[derive(Debug)]
pub(crate) struct Rule {
    pub label: &'static str,
    pub strength: Strength,
    pub pattern: Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct RuleMatch {
    pub label: &'static str,
    pub strength: Strength,
    pub matched: String,
    pub rule_index: usize,
}

/// Compile `(label, strength, pattern)` triples, keeping their order.
pub(crate) fn compile(specs: &[(&'static str, Strength, &str)]) -> Vec<Rule> {
    specs
        .iter()
        .map(|&(label, strength, pattern)| Rule {
            label,
            strength,
            pattern: Regex::new(pattern).expect("valid rule pattern"),
        })
        .collect()
}

/// Apply rules in list order and return the first hit.
pub(crate) fn first_match(rules: &[Rule], text: &str) -> Option<RuleMatch> {
    rules.iter().enumerate().find_map(|(rule_index, rule)| {
        rule.pattern.find(text).map(|m| RuleMatch {
            label: rule.label,
            strength: rule.strength,
            matched: m.as_str().to_string(),
            rule_index,
        })
    })
}
