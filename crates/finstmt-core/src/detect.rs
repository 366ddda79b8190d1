//! Institution detection by weighted signature matching.

use std::sync::Arc;

use tracing::debug;

use crate::grammar::{Grammar, PatternRegistry};
use crate::models::statement::UNKNOWN_INSTITUTION;

/// Outcome of institution detection.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Selected grammar (the fallback when nothing matched).
    pub grammar: Arc<Grammar>,

    /// Institution label for the result, `unknown` for the fallback.
    pub institution: String,

    /// Sum of the weights of the signatures that fired.
    pub strength: f32,

    /// `strength` divided by the grammar's total signature weight.
    pub normalized: f32,

    /// Patterns of the signatures that fired.
    pub signatures: Vec<String>,
}

impl DetectionResult {
    pub fn is_fallback(&self) -> bool {
        self.grammar.is_fallback()
    }
}

/// Picks the best-scoring grammar for a document.
#[derive(Debug, Clone)]
pub struct InstitutionDetector {
    registry: Arc<PatternRegistry>,
    min_strength: f32,
}

impl InstitutionDetector {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self {
            registry,
            min_strength: 0.0,
        }
    }

    /// Strength a grammar must exceed to be selected.
    pub fn with_min_strength(mut self, min_strength: f32) -> Self {
        self.min_strength = min_strength;
        self
    }

    /// Select a grammar for `text`.
    ///
    /// The highest strength wins; ties keep the earliest registration.
    pub fn detect(&self, text: &str) -> DetectionResult {
        let mut best: Option<(&Arc<Grammar>, f32, Vec<String>)> = None;

        for grammar in self.registry.institutions() {
            let (strength, fired) = score(grammar, text);
            if strength <= 0.0 {
                continue;
            }
            debug!(
                "Signature score for {}: {:.2} ({} fired)",
                grammar.institution,
                strength,
                fired.len()
            );
            if best.as_ref().is_none_or(|(_, s, _)| strength > *s) {
                best = Some((grammar, strength, fired));
            }
        }

        match best {
            Some((grammar, strength, signatures)) if strength > self.min_strength => {
                let total = distinct_weight(grammar);
                let normalized = if total > 0.0 {
                    (strength / total).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                debug!(
                    "Detected institution {} (strength {:.2}, normalized {:.2})",
                    grammar.institution, strength, normalized
                );
                DetectionResult {
                    grammar: Arc::clone(grammar),
                    institution: grammar.institution.clone(),
                    strength,
                    normalized,
                    signatures,
                }
            }
            _ => {
                debug!("No institution above threshold, using fallback grammar");
                DetectionResult {
                    grammar: Arc::clone(self.registry.fallback()),
                    institution: UNKNOWN_INSTITUTION.to_string(),
                    strength: 0.0,
                    normalized: 0.0,
                    signatures: Vec::new(),
                }
            }
        }
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }
}

/// Strength of one grammar against `text`; each distinct signature counts once.
pub fn score(grammar: &Grammar, text: &str) -> (f32, Vec<String>) {
    let mut fired: Vec<String> = Vec::new();
    let mut strength = 0.0;

    for signature in &grammar.signatures {
        if fired.contains(&signature.name) {
            continue;
        }
        if signature.is_match(text) {
            strength += signature.weight;
            fired.push(signature.name.clone());
        }
    }

    (strength, fired)
}

fn distinct_weight(grammar: &Grammar) -> f32 {
    let mut seen: Vec<&str> = Vec::new();
    let mut total = 0.0;
    for signature in &grammar.signatures {
        if !seen.contains(&signature.name.as_str()) {
            seen.push(&signature.name);
            total += signature.weight;
        }
    }
    total
}
