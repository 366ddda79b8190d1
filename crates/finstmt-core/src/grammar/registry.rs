//! Registry of compiled grammars.

use std::sync::Arc;

use tracing::debug;

use super::{builtin, Grammar, GrammarSpec, GENERIC};
use crate::error::GrammarError;

/// Ordered set of institution grammars plus the generic fallback.
///
/// Built once, then shared read-only (typically as `Arc<PatternRegistry>`).
/// Registration order is the detection tie-break order.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    fallback: Arc<Grammar>,
    grammars: Vec<Arc<Grammar>>,
}

impl PatternRegistry {
    /// Registry holding only the generic fallback.
    pub fn new() -> Self {
        Self {
            fallback: builtin::generic(),
            grammars: Vec::new(),
        }
    }

    /// Registry preloaded with every built-in institution.
    pub fn builtin() -> Self {
        Self {
            fallback: builtin::generic(),
            grammars: builtin::institutions(),
        }
    }

    /// Add or replace a grammar.
    ///
    /// A replacement keeps the slot of the grammar it replaces. Registering
    /// under `generic` replaces the fallback.
    pub fn register(&mut self, institution: &str, grammar: Grammar) {
        let grammar = Arc::new(grammar);

        if institution.eq_ignore_ascii_case(GENERIC) {
            debug!("Replacing fallback grammar");
            self.fallback = grammar;
            return;
        }

        match self
            .grammars
            .iter()
            .position(|g| g.institution.eq_ignore_ascii_case(institution))
        {
            Some(slot) => {
                debug!("Replacing grammar for {} in slot {}", institution, slot);
                self.grammars[slot] = grammar;
            }
            None => {
                debug!("Registering grammar for {}", institution);
                self.grammars.push(grammar);
            }
        }
    }

    /// Compile and register a spec; empty sections inherit from the generic grammar.
    pub fn register_spec(&mut self, spec: GrammarSpec) -> Result<(), GrammarError> {
        let spec = if spec.institution.eq_ignore_ascii_case(GENERIC) {
            spec
        } else {
            spec.inherit(&builtin::generic_spec())
        };
        let grammar = spec.compile()?;
        self.register(&spec.institution, grammar);
        Ok(())
    }

    /// Case-insensitive lookup by institution name.
    pub fn lookup(&self, institution: &str) -> Option<Arc<Grammar>> {
        if institution.eq_ignore_ascii_case(GENERIC) {
            return Some(Arc::clone(&self.fallback));
        }
        self.grammars
            .iter()
            .find(|g| g.institution.eq_ignore_ascii_case(institution))
            .cloned()
    }

    /// The fallback first, then institutions in registration order.
    pub fn all(&self) -> Vec<Arc<Grammar>> {
        std::iter::once(Arc::clone(&self.fallback))
            .chain(self.grammars.iter().cloned())
            .collect()
    }

    /// Institution grammars in registration order.
    pub fn institutions(&self) -> impl Iterator<Item = &Arc<Grammar>> {
        self.grammars.iter()
    }

    pub fn fallback(&self) -> &Arc<Grammar> {
        &self.fallback
    }

    /// Number of institution grammars.
    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SignatureSpec;

    fn custom(name: &str, signature: &str) -> GrammarSpec {
        GrammarSpec {
            institution: name.to_string(),
            signatures: vec![SignatureSpec::new(signature, 1.0)],
            ..Default::default()
        }
    }

    #[test]
    fn test_new_has_only_fallback() {
        let registry = PatternRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.all().len(), 1);
        assert!(registry.all()[0].is_fallback());
    }

    #[test]
    fn test_builtin_order() {
        let registry = PatternRegistry::builtin();
        let names: Vec<&str> = registry
            .institutions()
            .map(|g| g.institution.as_str())
            .take(3)
            .collect();
        assert_eq!(names, vec!["Chase", "Bank of America", "Wells Fargo"]);
        assert!(registry.all()[0].is_fallback());
        assert_eq!(registry.all().len(), registry.len() + 1);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = PatternRegistry::builtin();
        assert_eq!(registry.lookup("chase").unwrap().institution, "Chase");
        assert!(registry.lookup("GENERIC").unwrap().is_fallback());
        assert!(registry.lookup("Nonexistent Credit Union").is_none());
    }

    #[test]
    fn test_replacement_keeps_slot() {
        let mut registry = PatternRegistry::builtin();
        let before = registry.len();
        registry
            .register_spec(custom("Chase", r"(?i)\bchase\s+sapphire\b"))
            .unwrap();

        assert_eq!(registry.len(), before);
        let first = registry.institutions().next().unwrap();
        assert_eq!(first.institution, "Chase");
        assert_eq!(first.signatures.len(), 1);
        // inherited from the generic grammar
        assert!(!first.closing_balance.is_empty());
    }

    #[test]
    fn test_register_appends_new_institution() {
        let mut registry = PatternRegistry::new();
        registry
            .register_spec(custom("Acme Credit Union", r"(?i)acme\s+cu"))
            .unwrap();
        registry
            .register_spec(custom("Beta Bank", r"(?i)beta\s+bank"))
            .unwrap();
        let names: Vec<String> = registry
            .institutions()
            .map(|g| g.institution.clone())
            .collect();
        assert_eq!(names, vec!["Acme Credit Union", "Beta Bank"]);
    }

    #[test]
    fn test_register_generic_replaces_fallback() {
        let mut registry = PatternRegistry::builtin();
        let mut spec = builtin::generic_spec();
        spec.closing_balance = vec![r"(?i)saldo\s+(?P<value>\S+)".to_string()];
        registry.register_spec(spec).unwrap();

        assert_eq!(registry.fallback().closing_balance.len(), 1);
        assert_eq!(registry.len(), builtin::institutions().len());
    }

    #[test]
    fn test_invalid_spec_is_rejected() {
        let mut registry = PatternRegistry::new();
        let result = registry.register_spec(custom("Broken", "(unclosed"));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
