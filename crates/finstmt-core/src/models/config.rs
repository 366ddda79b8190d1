//! Configuration structures for the extraction engine.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::categorize::CategoryRuleSpec;
use crate::error::{FinstmtError, Result};
use crate::grammar::GrammarSpec;

/// Main configuration for the statement engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Institution detection.
    pub detection: DetectionConfig,

    /// Header field extraction.
    pub extraction: ExtractionConfig,

    /// Transaction line parsing.
    pub transactions: TransactionConfig,

    /// Confidence aggregation weights.
    pub confidence: ConfidenceConfig,

    /// Batch processing.
    pub batch: BatchConfig,

    /// Extra grammars registered after the built-ins.
    pub grammars: Vec<GrammarSpec>,

    /// Replacement category rules. `None` keeps the defaults.
    pub categories: Option<Vec<CategoryRuleSpec>>,
}

/// Institution detection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Strength a grammar must exceed to be selected over the fallback.
    pub min_strength: f32,
}

/// Header field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Confidence lost per later matcher position.
    pub priority_step: f32,

    /// Lowest priority score a matcher can get.
    pub priority_floor: f32,

    /// Factor applied when a value fails its validator.
    pub invalid_penalty: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            priority_step: 0.10,
            priority_floor: 0.50,
            invalid_penalty: 0.5,
        }
    }
}

/// Transaction parsing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Confidence of a line matched by the grammar's line template.
    pub template_confidence: f32,

    /// Confidence of a line recovered by the whitespace tokenizer.
    pub fallback_confidence: f32,

    /// Factor applied to a transaction whose running balance does not reconcile.
    pub outlier_penalty: f32,

    /// Allowed difference when reconciling running balances.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub balance_tolerance: Decimal,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            template_confidence: 0.95,
            fallback_confidence: 0.60,
            outlier_penalty: 0.7,
            balance_tolerance: Decimal::new(1, 2),
        }
    }
}

/// Weights of the overall confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Weight of the mean header field score.
    pub field_weight: f32,

    /// Weight of the transaction parse ratio.
    pub transaction_weight: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            field_weight: 0.7,
            transaction_weight: 0.3,
        }
    }
}

impl ConfidenceConfig {
    /// Weights scaled to sum to 1.
    pub fn normalized(&self) -> (f32, f32) {
        let total = self.field_weight + self.transaction_weight;
        if total <= 0.0 {
            return (0.7, 0.3);
        }
        (self.field_weight / total, self.transaction_weight / total)
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Process documents concurrently.
    pub parallel: bool,

    /// Maximum documents in flight.
    pub max_workers: usize,

    /// Total time budget for a batch, in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> std::result::Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(FinstmtError::Config(format!("{} must be within [0, 1], got {}", name, v)))
            }
        };

        unit("extraction.priority_step", self.extraction.priority_step)?;
        unit("extraction.priority_floor", self.extraction.priority_floor)?;
        unit("extraction.invalid_penalty", self.extraction.invalid_penalty)?;
        unit("transactions.template_confidence", self.transactions.template_confidence)?;
        unit("transactions.fallback_confidence", self.transactions.fallback_confidence)?;
        unit("transactions.outlier_penalty", self.transactions.outlier_penalty)?;

        if self.confidence.field_weight < 0.0 || self.confidence.transaction_weight < 0.0 {
            return Err(FinstmtError::Config(
                "confidence weights must not be negative".to_string(),
            ));
        }
        if self.confidence.field_weight <= self.confidence.transaction_weight {
            return Err(FinstmtError::Config(
                "confidence.field_weight must exceed confidence.transaction_weight".to_string(),
            ));
        }
        if self.batch.max_workers == 0 {
            return Err(FinstmtError::Config(
                "batch.max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transactions.balance_tolerance, Decimal::new(1, 2));
        assert!(config.categories.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"batch": {"max_workers": 2}, "detection": {"min_strength": 0.5}}"#)
                .unwrap();
        assert_eq!(config.batch.max_workers, 2);
        assert!(config.batch.parallel);
        assert_eq!(config.detection.min_strength, 0.5);
        assert_eq!(config.confidence.field_weight, 0.7);
    }

    #[test]
    fn test_weight_order_is_enforced() {
        let mut config = EngineConfig::default();
        config.confidence.field_weight = 0.3;
        config.confidence.transaction_weight = 0.7;
        assert!(matches!(config.validate(), Err(FinstmtError::Config(_))));
    }

    #[test]
    fn test_normalized_weights() {
        let weights = ConfidenceConfig {
            field_weight: 3.0,
            transaction_weight: 1.0,
        };
        assert_eq!(weights.normalized(), (0.75, 0.25));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = EngineConfig::default();
        config.batch.timeout_secs = Some(30);
        config.save(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.batch.timeout_secs, Some(30));
        assert_eq!(loaded.extraction.priority_floor, 0.5);
    }
}
