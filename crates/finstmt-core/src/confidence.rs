//! Confidence aggregation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::extract::HeaderFields;
use crate::models::config::ConfidenceConfig;
use crate::models::statement::ConfidenceMap;

/// Key of the transaction parse ratio in the confidence map.
pub const TRANSACTIONS_KEY: &str = "transactions";

/// Combines header field scores and the transaction parse ratio.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceAggregator {
    field_weight: f32,
    transaction_weight: f32,
}

impl ConfidenceAggregator {
    pub fn new(config: &ConfidenceConfig) -> Self {
        let (field_weight, transaction_weight) = config.normalized();
        Self {
            field_weight,
            transaction_weight,
        }
    }

    /// Build the confidence map.
    ///
    /// `overall` is the weighted sum of the mean field score and the parse
    /// ratio. Every score is clamped to [0, 1].
    pub fn aggregate(&self, fields: &HeaderFields, parse_ratio: f32) -> ConfidenceMap {
        let scores = fields.scores();
        let mean = if scores.is_empty() {
            0.0
        } else {
            scores.iter().map(|(_, s)| s.clamp(0.0, 1.0)).sum::<f32>() / scores.len() as f32
        };
        let ratio = parse_ratio.clamp(0.0, 1.0);

        let mut map: BTreeMap<String, f32> = scores
            .into_iter()
            .map(|(name, score)| (name.to_string(), score.clamp(0.0, 1.0)))
            .collect();
        map.insert(TRANSACTIONS_KEY.to_string(), ratio);

        let overall = (self.field_weight * mean + self.transaction_weight * ratio).clamp(0.0, 1.0);
        debug!(
            "Confidence: field mean {:.3}, parse ratio {:.3}, overall {:.3}",
            mean, ratio, overall
        );

        ConfidenceMap {
            fields: map,
            overall,
        }
    }
}

impl Default for ConfidenceAggregator {
    fn default() -> Self {
        Self::new(&ConfidenceConfig::default())
    }
}
