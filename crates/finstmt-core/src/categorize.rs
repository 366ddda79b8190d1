//! Rule-based transaction categorization.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::GrammarError;
use crate::models::statement::Transaction;

/// Default rules, narrowest first. Patterns are matched case-insensitively.
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("payment", r"\b(?:payment\s+(?:-\s+)?thank\s+you|autopay|auto\s+pay|online\s+payment|e-?payment|bill\s+pay)\b"),
    ("income", r"\b(?:direct\s+dep(?:osit)?|payroll|salary|income|revenue|dividends?|interest\s+(?:paid|earned))\b"),
    ("transfer", r"\b(?:transfer|xfer|zelle|venmo|paypal|cash\s+app|wire|ach)\b"),
    ("withdrawal", r"\b(?:withdrawal|atm|cash\s+withdrawal)\b"),
    ("grocery", r"\b(?:grocery|groceries|supermarket|whole\s+foods|trader\s+joe'?s?|safeway|kroger|albertsons|wegmans|publix|aldi|market)\b"),
    ("dining", r"\b(?:restaurant|dining|cafe|coffee|starbucks|mcdonald'?s|chipotle|pizza|burger|taco|sushi|doordash|grubhub)\b"),
    ("transportation", r"\b(?:uber|lyft|taxi|cab|transit|metro|subway|train|bus|airlines?|flight|gas|fuel|chevron|shell|exxon|parking)\b"),
    ("utilities", r"\b(?:utility|utilities|electric|water|power|energy|cable|internet|phone|mobile|wireless|verizon|at&t|t-mobile|comcast)\b"),
    ("entertainment", r"\b(?:netflix|hulu|spotify|movies?|theat(?:er|re)|cinema|concert|tickets?|entertainment)\b"),
    ("subscription", r"\b(?:subscription|recurring|membership|prime|annual\s+fee|monthly\s+fee)\b"),
    ("health", r"\b(?:medical|doctor|pharmacy|drug|health|healthcare|hospital|clinic|dental|vision|insurance|cvs|walgreens)\b"),
    ("personal", r"\b(?:salon|spa|beauty|barber|hair|nails?|gym|fitness)\b"),
    ("home", r"\b(?:home\s+depot|lowe'?s|apartment|rent|lease|mortgage|furniture|decor|repair|maintenance)\b"),
    ("shopping", r"\b(?:amazon|amzn|ebay|walmart|target|costco|shop|store|retail|outlet|mall|clothing|apparel)\b"),
    ("income", r"\b(?:deposit|credit)\b"),
];

lazy_static! {
    static ref DEFAULT_CATEGORIZER: Categorizer = Categorizer::from_specs(&default_rule_specs())
        .expect("default category rules must compile");
}

/// Serializable category rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRuleSpec {
    pub category: String,
    pub pattern: String,
}

/// A compiled category rule.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: String,
    regex: Regex,
}

impl CategoryRule {
    pub fn is_match(&self, description: &str) -> bool {
        self.regex.is_match(description)
    }
}

/// Assigns a category to a description; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<CategoryRule>,
}

impl Categorizer {
    /// Categorizer with the default rules.
    pub fn new() -> Self {
        DEFAULT_CATEGORIZER.clone()
    }

    /// Compile rules in order.
    pub fn from_specs(specs: &[CategoryRuleSpec]) -> Result<Self, GrammarError> {
        let rules = specs
            .iter()
            .map(|spec| {
                RegexBuilder::new(&spec.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| CategoryRule {
                        category: spec.category.clone(),
                        regex,
                    })
                    .map_err(|source| GrammarError::InvalidPattern {
                        owner: "categories".to_string(),
                        name: spec.category.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Category of a description, if any rule matches.
    pub fn categorize(&self, description: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.is_match(description))
            .map(|rule| rule.category.as_str())
    }

    /// Set the category of every transaction.
    pub fn apply(&self, transactions: &mut [Transaction]) {
        for txn in transactions.iter_mut() {
            txn.category = self.categorize(&txn.description).map(str::to_string);
        }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new()
    }
}

/// The default rules as specs, e.g. to seed a configuration file.
pub fn default_rule_specs() -> Vec<CategoryRuleSpec> {
    DEFAULT_RULES
        .iter()
        .map(|(category, pattern)| CategoryRuleSpec {
            category: category.to_string(),
            pattern: pattern.to_string(),
        })
        .collect()
}
