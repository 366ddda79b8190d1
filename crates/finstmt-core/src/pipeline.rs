//! Single-document extraction pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::categorize::Categorizer;
use crate::confidence::ConfidenceAggregator;
use crate::detect::{DetectionResult, InstitutionDetector};
use crate::document::DocumentSource;
use crate::error::{ErrorKind, Result};
use crate::extract::{HeaderExtractor, HeaderFields, RejectedCapture};
use crate::grammar::PatternRegistry;
use crate::models::config::EngineConfig;
use crate::models::statement::{AccountInfo, Balance, StatementResult, UNKNOWN_ACCOUNT};
use crate::transactions::{
    BalanceOutlier, ParseContext, ParsedTransactions, RegionKind, TransactionParser, UnmatchedLine,
};

/// Trait for statement extraction, shared across batch workers.
pub trait StatementExtractor: Send + Sync {
    /// Extract a statement from document text.
    fn extract(&self, text: &str) -> Result<StatementResult>;
}

/// A non-fatal problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: ErrorKind,
    pub message: String,
}

/// Everything the pipeline knows about how a result was produced.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub institution: String,
    pub strength: f32,
    pub normalized_strength: f32,
    /// Signature patterns that fired.
    pub signatures: Vec<String>,
    /// Matcher behind each extracted field (`null` when absent).
    pub matchers: BTreeMap<String, Option<String>>,
    pub rejected: Vec<RejectedCapture>,
    pub region: RegionKind,
    pub candidate_lines: usize,
    pub fallback_lines: usize,
    pub unmatched_lines: Vec<UnmatchedLine>,
    pub outliers: Vec<BalanceOutlier>,
    /// Parse confidence of each transaction, in result order.
    pub transaction_confidence: Vec<f32>,
    pub issues: Vec<Issue>,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
}

/// Result of a diagnostic parse.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub statement: StatementResult,
    pub diagnostics: Diagnostics,
}

/// Detect, extract, parse, categorize and score one statement.
pub struct StatementParser {
    detector: InstitutionDetector,
    header: HeaderExtractor,
    transactions: TransactionParser,
    categorizer: Categorizer,
    aggregator: ConfidenceAggregator,
}

impl StatementParser {
    /// Parser over `registry` with default settings.
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self::with_registry(registry, &EngineConfig::default())
    }

    /// Parser over `registry` with explicit settings.
    ///
    /// Grammars and categories listed in `config` are ignored here; use
    /// [`StatementParser::from_config`] to register them.
    pub fn with_registry(registry: Arc<PatternRegistry>, config: &EngineConfig) -> Self {
        Self {
            detector: InstitutionDetector::new(registry)
                .with_min_strength(config.detection.min_strength),
            header: HeaderExtractor::new(&config.extraction),
            transactions: TransactionParser::new(config.transactions.clone()),
            categorizer: Categorizer::new(),
            aggregator: ConfidenceAggregator::new(&config.confidence),
        }
    }

    /// Build the built-in registry plus the configured grammars and categories.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut registry = PatternRegistry::builtin();
        for spec in &config.grammars {
            registry.register_spec(spec.clone())?;
        }

        let categorizer = match &config.categories {
            Some(specs) => Categorizer::from_specs(specs)?,
            None => Categorizer::new(),
        };

        Ok(Self::with_registry(Arc::new(registry), config).with_categorizer(categorizer))
    }

    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        self.detector.registry()
    }

    /// Parse statement text.
    pub fn parse(&self, text: &str) -> Result<StatementResult> {
        self.parse_with_diagnostics(text).map(|r| r.statement)
    }

    /// Parse statement text and report how every field was obtained.
    pub fn parse_with_diagnostics(&self, text: &str) -> Result<ExtractionResult> {
        let start = Instant::now();
        info!("Parsing statement from {} characters of text", text.len());

        let detection = self.detector.detect(text);
        let mut header = self.header.extract(text, &detection)?;

        let ctx = ParseContext::new(header.account_type.value, &header.period(), text)
            .with_opening_balance(header.opening_balance.as_ref().map(|m| m.value));
        let mut parsed = self.transactions.parse(text, &detection.grammar, &ctx);
        let parse_ratio = parsed.parse_ratio();

        header.infer_period(&parsed.transactions);

        let mut transactions = std::mem::take(&mut parsed.transactions);
        self.categorizer.apply(&mut transactions);

        let confidence = self.aggregator.aggregate(&header, parse_ratio);

        let statement = StatementResult {
            account_info: AccountInfo {
                number: header
                    .account_number
                    .as_ref()
                    .map_or_else(|| UNKNOWN_ACCOUNT.to_string(), |m| m.value.clone()),
                name: header.holder_name.as_ref().map(|m| m.value.clone()),
                institution: header.institution.value.clone(),
                account_type: header.account_type.value,
            },
            period: header.period(),
            balance: Balance {
                opening: header.opening_balance.as_ref().map(|m| m.value),
                closing: header.closing_balance.value,
            },
            transactions,
            confidence,
        };

        let diagnostics = diagnostics(&detection, header, parsed, &statement, start);
        info!(
            "Parsed {} statement: {} transactions, overall confidence {:.2}",
            statement.account_info.institution,
            statement.transactions.len(),
            statement.confidence.overall
        );

        Ok(ExtractionResult {
            statement,
            diagnostics,
        })
    }

    /// Read a document from `source` and parse it.
    pub fn parse_document(&self, source: &dyn DocumentSource, id: &str) -> Result<StatementResult> {
        let text = source.read_text(id)?;
        debug!("Read {} characters from {}", text.len(), id);
        self.parse(&text)
    }
}

impl Default for StatementParser {
    fn default() -> Self {
        Self::new(Arc::new(PatternRegistry::builtin()))
    }
}

impl StatementExtractor for StatementParser {
    fn extract(&self, text: &str) -> Result<StatementResult> {
        self.parse(text)
    }
}

fn diagnostics(
    detection: &DetectionResult,
    header: HeaderFields,
    parsed: ParsedTransactions,
    statement: &StatementResult,
    start: Instant,
) -> Diagnostics {
    let mut issues = Vec::new();
    if detection.is_fallback() {
        issues.push(Issue {
            kind: ErrorKind::NoMatchingInstitution,
            message: "No institution signature matched; using the generic grammar".to_string(),
        });
    }
    for line in &parsed.unmatched {
        issues.push(Issue {
            kind: ErrorKind::TransactionLineUnparsed,
            message: format!("Line {} could not be parsed: {}", line.line, line.text),
        });
    }

    let mut warnings = header.warnings.clone();
    for outlier in &parsed.outliers {
        warnings.push(format!(
            "Running balance on line {} does not follow from the previous balance",
            outlier.line
        ));
    }
    warnings.extend(statement.validate());

    Diagnostics {
        institution: detection.institution.clone(),
        strength: detection.strength,
        normalized_strength: detection.normalized,
        signatures: detection.signatures.clone(),
        matchers: header
            .matchers()
            .into_iter()
            .map(|(field, matcher)| (field.to_string(), matcher))
            .collect(),
        rejected: header.rejected,
        region: parsed.region,
        candidate_lines: parsed.candidate_lines,
        fallback_lines: parsed.fallback_lines(),
        unmatched_lines: parsed.unmatched,
        outliers: parsed.outliers,
        transaction_confidence: statement.transactions.iter().map(|t| t.confidence).collect(),
        issues,
        warnings,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    use crate::error::{ExtractionError, FinstmtError};
    use crate::grammar::patterns::AMOUNT_FRAGMENT;
    use crate::grammar::{GrammarSpec, SignatureSpec};
    use crate::models::statement::AccountType;

    const CHASE: &str = "Chase\nClosing Balance ... 1234.56\n01/15/2024 STARBUCKS -4.75\n";

    const CHECKING: &str = "\
Chase                                   chase.com
Account Name: JANE Q DOE
Account Number: XXXX XXXX XXXX 1234
Statement Period: 01/01/2024 to 01/31/2024
CHECKING SUMMARY
Beginning Balance $1,000.00
Ending Balance $3,000.00

TRANSACTION DETAIL
Date Description Amount Balance
01/03 PAYROLL ACME INC 2,000.00 3,000.00
01/05 WHOLE FOODS MARKET -50.25 2,949.75
01/09 NETFLIX.COM -15.49 2,934.26
01/12 PENDING REVIEW
01/20 BRANCH DEPOSIT 65.74 3,000.00
Total for this period 2,000.00
";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_line_statement() {
        let result = StatementParser::default().parse(CHASE).unwrap();

        assert_eq!(result.account_info.institution, "Chase");
        assert_eq!(result.account_info.number, "unknown");
        assert_eq!(result.balance.closing, dec("1234.56"));
        assert_eq!(result.transactions.len(), 1);

        let txn = &result.transactions[0];
        assert_eq!(txn.date, date(2024, 1, 15));
        assert_eq!(txn.description, "STARBUCKS");
        assert_eq!(txn.amount, dec("-4.75"));
        assert_eq!(txn.category.as_deref(), Some("dining"));

        // inferred from the only transaction
        assert_eq!(result.period.start, Some(date(2024, 1, 15)));
        assert_eq!(result.confidence.get("period_start"), 0.30);
        assert_eq!(result.confidence.get("transactions"), 1.0);
    }

    #[test]
    fn test_full_checking_statement() {
        let result = StatementParser::default().parse(CHECKING).unwrap();

        assert_eq!(result.account_info.number, "XXXX XXXX XXXX 1234");
        assert_eq!(result.account_info.name.as_deref(), Some("JANE Q DOE"));
        assert_eq!(result.account_info.account_type, AccountType::Bank);
        assert_eq!(result.period.start, Some(date(2024, 1, 1)));
        assert_eq!(result.period.end, Some(date(2024, 1, 31)));
        assert_eq!(result.balance.opening, Some(dec("1000.00")));

        let categories: Vec<Option<&str>> = result
            .transactions
            .iter()
            .map(|t| t.category.as_deref())
            .collect();
        assert_eq!(
            categories,
            vec![Some("income"), Some("grocery"), Some("entertainment"), Some("income")]
        );
        assert_eq!(result.confidence.get("transactions"), 0.8);
        assert_eq!(result.confidence.get("institution"), 1.0);
    }

    #[test]
    fn test_unknown_institution_scores_lower() {
        let parser = StatementParser::default();
        let matched = parser.parse(CHASE).unwrap();
        let unknown = parser
            .parse("Closing Balance ... 1234.56\n01/15/2024 STARBUCKS -4.75\n")
            .unwrap();

        assert_eq!(unknown.account_info.institution, "unknown");
        assert_eq!(unknown.transactions, matched.transactions);
        assert!(unknown.confidence.overall < matched.confidence.overall);
    }

    #[test]
    fn test_missing_closing_balance_is_fatal() {
        let err = StatementParser::default()
            .parse("Chase\n01/15/2024 STARBUCKS -4.75")
            .unwrap_err();
        assert!(matches!(
            err,
            FinstmtError::Extraction(ExtractionError::MandatoryFieldMissing(ref f)) if f == "closing_balance"
        ));
        assert_eq!(err.kind(), ErrorKind::MandatoryFieldMissing);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let parser = StatementParser::default();
        assert_eq!(parser.parse(CHECKING).unwrap(), parser.parse(CHECKING).unwrap());
    }

    #[test]
    fn test_json_round_trip() {
        let result = StatementParser::default().parse(CHECKING).unwrap();
        let back = StatementResult::from_json(&result.to_json().unwrap()).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_json_round_trip_of_large_balance() {
        let result = StatementParser::default()
            .parse("Chase\nClosing Balance 12345678901234567.89\n")
            .unwrap();
        assert_eq!(result.balance.closing, dec("12345678901234567.89"));

        let back = StatementResult::from_json(&result.to_json().unwrap()).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_oversized_transactions_do_not_abort() {
        let text = "Chase\nOpening Balance 0.00\nClosing Balance 1.00\n\
                    01/15/2024 A 50000000000000000000000000000.00\n\
                    01/16/2024 B 50000000000000000000000000000.00\n";
        let result = StatementParser::default().parse_with_diagnostics(text).unwrap();

        assert!(result.statement.transactions.is_empty());
        assert_eq!(result.diagnostics.unmatched_lines.len(), 2);
        assert_eq!(result.statement.balance.closing, dec("1.00"));
    }

    #[test]
    fn test_diagnostics_do_not_change_result() {
        let parser = StatementParser::default();
        let plain = parser.parse(CHECKING).unwrap();
        let detailed = parser.parse_with_diagnostics(CHECKING).unwrap();
        assert_eq!(detailed.statement, plain);

        let diag = detailed.diagnostics;
        assert_eq!(diag.institution, "Chase");
        assert_eq!(diag.region, RegionKind::Marked);
        assert_eq!(diag.candidate_lines, 5);
        assert_eq!(diag.unmatched_lines.len(), 1);
        assert_eq!(diag.transaction_confidence, vec![0.95; 4]);
        assert_eq!(
            diag.matchers.get("closing_balance").cloned().flatten().as_deref(),
            Some("closing_balance[0]")
        );
        assert!(diag
            .issues
            .iter()
            .all(|i| i.kind == ErrorKind::TransactionLineUnparsed));
    }

    #[test]
    fn test_fallback_issue_is_reported() {
        let diag = StatementParser::default()
            .parse_with_diagnostics("Closing Balance 1.00")
            .unwrap()
            .diagnostics;
        assert_eq!(diag.issues[0].kind, ErrorKind::NoMatchingInstitution);
        assert_eq!(diag.region, RegionKind::Empty);
    }

    #[test]
    fn test_custom_grammar_overrides_builtin() {
        let text = "Chase\nAmount Owed: 42.00\n2024-03-01 COFFEE -3.50\n";
        assert!(StatementParser::default().parse(text).is_err());

        let mut config = EngineConfig::default();
        config.grammars.push(GrammarSpec {
            institution: "Chase".to_string(),
            signatures: vec![SignatureSpec::new(r"\bChase\b", 1.0)],
            closing_balance: vec![format!(r"(?i)amount\s+owed:?\s*(?P<value>{})", AMOUNT_FRAGMENT)],
            ..Default::default()
        });
        let parser = StatementParser::from_config(&config).unwrap();
        assert_eq!(
            parser.registry().len(),
            PatternRegistry::builtin().len(),
            "replacement must not add a grammar"
        );

        let result = parser.parse(text).unwrap();
        assert_eq!(result.account_info.institution, "Chase");
        assert_eq!(result.balance.closing, dec("42.00"));
        assert_eq!(result.transactions[0].amount, dec("-3.50"));
    }

    #[test]
    fn test_custom_categories() {
        let mut config = EngineConfig::default();
        config.categories = Some(vec![crate::categorize::CategoryRuleSpec {
            category: "coffee".to_string(),
            pattern: "starbucks".to_string(),
        }]);
        let result = StatementParser::from_config(&config).unwrap().parse(CHASE).unwrap();
        assert_eq!(result.transactions[0].category.as_deref(), Some("coffee"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.confidence.field_weight = 0.1;
        assert!(matches!(
            StatementParser::from_config(&config),
            Err(FinstmtError::Config(_))
        ));
    }

    #[test]
    fn test_parse_document() {
        let source = crate::document::MemorySource::new().with_document("a", CHASE);
        let parser = StatementParser::default();
        assert_eq!(parser.parse_document(&source, "a").unwrap(), parser.parse(CHASE).unwrap());
        assert_eq!(
            parser.parse_document(&source, "b").unwrap_err().kind(),
            ErrorKind::DocumentUnreadable
        );
    }
}
