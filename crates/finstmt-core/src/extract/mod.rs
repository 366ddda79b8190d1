//! Header field extraction driven by grammar matchers.

pub mod amounts;
pub mod dates;

pub use amounts::{balances_match, is_plausible_amount, parse_amount};
pub use dates::{first_year, is_plausible_date, parse_date, YearContext};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::detect::DetectionResult;
use crate::error::ExtractionError;
use crate::grammar::patterns::normalize_whitespace;
use crate::grammar::Matcher;
use crate::models::config::ExtractionConfig;
use crate::models::statement::{AccountType, Period, Transaction};
use crate::transactions::date_range;

/// Score of the highest-priority matcher.
const TOP_PRIORITY: f32 = 0.95;

/// Confidence of an account type taken from the grammar default.
const DEFAULT_TYPE_CONFIDENCE: f32 = 0.60;

/// Factor applied to both period dates when they had to be swapped.
const SWAPPED_PERIOD_FACTOR: f32 = 0.6;

/// Confidence of a period inferred from transaction dates.
pub const INFERRED_PERIOD_CONFIDENCE: f32 = 0.30;

/// Logical header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    AccountNumber,
    HolderName,
    Institution,
    AccountType,
    Period,
    OpeningBalance,
    ClosingBalance,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::AccountNumber => "account_number",
            FieldKind::HolderName => "holder_name",
            FieldKind::Institution => "institution",
            FieldKind::AccountType => "account_type",
            FieldKind::Period => "period",
            FieldKind::OpeningBalance => "opening_balance",
            FieldKind::ClosingBalance => "closing_balance",
        }
    }
}

/// Extracted value with confidence and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Byte span in the source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
    /// Matcher that produced the value.
    pub matcher: Option<String>,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
            matcher: None,
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }

    pub fn with_matcher(mut self, matcher: impl Into<String>) -> Self {
        self.matcher = Some(matcher.into());
        self
    }
}

/// A capture that failed to parse as its field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedCapture {
    pub field: String,
    pub matcher: String,
    pub text: String,
}

/// Priority scoring shared by all matchers.
#[derive(Debug, Clone, Copy)]
pub struct Scoring {
    step: f32,
    floor: f32,
    invalid_penalty: f32,
}

impl Scoring {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            step: config.priority_step,
            floor: config.priority_floor,
            invalid_penalty: config.invalid_penalty,
        }
    }

    /// 0.95 for the first matcher, minus `step` per later position, never below `floor`.
    pub fn priority(&self, index: usize) -> f32 {
        (TOP_PRIORITY - self.step * index as f32).max(self.floor)
    }

    /// Priority times the validator factor.
    pub fn score(&self, index: usize, valid: bool) -> f32 {
        let factor = if valid { 1.0 } else { self.invalid_penalty };
        (self.priority(index) * factor).clamp(0.0, 1.0)
    }
}

impl Default for Scoring {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

/// Runs one field's ordered matchers, parsing and validating captures.
pub struct MatcherExtractor<'g, T> {
    field: FieldKind,
    matchers: &'g [Matcher],
    parse: fn(&str) -> Option<T>,
    validate: fn(&T) -> bool,
    scoring: Scoring,
}

impl<'g, T> MatcherExtractor<'g, T> {
    pub fn new(
        field: FieldKind,
        matchers: &'g [Matcher],
        parse: fn(&str) -> Option<T>,
        validate: fn(&T) -> bool,
    ) -> Self {
        Self {
            field,
            matchers,
            parse,
            validate,
            scoring: Scoring::default(),
        }
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    /// First matcher whose capture parses wins; unparseable captures are
    /// recorded in `rejected`.
    pub fn extract_recording(
        &self,
        text: &str,
        rejected: &mut Vec<RejectedCapture>,
    ) -> Option<ExtractionMatch<T>> {
        for (index, matcher) in self.matchers.iter().enumerate() {
            let Some(capture) = matcher.capture(text) else {
                continue;
            };
            let raw = capture.as_str().trim();
            if raw.is_empty() {
                continue;
            }
            match (self.parse)(raw) {
                Some(value) => {
                    let valid = (self.validate)(&value);
                    debug!(
                        "{} matched by {} (valid: {})",
                        self.field.as_str(),
                        matcher.name,
                        valid
                    );
                    return Some(
                        ExtractionMatch::new(value, self.scoring.score(index, valid), raw)
                            .with_position(capture.start(), capture.end())
                            .with_matcher(matcher.name.clone()),
                    );
                }
                None => rejected.push(RejectedCapture {
                    field: self.field.as_str().to_string(),
                    matcher: matcher.name.clone(),
                    text: raw.to_string(),
                }),
            }
        }
        None
    }
}

/// All header fields of one statement.
#[derive(Debug, Clone)]
pub struct HeaderFields {
    pub account_number: Option<ExtractionMatch<String>>,
    pub holder_name: Option<ExtractionMatch<String>>,
    pub institution: ExtractionMatch<String>,
    pub account_type: ExtractionMatch<AccountType>,
    pub period_start: Option<ExtractionMatch<NaiveDate>>,
    pub period_end: Option<ExtractionMatch<NaiveDate>>,
    pub opening_balance: Option<ExtractionMatch<Decimal>>,
    pub closing_balance: ExtractionMatch<Decimal>,
    pub rejected: Vec<RejectedCapture>,
    pub warnings: Vec<String>,
}

impl HeaderFields {
    /// Statement period from the extracted dates.
    pub fn period(&self) -> Period {
        Period {
            start: self.period_start.as_ref().map(|m| m.value),
            end: self.period_end.as_ref().map(|m| m.value),
        }
    }

    /// Fill an absent period from the transaction date range.
    pub fn infer_period(&mut self, transactions: &[Transaction]) {
        if self.period_start.is_some() || self.period_end.is_some() {
            return;
        }
        let Some((min, max)) = date_range(transactions) else {
            return;
        };
        debug!("Inferred period {} - {} from transactions", min, max);
        self.period_start =
            Some(ExtractionMatch::new(min, INFERRED_PERIOD_CONFIDENCE, "transactions"));
        self.period_end =
            Some(ExtractionMatch::new(max, INFERRED_PERIOD_CONFIDENCE, "transactions"));
        self.warnings
            .push("Statement period inferred from transaction dates".to_string());
    }

    /// Per-field confidence, keyed by output name.
    pub fn scores(&self) -> Vec<(&'static str, f32)> {
        fn score<T>(m: &Option<ExtractionMatch<T>>) -> f32 {
            m.as_ref().map_or(0.0, |m| m.confidence)
        }

        vec![
            ("account_number", score(&self.account_number)),
            ("holder_name", score(&self.holder_name)),
            ("institution", self.institution.confidence),
            ("account_type", self.account_type.confidence),
            ("period_start", score(&self.period_start)),
            ("period_end", score(&self.period_end)),
            ("opening_balance", score(&self.opening_balance)),
            ("closing_balance", self.closing_balance.confidence),
        ]
    }

    /// Name of the matcher behind each present field.
    pub fn matchers(&self) -> Vec<(&'static str, Option<String>)> {
        fn name<T>(m: &Option<ExtractionMatch<T>>) -> Option<String> {
            m.as_ref().and_then(|m| m.matcher.clone())
        }

        vec![
            ("account_number", name(&self.account_number)),
            ("holder_name", name(&self.holder_name)),
            ("account_type", self.account_type.matcher.clone()),
            ("period_start", name(&self.period_start)),
            ("period_end", name(&self.period_end)),
            ("opening_balance", name(&self.opening_balance)),
            ("closing_balance", self.closing_balance.matcher.clone()),
        ]
    }
}

/// Extracts header fields with the detected grammar.
#[derive(Debug, Clone, Default)]
pub struct HeaderExtractor {
    scoring: Scoring,
}

impl HeaderExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            scoring: Scoring::from_config(config),
        }
    }

    /// Extract every header field.
    ///
    /// Absent optional fields are `None`; a missing closing balance aborts.
    pub fn extract(
        &self,
        text: &str,
        detection: &DetectionResult,
    ) -> Result<HeaderFields, ExtractionError> {
        let grammar = &detection.grammar;
        let mut rejected = Vec::new();
        let mut warnings = Vec::new();

        let closing_balance = self
            .amount(FieldKind::ClosingBalance, &grammar.closing_balance)
            .extract_recording(text, &mut rejected)
            .ok_or_else(|| {
                ExtractionError::MandatoryFieldMissing(FieldKind::ClosingBalance.as_str().to_string())
            })?;

        let opening_balance = self
            .amount(FieldKind::OpeningBalance, &grammar.opening_balance)
            .extract_recording(text, &mut rejected);

        let account_number = MatcherExtractor::new(
            FieldKind::AccountNumber,
            &grammar.account_number,
            parse_account_number,
            |n: &String| n.chars().filter(|c| c.is_ascii_digit()).count() >= 4,
        )
        .with_scoring(self.scoring)
        .extract_recording(text, &mut rejected);

        let holder_name = MatcherExtractor::new(
            FieldKind::HolderName,
            &grammar.holder_name,
            |s: &str| Some(normalize_whitespace(s)),
            is_plausible_name,
        )
        .with_scoring(self.scoring)
        .extract_recording(text, &mut rejected);

        let (period_start, period_end) =
            self.period(text, &grammar.period, &mut rejected, &mut warnings);

        let institution = ExtractionMatch::new(
            detection.institution.clone(),
            detection.normalized,
            detection.signatures.join(" | "),
        );

        let account_type = self.account_type(text, detection);

        Ok(HeaderFields {
            account_number,
            holder_name,
            institution,
            account_type,
            period_start,
            period_end,
            opening_balance,
            closing_balance,
            rejected,
            warnings,
        })
    }

    fn amount<'g>(&self, field: FieldKind, matchers: &'g [Matcher]) -> MatcherExtractor<'g, Decimal> {
        MatcherExtractor::new(field, matchers, parse_amount, is_plausible_amount)
            .with_scoring(self.scoring)
    }

    fn period(
        &self,
        text: &str,
        matchers: &[Matcher],
        rejected: &mut Vec<RejectedCapture>,
        warnings: &mut Vec<String>,
    ) -> (Option<ExtractionMatch<NaiveDate>>, Option<ExtractionMatch<NaiveDate>>) {
        let years = YearContext::none();

        for (index, matcher) in matchers.iter().enumerate() {
            let Some((start, end)) = matcher.capture_range(text) else {
                continue;
            };
            let (Some(start_date), Some(end_date)) = (
                parse_date(start.as_str(), &years),
                parse_date(end.as_str(), &years),
            ) else {
                rejected.push(RejectedCapture {
                    field: FieldKind::Period.as_str().to_string(),
                    matcher: matcher.name.clone(),
                    text: format!("{} / {}", start.as_str(), end.as_str()),
                });
                continue;
            };

            let mut start_conf = self.scoring.score(index, is_plausible_date(&start_date));
            let mut end_conf = self.scoring.score(index, is_plausible_date(&end_date));
            let (period, swapped) = Period::ordered(start_date, end_date);
            let (mut first, mut second) = (start, end);
            if swapped {
                start_conf *= SWAPPED_PERIOD_FACTOR;
                end_conf *= SWAPPED_PERIOD_FACTOR;
                std::mem::swap(&mut first, &mut second);
                warnings.push("Statement period dates were reversed".to_string());
            }
            debug!("period matched by {} (swapped: {})", matcher.name, swapped);

            let (Some(s), Some(e)) = (period.start, period.end) else {
                continue;
            };
            return (
                Some(
                    ExtractionMatch::new(s, start_conf, first.as_str())
                        .with_position(first.start(), first.end())
                        .with_matcher(matcher.name.clone()),
                ),
                Some(
                    ExtractionMatch::new(e, end_conf, second.as_str())
                        .with_position(second.start(), second.end())
                        .with_matcher(matcher.name.clone()),
                ),
            );
        }

        (None, None)
    }

    fn account_type(&self, text: &str, detection: &DetectionResult) -> ExtractionMatch<AccountType> {
        let grammar = &detection.grammar;

        for (index, rule) in grammar.type_rules.iter().enumerate() {
            if rule.matcher.is_match(text) {
                let source = rule
                    .matcher
                    .capture(text)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                return ExtractionMatch::new(rule.account_type, self.scoring.score(index, true), source)
                    .with_matcher(rule.matcher.name.clone());
            }
        }

        match grammar.default_type {
            Some(default) => ExtractionMatch::new(default, DEFAULT_TYPE_CONFIDENCE, "grammar default"),
            None => ExtractionMatch::new(AccountType::Unknown, 0.0, ""),
        }
    }
}

fn parse_account_number(raw: &str) -> Option<String> {
    let number = normalize_whitespace(raw);
    if number.is_empty() { None } else { Some(number) }
}

fn is_plausible_name(name: &String) -> bool {
    let len = name.chars().count();
    (2..=60).contains(&len)
        && name.chars().any(|c| c.is_alphabetic())
        && name
            .chars()
            .all(|c| c.is_alphabetic() || c.is_whitespace() || matches!(c, '.' | ',' | '\'' | '-'))
}
