//! Normalized statement data model.
//!
//! The serialized form is the stable JSON schema consumed by downstream
//! applications: ISO dates, numbers for amounts, `null` for absent values.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account number rendered when no matcher finds one.
pub const UNKNOWN_ACCOUNT: &str = "unknown";

/// Institution label used when the fallback grammar is selected.
pub const UNKNOWN_INSTITUTION: &str = "unknown";

/// A complete parsed statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    /// Account identity.
    pub account_info: AccountInfo,

    /// Statement period.
    pub period: Period,

    /// Opening and closing balances.
    pub balance: Balance,

    /// Transactions in document order.
    pub transactions: Vec<Transaction>,

    /// Per-field confidence scores plus the overall aggregate.
    pub confidence: ConfidenceMap,
}

/// Account identity extracted from the statement header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account number as printed (often masked).
    pub number: String,

    /// Account holder name.
    pub name: Option<String>,

    /// Detected institution, or `unknown`.
    pub institution: String,

    /// Kind of account the statement covers.
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

/// Kind of account a statement covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Checking or savings account.
    Bank,
    /// Credit card account.
    CreditCard,
    /// Brokerage or retirement account.
    Investment,
    /// Could not be determined.
    #[default]
    Unknown,
}

impl AccountType {
    /// Parse an account type name (`bank`, `credit_card`, ...).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "bank" | "checking" | "savings" => Some(AccountType::Bank),
            "credit_card" | "card" | "credit" => Some(AccountType::CreditCard),
            "investment" | "brokerage" => Some(AccountType::Investment),
            "unknown" => Some(AccountType::Unknown),
            _ => None,
        }
    }

    /// Schema name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Bank => "bank",
            AccountType::CreditCard => "credit_card",
            AccountType::Investment => "investment",
            AccountType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement period. When both dates are present, `start <= end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Period {
    /// Build a period, swapping the dates if they are reversed.
    ///
    /// Returns the period and whether a swap happened.
    pub fn ordered(start: NaiveDate, end: NaiveDate) -> (Self, bool) {
        if start > end {
            (
                Self {
                    start: Some(end),
                    end: Some(start),
                },
                true,
            )
        } else {
            (
                Self {
                    start: Some(start),
                    end: Some(end),
                },
                false,
            )
        }
    }

    /// Check if the period has any data.
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether `date` falls inside the period (inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= date && date <= end,
            _ => false,
        }
    }
}

/// Statement balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Balance at the start of the period.
    #[serde(with = "rust_decimal::serde::arbitrary_precision_option")]
    pub opening: Option<Decimal>,

    /// Balance at the end of the period.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub closing: Decimal,
}

/// A single statement transaction.
///
/// Amounts follow one convention for every grammar: debits are negative,
/// credits are positive. Equality ignores the parse confidence, which is
/// not part of the serialized record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction (or posting) date.
    pub date: NaiveDate,

    /// Free-text description, whitespace-normalized.
    pub description: String,

    /// Signed amount.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,

    /// Running balance printed next to the transaction.
    #[serde(with = "rust_decimal::serde::arbitrary_precision_option")]
    pub balance: Option<Decimal>,

    /// Category assigned by the categorizer.
    pub category: Option<String>,

    /// Parse confidence for this record (diagnostic only).
    #[serde(skip, default = "default_parse_confidence")]
    pub confidence: f32,
}

fn default_parse_confidence() -> f32 {
    1.0
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date
            && self.description == other.description
            && self.amount == other.amount
            && self.balance == other.balance
            && self.category == other.category
    }
}

impl Transaction {
    /// Create an uncategorized transaction without a running balance.
    pub fn new(date: NaiveDate, description: impl Into<String>, amount: Decimal) -> Self {
        Self {
            date,
            description: description.into(),
            amount,
            balance: None,
            category: None,
            confidence: default_parse_confidence(),
        }
    }

    /// Set the running balance.
    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = Some(balance);
        self
    }

    /// Set the parse confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Key of the aggregate score in the serialized map.
pub const OVERALL_KEY: &str = "overall";

/// Confidence scores keyed by logical field name, plus `overall`.
///
/// Serialized as one flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f32>", into = "BTreeMap<String, f32>")]
pub struct ConfidenceMap {
    /// Per-field scores in [0, 1].
    pub fields: BTreeMap<String, f32>,

    /// Weighted aggregate score in [0, 1].
    pub overall: f32,
}

impl ConfidenceMap {
    /// Score for one field, 0 if absent.
    pub fn get(&self, field: &str) -> f32 {
        self.fields.get(field).copied().unwrap_or(0.0)
    }
}

impl From<BTreeMap<String, f32>> for ConfidenceMap {
    fn from(mut fields: BTreeMap<String, f32>) -> Self {
        let overall = fields.remove(OVERALL_KEY).unwrap_or(0.0);
        Self { fields, overall }
    }
}

impl From<ConfidenceMap> for BTreeMap<String, f32> {
    fn from(map: ConfidenceMap) -> Self {
        let mut fields = map.fields;
        fields.insert(OVERALL_KEY.to_string(), map.overall);
        fields
    }
}

impl StatementResult {
    /// Serialize to the JSON schema.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a result back from its JSON form.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Sum of all transaction amounts, `None` if it overflows.
    pub fn net_change(&self) -> Option<Decimal> {
        self.transactions
            .iter()
            .try_fold(Decimal::ZERO, |sum, t| sum.checked_add(t.amount))
    }

    /// Validate the statement and return any issues found.
    ///
    /// Issues are informational; a result with issues is still usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.account_info.number == UNKNOWN_ACCOUNT {
            issues.push("Missing account number".to_string());
        }

        if self.account_info.institution == UNKNOWN_INSTITUTION {
            issues.push("Institution not recognized".to_string());
        }

        if self.period.is_empty() {
            issues.push("Missing statement period".to_string());
        }

        if self.transactions.is_empty() {
            issues.push("No transactions".to_string());
        }

        if self.period.start.is_some() && self.period.end.is_some() {
            let outside = self
                .transactions
                .iter()
                .filter(|t| !self.period.contains(t.date))
                .count();
            if outside > 0 {
                issues.push(format!(
                    "{} transaction(s) dated outside the statement period",
                    outside
                ));
            }
        }

        if let Some(opening) = self.balance.opening {
            match self.net_change() {
                Some(net) => {
                    let tolerance = Decimal::new(1, 2);
                    let reconciles = |expected: Option<Decimal>| {
                        expected
                            .and_then(|e| e.checked_sub(self.balance.closing))
                            .is_some_and(|diff| diff.abs() <= tolerance)
                    };
                    if !reconciles(opening.checked_add(net)) && !reconciles(opening.checked_sub(net)) {
                        issues.push(format!(
                            "Opening balance ({}) plus transactions ({}) differs from closing balance ({})",
                            opening, net, self.balance.closing
                        ));
                    }
                }
                None => issues.push("Transaction amounts are too large to total".to_string()),
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sample() -> StatementResult {
        let mut confidence = ConfidenceMap::default();
        confidence.fields.insert("closing_balance".to_string(), 0.75);
        confidence.fields.insert("holder_name".to_string(), 0.0);
        confidence.overall = 0.5;

        StatementResult {
            account_info: AccountInfo {
                number: "XXXX-1234".to_string(),
                name: None,
                institution: "Chase".to_string(),
                account_type: AccountType::Bank,
            },
            period: Period {
                start: Some(date(2024, 1, 1)),
                end: Some(date(2024, 1, 31)),
            },
            balance: Balance {
                opening: Some(dec("1239.31")),
                closing: dec("1234.56"),
            },
            transactions: vec![
                Transaction::new(date(2024, 1, 15), "STARBUCKS", dec("-4.75"))
                    .with_balance(dec("1234.56")),
            ],
            confidence,
        }
    }

    #[test]
    fn test_json_round_trip() {
        let result = sample();
        let json = result.to_json().unwrap();
        let back = StatementResult::from_json(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_json_round_trip_keeps_every_digit() {
        let mut result = sample();
        result.balance.closing = dec("12345678901234567.89");
        result.transactions[0].amount = dec("-0.0000000000000000000000000001");

        let json = result.to_json().unwrap();
        assert!(json.contains("12345678901234567.89"), "{}", json);

        let back = StatementResult::from_json(&json).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.balance.closing.to_string(), "12345678901234567.89");
    }

    #[test]
    fn test_json_schema_shape() {
        let value = serde_json::to_value(sample()).unwrap();

        assert_eq!(value["account_info"]["type"], "bank");
        assert!(value["account_info"]["name"].is_null());
        assert_eq!(value["period"]["start"], "2024-01-01");
        assert_eq!(value["balance"]["closing"], 1234.56);
        assert_eq!(value["transactions"][0]["amount"], -4.75);
        assert!(value["transactions"][0]["category"].is_null());
        assert!(value["transactions"][0].get("confidence").is_none());
        assert_eq!(value["confidence"]["closing_balance"], 0.75);
        assert_eq!(value["confidence"]["overall"], 0.5);
    }

    #[test]
    fn test_period_ordered_swaps() {
        let (period, swapped) = Period::ordered(date(2024, 2, 1), date(2024, 1, 1));
        assert!(swapped);
        assert_eq!(period.start, Some(date(2024, 1, 1)));
        assert_eq!(period.end, Some(date(2024, 2, 1)));
    }

    #[test]
    fn test_account_type_names() {
        assert_eq!(AccountType::from_name("credit card"), Some(AccountType::CreditCard));
        assert_eq!(AccountType::from_name("Checking"), Some(AccountType::Bank));
        assert_eq!(AccountType::from_name("nonsense"), None);
        assert_eq!(AccountType::Investment.to_string(), "investment");
    }

    #[test]
    fn test_validate_balances_reconcile() {
        let result = sample();
        assert!(result.validate().is_empty(), "{:?}", result.validate());

        let mut broken = sample();
        broken.balance.closing = dec("10.00");
        assert_eq!(broken.validate().len(), 1);
    }

    #[test]
    fn test_validate_reports_overflowing_totals() {
        let mut huge = sample();
        huge.transactions = vec![
            Transaction::new(date(2024, 1, 15), "A", Decimal::MAX),
            Transaction::new(date(2024, 1, 16), "B", Decimal::MAX),
        ];
        assert_eq!(huge.net_change(), None);
        assert_eq!(huge.validate(), vec!["Transaction amounts are too large to total".to_string()]);

        huge.transactions.truncate(1);
        huge.balance.opening = Some(Decimal::MIN);
        assert_eq!(huge.validate().len(), 1);
    }

    #[test]
    fn test_period_contains() {
        let period = sample().period;
        assert!(period.contains(date(2024, 1, 31)));
        assert!(!period.contains(date(2024, 2, 1)));
        assert!(!Period::default().contains(date(2024, 1, 1)));
    }
}
