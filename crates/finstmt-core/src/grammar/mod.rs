//! Institution grammars.
//!
//! A grammar is plain data: a [`GrammarSpec`] (serializable, user-editable)
//! compiled once into a [`Grammar`] holding ready regexes. Grammars are
//! immutable after compilation and shared through the [`PatternRegistry`].

pub mod builtin;
pub mod patterns;
mod registry;

pub use registry::PatternRegistry;

use regex::{Captures, Match, Regex};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GrammarError;
use crate::extract::FieldKind;
use crate::models::statement::AccountType;
use patterns::{
    AMOUNT_FRAGMENT, ISO_DATE_FRAGMENT, LONG_DATE_FRAGMENT, US_DATE_FRAGMENT,
};

/// Name of the fallback grammar.
pub const GENERIC: &str = "generic";

/// Serializable grammar definition.
///
/// Field matchers are ordered: earlier patterns have higher priority.
/// A matcher yields the named group `value` when present, otherwise the
/// first capture group, otherwise the whole match. Period matchers must
/// define `start` and `end` groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarSpec {
    /// Institution label reported in results.
    pub institution: String,

    /// Detection signatures.
    pub signatures: Vec<SignatureSpec>,

    pub account_number: Vec<String>,
    pub holder_name: Vec<String>,
    pub period: Vec<String>,
    pub opening_balance: Vec<String>,
    pub closing_balance: Vec<String>,

    /// Account type rules, tried in order.
    pub account_types: Vec<TypeRuleSpec>,

    /// Account type used when no rule matches.
    pub default_type: Option<AccountType>,

    /// Transaction line layout.
    pub line: LineTemplateSpec,

    /// Lines that open a transaction section.
    pub region_start: Vec<String>,

    /// Lines that close a transaction section.
    pub region_end: Vec<String>,

    /// Lines ignored inside transaction sections.
    pub skip_lines: Vec<String>,

    /// How printed amounts map to signed amounts.
    pub sign: SignPolicy,
}

/// A weighted detection pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSpec {
    pub pattern: String,
    #[serde(default = "default_signature_weight")]
    pub weight: f32,
}

fn default_signature_weight() -> f32 {
    1.0
}

impl SignatureSpec {
    pub fn new(pattern: impl Into<String>, weight: f32) -> Self {
        Self {
            pattern: pattern.into(),
            weight,
        }
    }
}

/// Pattern that selects an account type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRuleSpec {
    pub account_type: AccountType,
    pub pattern: String,
}

/// One column of a transaction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Transaction date.
    Date,
    /// Optional posting date; matched and discarded.
    PostDate,
    /// Free text.
    Description,
    /// Signed amount.
    Amount,
    /// Optional running balance.
    Balance,
}

/// Date layout used in transaction lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStyle {
    /// `MM/DD`, `MM/DD/YY`, `MM/DD/YYYY` (slashes or dashes).
    Us,
    /// `YYYY-MM-DD`.
    Iso,
    /// `Jan 15`, `January 15, 2024`.
    MonthName,
    /// Any of the above.
    #[default]
    Any,
}

impl DateStyle {
    fn fragment(self) -> String {
        match self {
            DateStyle::Us => US_DATE_FRAGMENT.to_string(),
            DateStyle::Iso => ISO_DATE_FRAGMENT.to_string(),
            DateStyle::MonthName => format!("(?i:{})", LONG_DATE_FRAGMENT),
            DateStyle::Any => format!(
                "(?:{}|{}|(?i:{}))",
                ISO_DATE_FRAGMENT, US_DATE_FRAGMENT, LONG_DATE_FRAGMENT
            ),
        }
    }
}

/// Transaction line layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineTemplateSpec {
    pub slots: Vec<Slot>,
    pub date_style: DateStyle,
}

impl Default for LineTemplateSpec {
    fn default() -> Self {
        Self {
            slots: vec![
                Slot::Date,
                Slot::PostDate,
                Slot::Description,
                Slot::Amount,
                Slot::Balance,
            ],
            date_style: DateStyle::Any,
        }
    }
}

/// How a printed amount maps to the debit-negative convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// The printed sign already means debit-negative.
    #[default]
    AsPrinted,
    /// Charges are printed positive; flip every amount.
    Inverted,
}

impl SignConvention {
    pub fn apply(self, amount: Decimal) -> Decimal {
        match self {
            SignConvention::AsPrinted => amount,
            SignConvention::Inverted => -amount,
        }
    }
}

/// Sign convention per account type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignPolicy {
    pub bank: SignConvention,
    pub credit_card: SignConvention,
    pub investment: SignConvention,
    pub unknown: SignConvention,
}

impl SignPolicy {
    /// Convention for an account type.
    pub fn for_type(&self, account_type: AccountType) -> SignConvention {
        match account_type {
            AccountType::Bank => self.bank,
            AccountType::CreditCard => self.credit_card,
            AccountType::Investment => self.investment,
            AccountType::Unknown => self.unknown,
        }
    }
}

/// A compiled field matcher.
#[derive(Debug, Clone)]
pub struct Matcher {
    /// `field[index]`, used in diagnostics.
    pub name: String,
    regex: Regex,
}

impl Matcher {
    fn compile(owner: &str, name: String, pattern: &str) -> Result<Self, GrammarError> {
        let regex = compile_pattern(owner, &name, pattern)?;
        Ok(Self { name, regex })
    }

    /// First capture of this matcher in `text`.
    pub fn capture<'t>(&self, text: &'t str) -> Option<Match<'t>> {
        let caps = self.regex.captures(text)?;
        caps.name("value")
            .or_else(|| caps.get(1))
            .or_else(|| caps.get(0))
    }

    /// `start`/`end` captures of a period matcher.
    pub fn capture_range<'t>(&self, text: &'t str) -> Option<(Match<'t>, Match<'t>)> {
        let caps = self.regex.captures(text)?;
        Some((caps.name("start")?, caps.name("end")?))
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// A compiled detection signature.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub weight: f32,
    regex: Regex,
}

impl Signature {
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// A compiled account type rule.
#[derive(Debug, Clone)]
pub struct TypeRule {
    pub account_type: AccountType,
    pub matcher: Matcher,
}

/// Raw captures of one transaction line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCaptures<'t> {
    pub date: &'t str,
    pub description: &'t str,
    pub amount: &'t str,
    pub balance: Option<&'t str>,
}

/// A compiled line template.
#[derive(Debug, Clone)]
pub struct LineTemplate {
    pub slots: Vec<Slot>,
    pub date_style: DateStyle,
    regex: Regex,
    /// Same layout without the posting date, for lines whose second
    /// date-shaped token is really part of the description.
    without_post_date: Option<Regex>,
}

impl LineTemplate {
    fn compile(owner: &str, spec: &LineTemplateSpec) -> Result<Self, GrammarError> {
        if !spec.slots.contains(&Slot::Date) || !spec.slots.contains(&Slot::Amount) {
            return Err(GrammarError::IncompleteTemplate(owner.to_string()));
        }

        let date = spec.date_style.fragment();
        let regex = compile_pattern(owner, "line", &line_pattern(&spec.slots, &date))?;
        let without_post_date = if spec.slots.contains(&Slot::PostDate) {
            let slots: Vec<Slot> = spec
                .slots
                .iter()
                .copied()
                .filter(|s| *s != Slot::PostDate)
                .collect();
            Some(compile_pattern(owner, "line", &line_pattern(&slots, &date))?)
        } else {
            None
        };

        Ok(Self {
            slots: spec.slots.clone(),
            date_style: spec.date_style,
            regex,
            without_post_date,
        })
    }

    /// Match a whole line against the template.
    ///
    /// A posting date only counts when `is_date` accepts it; otherwise the
    /// line is matched again as if the template had no posting date.
    pub fn captures<'t>(&self, line: &'t str, is_date: impl Fn(&str) -> bool) -> Option<LineCaptures<'t>> {
        let caps = self.regex.captures(line)?;
        match caps.name("post_date") {
            Some(post) if !is_date(post.as_str()) => {
                let caps = self.without_post_date.as_ref()?.captures(line)?;
                read_line(&caps)
            }
            _ => read_line(&caps),
        }
    }
}

fn line_pattern(slots: &[Slot], date: &str) -> String {
    let mut pattern = String::from(r"^\s*");
    for (i, slot) in slots.iter().enumerate() {
        let sep = if i == 0 { "" } else { r"\s+" };
        let part = match slot {
            Slot::Date => format!("{}(?P<date>{})", sep, date),
            Slot::PostDate => format!("(?:{}(?P<post_date>{}))?", sep, date),
            Slot::Description => format!("{}(?P<description>.+?)", sep),
            Slot::Amount => format!("{}(?P<amount>{})", sep, AMOUNT_FRAGMENT),
            Slot::Balance => format!("(?:{}(?P<balance>{}))?", sep, AMOUNT_FRAGMENT),
        };
        pattern.push_str(&part);
    }
    pattern.push_str(r"\s*$");
    pattern
}

fn read_line<'t>(caps: &Captures<'t>) -> Option<LineCaptures<'t>> {
    Some(LineCaptures {
        date: caps.name("date")?.as_str(),
        description: caps.name("description").map_or("", |m| m.as_str()),
        amount: caps.name("amount")?.as_str(),
        balance: caps.name("balance").map(|m| m.as_str()),
    })
}

/// A compiled, immutable grammar.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub institution: String,
    pub signatures: Vec<Signature>,
    pub account_number: Vec<Matcher>,
    pub holder_name: Vec<Matcher>,
    pub period: Vec<Matcher>,
    pub opening_balance: Vec<Matcher>,
    pub closing_balance: Vec<Matcher>,
    pub type_rules: Vec<TypeRule>,
    pub default_type: Option<AccountType>,
    pub template: LineTemplate,
    pub region_start: Vec<Regex>,
    pub region_end: Vec<Regex>,
    pub skip_lines: Vec<Regex>,
    pub sign: SignPolicy,
}

impl Grammar {
    /// Compile a grammar from its spec.
    pub fn compile(spec: &GrammarSpec) -> Result<Self, GrammarError> {
        let owner = spec.institution.as_str();

        let signatures = spec
            .signatures
            .iter()
            .enumerate()
            .map(|(i, sig)| {
                let name = format!("signature[{}]", i);
                Ok(Signature {
                    regex: compile_pattern(owner, &name, &sig.pattern)?,
                    name: sig.pattern.clone(),
                    weight: sig.weight.max(0.0),
                })
            })
            .collect::<Result<Vec<_>, GrammarError>>()?;

        let period = compile_matchers(owner, FieldKind::Period.as_str(), &spec.period)?;
        for matcher in &period {
            let names: Vec<&str> = matcher.regex.capture_names().flatten().collect();
            if !names.contains(&"start") || !names.contains(&"end") {
                return Err(GrammarError::PeriodGroups {
                    owner: owner.to_string(),
                    name: matcher.name.clone(),
                });
            }
        }

        let type_rules = spec
            .account_types
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let name = format!("{}[{}]", FieldKind::AccountType.as_str(), i);
                Ok(TypeRule {
                    account_type: rule.account_type,
                    matcher: Matcher::compile(owner, name, &rule.pattern)?,
                })
            })
            .collect::<Result<Vec<_>, GrammarError>>()?;

        Ok(Self {
            institution: spec.institution.clone(),
            signatures,
            account_number: compile_matchers(
                owner,
                FieldKind::AccountNumber.as_str(),
                &spec.account_number,
            )?,
            holder_name: compile_matchers(owner, FieldKind::HolderName.as_str(), &spec.holder_name)?,
            period,
            opening_balance: compile_matchers(
                owner,
                FieldKind::OpeningBalance.as_str(),
                &spec.opening_balance,
            )?,
            closing_balance: compile_matchers(
                owner,
                FieldKind::ClosingBalance.as_str(),
                &spec.closing_balance,
            )?,
            type_rules,
            default_type: spec.default_type,
            template: LineTemplate::compile(owner, &spec.line)?,
            region_start: compile_list(owner, "region_start", &spec.region_start)?,
            region_end: compile_list(owner, "region_end", &spec.region_end)?,
            skip_lines: compile_list(owner, "skip_lines", &spec.skip_lines)?,
            sign: spec.sign,
        })
    }

    /// Whether this is the generic fallback.
    pub fn is_fallback(&self) -> bool {
        self.institution.eq_ignore_ascii_case(GENERIC)
    }

    /// Ordered matchers for a single-valued field.
    pub fn matchers(&self, field: FieldKind) -> &[Matcher] {
        match field {
            FieldKind::AccountNumber => &self.account_number,
            FieldKind::HolderName => &self.holder_name,
            FieldKind::Period => &self.period,
            FieldKind::OpeningBalance => &self.opening_balance,
            FieldKind::ClosingBalance => &self.closing_balance,
            FieldKind::Institution | FieldKind::AccountType => &[],
        }
    }

    /// Sum of all signature weights.
    pub fn total_weight(&self) -> f32 {
        self.signatures.iter().map(|s| s.weight).sum()
    }

    pub fn has_region_markers(&self) -> bool {
        !self.region_start.is_empty()
    }

    pub fn is_region_start(&self, line: &str) -> bool {
        self.region_start.iter().any(|re| re.is_match(line))
    }

    pub fn is_region_end(&self, line: &str) -> bool {
        self.region_end.iter().any(|re| re.is_match(line))
    }

    pub fn is_skip_line(&self, line: &str) -> bool {
        patterns::PAGE_MARKER.is_match(line) || self.skip_lines.iter().any(|re| re.is_match(line))
    }
}

impl GrammarSpec {
    /// Fill every empty section from `base`.
    ///
    /// Custom grammars usually only add signatures and a few matchers; the
    /// rest is inherited from the generic grammar.
    pub fn inherit(mut self, base: &GrammarSpec) -> Self {
        fn fill<T: Clone>(target: &mut Vec<T>, base: &[T]) {
            if target.is_empty() {
                *target = base.to_vec();
            }
        }

        fill(&mut self.account_number, &base.account_number);
        fill(&mut self.holder_name, &base.holder_name);
        fill(&mut self.period, &base.period);
        fill(&mut self.opening_balance, &base.opening_balance);
        fill(&mut self.closing_balance, &base.closing_balance);
        fill(&mut self.account_types, &base.account_types);
        fill(&mut self.region_start, &base.region_start);
        fill(&mut self.region_end, &base.region_end);
        fill(&mut self.skip_lines, &base.skip_lines);
        if self.default_type.is_none() {
            self.default_type = base.default_type;
        }
        self
    }

    /// Compile this spec.
    pub fn compile(&self) -> Result<Grammar, GrammarError> {
        Grammar::compile(self)
    }
}

fn compile_pattern(owner: &str, name: &str, pattern: &str) -> Result<Regex, GrammarError> {
    Regex::new(pattern).map_err(|source| GrammarError::InvalidPattern {
        owner: owner.to_string(),
        name: name.to_string(),
        source,
    })
}

fn compile_matchers(
    owner: &str,
    field: &str,
    patterns: &[String],
) -> Result<Vec<Matcher>, GrammarError> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, p)| Matcher::compile(owner, format!("{}[{}]", field, i), p))
        .collect()
}

fn compile_list(owner: &str, what: &str, patterns: &[String]) -> Result<Vec<Regex>, GrammarError> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, p)| compile_pattern(owner, &format!("{}[{}]", what, i), p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn spec() -> GrammarSpec {
        GrammarSpec {
            institution: "Test Bank".to_string(),
            signatures: vec![SignatureSpec::new(r"(?i)test\s+bank", 1.0)],
            closing_balance: vec![r"(?i)closing\s+balance\s+(?P<value>\S+)".to_string()],
            period: vec![r"(?P<start>\S+) to (?P<end>\S+)".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_spec() {
        let grammar = spec().compile().unwrap();
        assert_eq!(grammar.institution, "Test Bank");
        assert_eq!(grammar.closing_balance[0].name, "closing_balance[0]");
        assert!(!grammar.is_fallback());
        assert_eq!(grammar.total_weight(), 1.0);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut bad = spec();
        bad.holder_name = vec!["(unclosed".to_string()];
        let err = bad.compile().unwrap_err();
        assert!(matches!(err, GrammarError::InvalidPattern { ref name, .. } if name == "holder_name[0]"));
    }

    #[test]
    fn test_period_requires_named_groups() {
        let mut bad = spec();
        bad.period = vec![r"(\S+) to (\S+)".to_string()];
        assert!(matches!(bad.compile(), Err(GrammarError::PeriodGroups { .. })));
    }

    #[test]
    fn test_template_requires_date_and_amount() {
        let mut bad = spec();
        bad.line.slots = vec![Slot::Date, Slot::Description];
        assert!(matches!(bad.compile(), Err(GrammarError::IncompleteTemplate(_))));
    }

    #[test]
    fn test_template_captures() {
        let grammar = spec().compile().unwrap();
        let any = |_: &str| true;
        let caps = grammar
            .template
            .captures("01/15/2024 STARBUCKS -4.75", any)
            .unwrap();
        assert_eq!(caps.date, "01/15/2024");
        assert_eq!(caps.description, "STARBUCKS");
        assert_eq!(caps.amount, "-4.75");
        assert_eq!(caps.balance, None);

        let caps = grammar
            .template
            .captures("01/14 01/15 PAYROLL ACME INC 2,100.00 3,334.56", any)
            .unwrap();
        assert_eq!(caps.date, "01/14");
        assert_eq!(caps.description, "PAYROLL ACME INC");
        assert_eq!(caps.amount, "2,100.00");
        assert_eq!(caps.balance, Some("3,334.56"));

        assert!(grammar.template.captures("Closing balance 12.00", any).is_none());
    }

    #[test]
    fn test_rejected_post_date_stays_in_description() {
        let grammar = spec().compile().unwrap();
        let caps = grammar
            .template
            .captures("01/15/2024 24-7 FITNESS -12.00", |raw| raw != "24-7")
            .unwrap();
        assert_eq!(caps.date, "01/15/2024");
        assert_eq!(caps.description, "24-7 FITNESS");
        assert_eq!(caps.amount, "-12.00");
    }

    #[test]
    fn test_matcher_capture_prefers_value_group() {
        let grammar = spec().compile().unwrap();
        let m = grammar.closing_balance[0]
            .capture("Closing Balance 1,234.56")
            .unwrap();
        assert_eq!(m.as_str(), "1,234.56");
    }

    #[test]
    fn test_sign_policy() {
        let policy = SignPolicy {
            credit_card: SignConvention::Inverted,
            ..Default::default()
        };
        let amount = Decimal::from_str("25.00").unwrap();
        assert_eq!(policy.for_type(AccountType::CreditCard).apply(amount), -amount);
        assert_eq!(policy.for_type(AccountType::Bank).apply(amount), amount);
    }

    #[test]
    fn test_inherit_fills_empty_sections() {
        let base = builtin::generic_spec();
        let custom = spec().inherit(&base);
        assert_eq!(custom.institution, "Test Bank");
        assert_eq!(custom.account_number, base.account_number);
        assert_ne!(custom.closing_balance, base.closing_balance);
        assert!(custom.compile().is_ok());
    }
}
