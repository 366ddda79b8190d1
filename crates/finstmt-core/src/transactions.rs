//! Transaction line parsing.
//!
//! Lines are taken from the grammar's marked transaction sections, or from
//! the span between the first and last transaction-shaped lines when no
//! section is marked. Each candidate line is matched against the line
//! template first and the whitespace tokenizer second.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, trace};

use crate::extract::{balances_match, is_plausible_amount, parse_amount, parse_date, YearContext};
use crate::grammar::patterns::{
    has_date_or_amount, is_transaction_shaped, normalize_whitespace, AMOUNT_TOKEN,
};
use crate::grammar::Grammar;
use crate::models::config::TransactionConfig;
use crate::models::statement::{AccountType, Period, Transaction};

/// Statement-level context for line parsing.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    /// Detected account type; selects the sign convention.
    pub account_type: AccountType,

    /// Seeds the running balance check.
    pub opening_balance: Option<Decimal>,

    /// Years for dates printed without one.
    pub years: YearContext,
}

impl ParseContext {
    pub fn new(account_type: AccountType, period: &Period, text: &str) -> Self {
        Self {
            account_type,
            opening_balance: None,
            years: YearContext::from_statement(period, text),
        }
    }

    pub fn with_opening_balance(mut self, opening: Option<Decimal>) -> Self {
        self.opening_balance = opening;
        self
    }
}

/// How the transaction region was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Sections delimited by the grammar's start/end markers.
    Marked,
    /// First to last transaction-shaped line.
    Heuristic,
    /// No transaction-shaped line anywhere.
    Empty,
}

/// How a line was turned into a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSource {
    Template,
    Fallback,
}

/// A candidate line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedLine {
    /// 1-based line number in the document text.
    pub line: usize,
    pub text: String,
}

/// A transaction whose printed balance does not reconcile with the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceOutlier {
    /// Index into the transaction list.
    pub index: usize,
    /// 1-based line number in the document text.
    pub line: usize,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub previous: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub balance: Decimal,
}

/// Output of [`TransactionParser::parse`].
#[derive(Debug, Clone)]
pub struct ParsedTransactions {
    /// Transactions in document order.
    pub transactions: Vec<Transaction>,
    /// 1-based source line of each transaction.
    pub source_lines: Vec<usize>,
    /// How each transaction was parsed.
    pub sources: Vec<LineSource>,
    /// Lines holding a date-like or amount-like token.
    pub candidate_lines: usize,
    pub unmatched: Vec<UnmatchedLine>,
    pub outliers: Vec<BalanceOutlier>,
    pub region: RegionKind,
}

impl ParsedTransactions {
    fn empty(region: RegionKind) -> Self {
        Self {
            transactions: Vec::new(),
            source_lines: Vec::new(),
            sources: Vec::new(),
            candidate_lines: 0,
            unmatched: Vec::new(),
            outliers: Vec::new(),
            region,
        }
    }

    /// Parsed lines over candidate lines; 0 without candidates.
    pub fn parse_ratio(&self) -> f32 {
        if self.candidate_lines == 0 {
            0.0
        } else {
            (self.transactions.len() as f32 / self.candidate_lines as f32).clamp(0.0, 1.0)
        }
    }

    /// Number of lines recovered by the whitespace tokenizer.
    pub fn fallback_lines(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| **s == LineSource::Fallback)
            .count()
    }
}

/// Raw pieces of a transaction line before typing.
struct RawLine<'t> {
    date: &'t str,
    description: String,
    amount: &'t str,
    balance: Option<&'t str>,
}

/// Parses transaction lines with a grammar.
#[derive(Debug, Clone, Default)]
pub struct TransactionParser {
    config: TransactionConfig,
}

impl TransactionParser {
    pub fn new(config: TransactionConfig) -> Self {
        Self { config }
    }

    /// Parse all transactions in `text`.
    pub fn parse(&self, text: &str, grammar: &Grammar, ctx: &ParseContext) -> ParsedTransactions {
        let lines: Vec<&str> = text.lines().collect();
        let (region, selected) = select_region(&lines, grammar);
        debug!("Transaction region: {:?}, {} lines", region, selected.len());

        let mut parsed = ParsedTransactions::empty(region);
        let mut continuation_open = false;

        for (index, raw) in selected {
            let line = raw.trim();
            if line.is_empty() {
                continuation_open = false;
                continue;
            }
            if grammar.is_skip_line(line) || grammar.is_region_start(line) || grammar.is_region_end(line) {
                trace!("Skipping line {}: {}", index + 1, line);
                continue;
            }

            if !has_date_or_amount(line) {
                if continuation_open {
                    if let Some(last) = parsed.transactions.last_mut() {
                        trace!("Continuation line {}: {}", index + 1, line);
                        last.description = normalize_whitespace(&format!("{} {}", last.description, line));
                    }
                }
                continue;
            }

            parsed.candidate_lines += 1;
            match self.parse_line(line, grammar, ctx) {
                Some((txn, source)) => {
                    trace!("Line {} parsed via {:?}: {:?}", index + 1, source, txn);
                    parsed.transactions.push(txn);
                    parsed.source_lines.push(index + 1);
                    parsed.sources.push(source);
                    continuation_open = true;
                }
                None => {
                    trace!("Line {} unparsed: {}", index + 1, line);
                    parsed.unmatched.push(UnmatchedLine {
                        line: index + 1,
                        text: line.to_string(),
                    });
                    continuation_open = false;
                }
            }
        }

        self.check_balances(&mut parsed, ctx.opening_balance);

        debug!(
            "Parsed {} of {} candidate lines ({} via fallback, {} outliers)",
            parsed.transactions.len(),
            parsed.candidate_lines,
            parsed.fallback_lines(),
            parsed.outliers.len()
        );
        parsed
    }

    /// Parse a single line: template first, whitespace tokenizer second.
    pub fn parse_line(
        &self,
        line: &str,
        grammar: &Grammar,
        ctx: &ParseContext,
    ) -> Option<(Transaction, LineSource)> {
        let is_date = |raw: &str| parse_date(raw, &ctx.years).is_some();
        if let Some(caps) = grammar.template.captures(line, is_date) {
            let raw = RawLine {
                date: caps.date,
                description: caps.description.to_string(),
                amount: caps.amount,
                balance: caps.balance,
            };
            if let Some(txn) = self.build(&raw, grammar, ctx) {
                return Some((
                    txn.with_confidence(self.config.template_confidence),
                    LineSource::Template,
                ));
            }
        }

        let raw = tokenize(line, &ctx.years)?;
        self.build(&raw, grammar, ctx).map(|txn| {
            (
                txn.with_confidence(self.config.fallback_confidence),
                LineSource::Fallback,
            )
        })
    }

    fn build(&self, raw: &RawLine<'_>, grammar: &Grammar, ctx: &ParseContext) -> Option<Transaction> {
        let date = parse_date(raw.date, &ctx.years)?;
        let printed = parse_amount(raw.amount)?;
        if !is_plausible_amount(&printed) {
            trace!("Implausible amount {}", raw.amount);
            return None;
        }
        let amount = grammar.sign.for_type(ctx.account_type).apply(printed);
        let description = normalize_whitespace(&raw.description);

        let mut txn = Transaction::new(date, description, amount);
        if let Some(balance) = raw
            .balance
            .and_then(parse_amount)
            .filter(is_plausible_amount)
        {
            txn = txn.with_balance(balance);
        }
        Some(txn)
    }

    /// Flag transactions whose printed balance is neither `prev + amount`
    /// nor `prev - amount`. Amounts of rows without a balance accumulate.
    fn check_balances(&self, parsed: &mut ParsedTransactions, opening: Option<Decimal>) {
        let tolerance = self.config.balance_tolerance;
        let mut previous = opening;
        // None once the accumulated amounts overflow
        let mut pending = Some(Decimal::ZERO);

        for (index, txn) in parsed.transactions.iter_mut().enumerate() {
            let Some(balance) = txn.balance else {
                pending = pending.and_then(|p| p.checked_add(txn.amount));
                continue;
            };

            let delta = pending.and_then(|p| p.checked_add(txn.amount));
            if let (Some(prev), Some(delta)) = (previous, delta) {
                let credit = prev.checked_add(delta);
                let debit = prev.checked_sub(delta);
                let agrees = |value: Option<Decimal>| {
                    value.is_some_and(|v| balances_match(v, balance, tolerance))
                };
                if (credit.is_some() || debit.is_some()) && !agrees(credit) && !agrees(debit) {
                    let line = parsed.source_lines.get(index).copied().unwrap_or_default();
                    debug!(
                        "Balance outlier at line {}: {} then {} gives {}",
                        line, prev, txn.amount, balance
                    );
                    txn.confidence *= self.config.outlier_penalty;
                    parsed.outliers.push(BalanceOutlier {
                        index,
                        line,
                        previous: prev,
                        amount: txn.amount,
                        balance,
                    });
                }
            }

            previous = Some(balance);
            pending = Some(Decimal::ZERO);
        }
    }
}

/// Pick the lines to parse, with their 0-based line indices.
fn select_region<'t>(lines: &[&'t str], grammar: &Grammar) -> (RegionKind, Vec<(usize, &'t str)>) {
    if grammar.has_region_markers() {
        let mut inside = false;
        let mut found = false;
        let mut selected = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            if grammar.is_region_start(line) {
                inside = true;
                found = true;
                continue;
            }
            if inside && grammar.is_region_end(line) {
                inside = false;
                continue;
            }
            if inside {
                selected.push((index, *line));
            }
        }

        if found && selected.iter().any(|(_, line)| is_transaction_shaped(line)) {
            return (RegionKind::Marked, selected);
        }
    }

    let first = lines.iter().position(|line| is_transaction_shaped(line));
    let last = lines.iter().rposition(|line| is_transaction_shaped(line));
    match (first, last) {
        (Some(first), Some(last)) => (
            RegionKind::Heuristic,
            (first..=last).map(|index| (index, lines[index])).collect(),
        ),
        _ => (RegionKind::Empty, Vec::new()),
    }
}

/// Whitespace tokenizer: leading date, optional posting date, trailing one
/// or two amounts (amount, then balance), description in between.
fn tokenize<'t>(line: &'t str, years: &YearContext) -> Option<RawLine<'t>> {
    let tokens: Vec<(usize, &str)> = token_spans(line);
    if tokens.len() < 2 {
        return None;
    }

    // Month-name dates span up to three tokens.
    let (date, mut start) = (1..=tokens.len().min(3))
        .rev()
        .find_map(|n| {
            let raw = span(line, &tokens[..n]);
            parse_date(raw, years).map(|_| (raw, n))
        })?;

    if tokens
        .get(start)
        .is_some_and(|(_, t)| parse_date(t, years).is_some())
    {
        start += 1;
    }

    let mut end = tokens.len();
    let mut amounts: Vec<&str> = Vec::new();
    while amounts.len() < 2 && end > start {
        let last = tokens[end - 1].1;
        let used = if (last.eq_ignore_ascii_case("CR") || last.eq_ignore_ascii_case("DR")) && end - 1 > start {
            2
        } else {
            1
        };
        let raw = span(line, &tokens[end - used..end]);
        if !AMOUNT_TOKEN.is_match(raw) || parse_amount(raw).is_none() {
            break;
        }
        amounts.push(raw);
        end -= used;
    }

    let (amount, balance) = match amounts.as_slice() {
        [amount] => (*amount, None),
        [balance, amount] => (*amount, Some(*balance)),
        _ => return None,
    };

    let description = tokens[start..end]
        .iter()
        .map(|(_, t)| *t)
        .collect::<Vec<_>>()
        .join(" ");
    if description.is_empty() {
        return None;
    }

    Some(RawLine {
        date,
        description,
        amount,
        balance,
    })
}

/// Whitespace-separated tokens with their byte offsets.
fn token_spans(line: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push((s, &line[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, &line[s..]));
    }
    tokens
}

/// Source text covering a run of tokens.
fn span<'t>(line: &'t str, tokens: &[(usize, &str)]) -> &'t str {
    match (tokens.first(), tokens.last()) {
        (Some((start, _)), Some((last, text))) => &line[*start..*last + text.len()],
        _ => "",
    }
}

/// Earliest and latest transaction dates.
pub fn date_range(transactions: &[Transaction]) -> Option<(NaiveDate, NaiveDate)> {
    let min = transactions.iter().map(|t| t.date).min()?;
    let max = transactions.iter().map(|t| t.date).max()?;
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{builtin, DateStyle, GrammarSpec, SignConvention};
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse(text: &str, ctx: &ParseContext) -> ParsedTransactions {
        TransactionParser::default().parse(text, &builtin::generic(), ctx)
    }

    #[test]
    fn test_single_line_statement() {
        let text = "Chase\nClosing Balance ... 1234.56\n01/15/2024 STARBUCKS -4.75\n";
        let parsed = parse(text, &ParseContext::default());

        assert_eq!(parsed.region, RegionKind::Heuristic);
        assert_eq!(parsed.transactions.len(), 1);
        let txn = &parsed.transactions[0];
        assert_eq!(txn.date, date(2024, 1, 15));
        assert_eq!(txn.description, "STARBUCKS");
        assert_eq!(txn.amount, dec("-4.75"));
        assert_eq!(txn.balance, None);
        assert_eq!(txn.confidence, 0.95);
        assert_eq!(parsed.parse_ratio(), 1.0);
        assert_eq!(parsed.source_lines, vec![3]);
    }

    #[test]
    fn test_marked_sections() {
        let text = "\
Statement Period: 01/01/2024 to 01/31/2024
Opening Balance 1,000.00
TRANSACTION DETAIL
Date Description Amount Balance
01/03 PAYROLL ACME INC 2,000.00 3,000.00
01/05 WHOLE FOODS MARKET -50.25 2,949.75
      AUSTIN TX
01/09 NETFLIX.COM -15.49 2,934.26
   RECURRING
--- PAGE 2 ---
Page 2 of 3
01/12 PENDING REVIEW
Total for this period 1,934.26
Customer service 1-800-555-0100 see 01/20 notice
DEPOSITS AND ADDITIONS
01/20 MOBILE DEPOSIT 65.74 3,000.00
Ending Balance 3,000.00
";
        let period = Period::ordered(date(2024, 1, 1), date(2024, 1, 31)).0;
        let ctx = ParseContext::new(AccountType::Bank, &period, text)
            .with_opening_balance(Some(dec("1000.00")));
        let parsed = parse(text, &ctx);

        assert_eq!(parsed.region, RegionKind::Marked);
        let descriptions: Vec<&str> = parsed
            .transactions
            .iter()
            .map(|t| t.description.as_str())
            .collect();
        assert_eq!(
            descriptions,
            vec![
                "PAYROLL ACME INC",
                "WHOLE FOODS MARKET AUSTIN TX",
                "NETFLIX.COM RECURRING",
                "MOBILE DEPOSIT",
            ]
        );
        assert_eq!(parsed.transactions[0].date, date(2024, 1, 3));
        assert_eq!(parsed.transactions[1].amount, dec("-50.25"));
        assert_eq!(parsed.transactions[3].balance, Some(dec("3000.00")));

        // dated but without an amount; the footer line outside the sections is not a candidate
        assert_eq!(parsed.unmatched.len(), 1);
        assert_eq!(parsed.unmatched[0].text, "01/12 PENDING REVIEW");
        assert_eq!(parsed.unmatched[0].line, 12);
        assert_eq!(parsed.candidate_lines, 5);
        assert_eq!(parsed.parse_ratio(), 0.8);
        assert!(parsed.outliers.is_empty(), "{:?}", parsed.outliers);
    }

    #[test]
    fn test_yearless_dates_use_period() {
        let text = "12/28 COFFEE SHOP -3.00\n01/02 GROCERY -20.00\n";
        let period = Period::ordered(date(2023, 12, 15), date(2024, 1, 14)).0;
        let parsed = parse(text, &ParseContext::new(AccountType::Unknown, &period, text));
        assert_eq!(parsed.transactions[0].date, date(2023, 12, 28));
        assert_eq!(parsed.transactions[1].date, date(2024, 1, 2));
    }

    #[test]
    fn test_yearless_without_context_is_a_miss() {
        let text = "12/28 COFFEE SHOP -3.00\n";
        let parsed = parse(text, &ParseContext::default());
        assert!(parsed.transactions.is_empty());
        assert_eq!(parsed.unmatched.len(), 1);
        assert_eq!(parsed.parse_ratio(), 0.0);
    }

    #[test]
    fn test_fallback_tokenizer() {
        let mut spec = builtin::generic_spec();
        spec.line.date_style = DateStyle::Iso;
        let grammar = spec.compile().unwrap();

        let parser = TransactionParser::default();
        let (txn, source) = parser
            .parse_line(
                "01/15/2024  01/16/2024  STARBUCKS  #123  -4.75  1,234.56",
                &grammar,
                &ParseContext::default(),
            )
            .unwrap();
        assert_eq!(source, LineSource::Fallback);
        assert_eq!(txn.description, "STARBUCKS #123");
        assert_eq!(txn.amount, dec("-4.75"));
        assert_eq!(txn.balance, Some(dec("1234.56")));
        assert_eq!(txn.confidence, 0.60);

        let (txn, _) = parser
            .parse_line("Jan 15, 2024 REFUND 9.99 CR", &grammar, &ParseContext::default())
            .unwrap();
        assert_eq!(txn.date, date(2024, 1, 15));
        assert_eq!(txn.description, "REFUND");
        assert_eq!(txn.amount, dec("9.99"));
    }

    #[test]
    fn test_date_shaped_description_is_kept() {
        let parser = TransactionParser::default();
        let (txn, source) = parser
            .parse_line("01/15/2024 24-7 FITNESS -12.00", &builtin::generic(), &ParseContext::default())
            .unwrap();
        assert_eq!(source, LineSource::Template);
        assert_eq!(txn.date, date(2024, 1, 15));
        assert_eq!(txn.description, "24-7 FITNESS");
        assert_eq!(txn.amount, dec("-12.00"));

        let (txn, _) = parser
            .parse_line(
                "01/14/2024 01/15/2024 PAYROLL ACME INC 2,100.00",
                &builtin::generic(),
                &ParseContext::default(),
            )
            .unwrap();
        assert_eq!(txn.date, date(2024, 1, 14));
        assert_eq!(txn.description, "PAYROLL ACME INC");
    }

    #[test]
    fn test_sign_policy_is_applied() {
        let mut spec = builtin::generic_spec();
        spec.sign.credit_card = SignConvention::Inverted;
        let grammar = spec.compile().unwrap();
        let ctx = ParseContext {
            account_type: AccountType::CreditCard,
            ..Default::default()
        };

        let parsed = TransactionParser::default().parse(
            "01/15/2024 RESTAURANT 25.00\n01/20/2024 PAYMENT THANK YOU -100.00\n",
            &grammar,
            &ctx,
        );
        assert_eq!(parsed.transactions[0].amount, dec("-25.00"));
        assert_eq!(parsed.transactions[1].amount, dec("100.00"));
    }

    #[test]
    fn test_balance_outlier_is_flagged() {
        let text = "\
01/02/2024 A -10.00 90.00
01/03/2024 B -10.00 50.00
01/04/2024 C -5.00
01/05/2024 D -5.00 40.00
";
        let ctx = ParseContext::default().with_opening_balance(Some(dec("100.00")));
        let parsed = parse(text, &ctx);

        assert_eq!(parsed.transactions.len(), 4);
        assert_eq!(parsed.outliers.len(), 1);
        assert_eq!(parsed.outliers[0].index, 1);
        assert_eq!(parsed.outliers[0].line, 2);
        assert!((parsed.transactions[1].confidence - 0.95 * 0.7).abs() < 1e-6);
        assert_eq!(parsed.transactions[3].confidence, 0.95);
    }

    #[test]
    fn test_oversized_amounts_are_misses() {
        let text = "\
01/15/2024 A 50000000000000000000000000000.00
01/16/2024 B 50000000000000000000000000000.00
01/17/2024 C -4.75 1,000,000,000,000.00
";
        let parsed = parse(text, &ParseContext::default());

        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.unmatched.len(), 2);
        assert_eq!(parsed.transactions[0].description, "C");
        assert_eq!(parsed.transactions[0].balance, None);
    }

    #[test]
    fn test_balance_check_survives_extreme_opening() {
        let ctx = ParseContext::default().with_opening_balance(Some(Decimal::MAX));
        let parsed = parse("01/02/2024 A 10.00 5.00\n", &ctx);

        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.outliers.len(), 1);
    }

    #[test]
    fn test_heuristic_region_bounds() {
        let text = "\
Header 2024
Payment Due 02/25/2024
01/15/2024 STARBUCKS -4.75
01/16/2024 SHELL OIL -30.00
Thank you for banking with us.
";
        let parsed = parse(text, &ParseContext::default());
        assert_eq!(parsed.region, RegionKind::Heuristic);
        assert_eq!(parsed.transactions.len(), 2);
        assert_eq!(parsed.candidate_lines, 2);
        assert_eq!(parsed.transactions[1].description, "SHELL OIL");
    }

    #[test]
    fn test_empty_region() {
        let parsed = parse("Closing Balance 10.00\n", &ParseContext::default());
        assert_eq!(parsed.region, RegionKind::Empty);
        assert_eq!(parsed.candidate_lines, 0);
        assert_eq!(parsed.parse_ratio(), 0.0);
    }

    #[test]
    fn test_order_is_document_order() {
        let text = "01/20/2024 LATER -1.00\n01/05/2024 EARLIER -2.00\n";
        let parsed = parse(text, &ParseContext::default());
        assert_eq!(parsed.transactions[0].description, "LATER");
        assert_eq!(
            date_range(&parsed.transactions),
            Some((date(2024, 1, 5), date(2024, 1, 20)))
        );
    }

    #[test]
    fn test_custom_template() {
        let spec = GrammarSpec {
            institution: "Iso Bank".to_string(),
            line: crate::grammar::LineTemplateSpec {
                slots: vec![
                    crate::grammar::Slot::Date,
                    crate::grammar::Slot::Amount,
                    crate::grammar::Slot::Description,
                ],
                date_style: DateStyle::Iso,
            },
            ..Default::default()
        }
        .inherit(&builtin::generic_spec());
        let grammar = spec.compile().unwrap();

        let (txn, source) = TransactionParser::default()
            .parse_line("2024-02-01 -12.50 PARKING GARAGE", &grammar, &ParseContext::default())
            .unwrap();
        assert_eq!(source, LineSource::Template);
        assert_eq!(txn.description, "PARKING GARAGE");
        assert_eq!(txn.amount, dec("-12.50"));
    }
}
