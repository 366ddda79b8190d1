//! Common pattern fragments and token classifiers for statement text.
//!
//! The `*_FRAGMENT` constants are building blocks for grammar specs; the
//! compiled statics classify single lines and tokens.

use lazy_static::lazy_static;
use regex::Regex;

/// Signed currency amount: `$1,234.56`, `-4.75`, `(12.00)`, `4.75-`, `9.99 CR`.
pub const AMOUNT_FRAGMENT: &str =
    r"(?:[-+]\s?)?\(?(?:\$\s?)?(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}\)?(?:-|\s?(?:CR|DR|cr|dr)\b)?";

/// Numeric US date: `01/15/2024`, `1/5/24`, `01-15-2024`, `01/15`.
pub const US_DATE_FRAGMENT: &str = r"\d{1,2}[/-]\d{1,2}(?:[/-]\d{2,4})?";

/// ISO date: `2024-01-15`.
pub const ISO_DATE_FRAGMENT: &str = r"\d{4}-\d{2}-\d{2}";

/// Month-name date: `January 15, 2024`, `Jan 15 2024`, `Jan. 15`.
pub const LONG_DATE_FRAGMENT: &str = r"(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2}(?:,?\s+(?:19|20)\d{2})?";

/// Any date that carries a year, for header fields.
pub const FULL_DATE_FRAGMENT: &str = r"(?:\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4})";

/// Masked or full account number ending in at least four digits.
pub const ACCOUNT_NUMBER_FRAGMENT: &str = r"(?:[*xX\d\-]+ )*[*xX\d\-]*\d{4}";

/// Holder name on a single line.
pub const NAME_FRAGMENT: &str = r"[A-Za-z][A-Za-z .,'\-]{1,59}?";

lazy_static! {
    /// Page break inserted by document readers between pages.
    pub static ref PAGE_MARKER: Regex = Regex::new(
        r"^\s*--- PAGE \d+ ---\s*$"
    ).unwrap();

    /// A date-like token anywhere in a line.
    pub static ref DATE_TOKEN: Regex = Regex::new(
        r"(?i)\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}(?:[/-]\d{2,4})?|(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2})\b"
    ).unwrap();

    /// An amount-like token anywhere in a line.
    pub static ref AMOUNT_TOKEN: Regex = Regex::new(
        r"(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}\b"
    ).unwrap();

    /// Four-digit year between 1900 and 2099.
    pub static ref YEAR_TOKEN: Regex = Regex::new(
        r"\b(19\d{2}|20\d{2})\b"
    ).unwrap();

    /// Whitespace runs, for normalizing descriptions.
    pub static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();

    /// YYYY-MM-DD
    pub static ref DATE_ISO: Regex = Regex::new(
        r"^(\d{4})-(\d{1,2})-(\d{1,2})$"
    ).unwrap();

    /// MM/DD, MM/DD/YY, MM/DD/YYYY (slashes or dashes)
    pub static ref DATE_US: Regex = Regex::new(
        r"^(\d{1,2})[/-](\d{1,2})(?:[/-](\d{2}|\d{4}))?$"
    ).unwrap();

    /// "Jan 15", "January 15, 2024", "Sept. 5 2024"
    pub static ref DATE_MONTH_NAME: Regex = Regex::new(
        r"(?i)^(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+(\d{1,2})(?:,?\s+(\d{4}))?$"
    ).unwrap();
}

/// Whether a line looks like a transaction row: a date and an amount.
pub fn is_transaction_shaped(line: &str) -> bool {
    DATE_TOKEN.is_match(line) && AMOUNT_TOKEN.is_match(line)
}

/// Whether a line holds any date-like or amount-like token.
pub fn has_date_or_amount(line: &str) -> bool {
    DATE_TOKEN.is_match(line) || AMOUNT_TOKEN.is_match(line)
}

/// Collapse whitespace runs into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE_RUN.replace_all(s.trim(), " ").into_owned()
}
