//! Built-in grammars: the generic fallback and the known institutions.

use std::sync::Arc;

use lazy_static::lazy_static;

use super::patterns::{ACCOUNT_NUMBER_FRAGMENT, AMOUNT_FRAGMENT, FULL_DATE_FRAGMENT, NAME_FRAGMENT};
use super::{Grammar, GrammarSpec, SignConvention, SignPolicy, SignatureSpec, TypeRuleSpec, GENERIC};
use crate::models::statement::AccountType;

/// Institution name, name signature, web-domain signature.
const INSTITUTIONS: &[(&str, &str, &str)] = &[
    ("Chase", r"(?i)\bJPMorgan\s+Chase\b|\bChase\b", r"(?i)\bchase\.com\b"),
    ("Bank of America", r"(?i)\bBank\s+of\s+America\b|\bBofA\b", r"(?i)\bbankofamerica\.com\b"),
    ("Wells Fargo", r"(?i)\bWells\s+Fargo\b", r"(?i)\bwellsfargo\.com\b"),
    ("Citi", r"(?i)\bCiti(?:bank|group)?\b", r"(?i)\bciti(?:bank)?\.com\b"),
    ("American Express", r"(?i)\bAmerican\s+Express\b|\bAMEX\b", r"(?i)\bamericanexpress\.com\b"),
    ("Discover", r"(?i)\bDiscover\s+(?:Card|Bank|it)\b", r"(?i)\bdiscover\.com\b"),
    ("Capital One", r"(?i)\bCapital\s+One\b", r"(?i)\bcapitalone\.com\b"),
    ("U.S. Bank", r"\bU\.?\s?S\.?\s+(?i:bank)\b", r"(?i)\busbank\.com\b"),
    ("PNC", r"(?i)\bPNC(?:\s+Bank)?\b", r"(?i)\bpnc\.com\b"),
    ("TD Bank", r"(?i)\bTD\s+Bank\b", r"(?i)\btdbank\.com\b"),
    ("Regions", r"(?i)\bRegions\s+Bank\b", r"(?i)\bregions\.com\b"),
    ("Truist", r"(?i)\bTruist\b|\bSunTrust\b", r"(?i)\btruist\.com\b"),
    ("Barclays", r"(?i)\bBarclays\b", r"(?i)\bbarclays(?:us)?\.com\b"),
    ("Ally", r"(?i)\bAlly\s+Bank\b", r"(?i)\bally\.com\b"),
    ("Charles Schwab", r"(?i)\bCharles\s+Schwab\b", r"(?i)\bschwab\.com\b"),
    ("Fidelity", r"(?i)\bFidelity\s+(?:Investments|Brokerage)\b|\bFidelity\b", r"(?i)\bfidelity\.com\b"),
    ("Vanguard", r"(?i)\bVanguard\b", r"(?i)\bvanguard\.com\b"),
];

const NAME_WEIGHT: f32 = 1.0;
const DOMAIN_WEIGHT: f32 = 0.5;

lazy_static! {
    static ref GENERIC_GRAMMAR: Arc<Grammar> =
        Arc::new(generic_spec().compile().expect("generic grammar must compile"));

    static ref INSTITUTION_GRAMMARS: Vec<Arc<Grammar>> = institution_specs()
        .iter()
        .map(|spec| Arc::new(spec.compile().expect("built-in grammar must compile")))
        .collect();
}

/// The compiled generic fallback grammar.
pub fn generic() -> Arc<Grammar> {
    Arc::clone(&GENERIC_GRAMMAR)
}

/// The compiled built-in institution grammars, in registration order.
pub fn institutions() -> Vec<Arc<Grammar>> {
    INSTITUTION_GRAMMARS.iter().cloned().collect()
}

/// Spec of the generic fallback grammar.
pub fn generic_spec() -> GrammarSpec {
    let amount = AMOUNT_FRAGMENT;
    let date = FULL_DATE_FRAGMENT;
    let account = ACCOUNT_NUMBER_FRAGMENT;
    let name = NAME_FRAGMENT;
    let range_sep = r"\s*(?:to|through|thru|-|–)\s*";

    GrammarSpec {
        institution: GENERIC.to_string(),
        signatures: Vec::new(),
        account_number: vec![
            format!(r"(?i)\baccount\s+(?:number|no\.?|#)\s*[:.]?\s*(?P<value>{account})"),
            format!(r"(?i)\baccount\s+ending\s+(?:in\s+)?(?P<value>\d{{4}})\b"),
            format!(r"(?i)\bacct\.?\s*(?:#|no\.?)?\s*[:.]?\s*(?P<value>{account})"),
            format!(r"(?i)\bcard\s+(?:number|ending\s+in)\s*[:.]?\s*(?P<value>{account})"),
        ],
        holder_name: vec![
            format!(r"(?im)^[ \t]*account[ \t]+(?:name|holder)[ \t]*:?[ \t]*(?P<value>{name})[ \t]*$"),
            format!(r"(?im)^[ \t]*primary[ \t]+account[ \t]+holder[ \t]*:?[ \t]*(?P<value>{name})[ \t]*$"),
            format!(r"(?im)^[ \t]*(?:customer|member|card[ \t]*member)[ \t]+name[ \t]*:[ \t]*(?P<value>{name})[ \t]*$"),
        ],
        period: vec![
            format!(r"(?i)\b(?:statement|billing)\s+(?:period|cycle)\s*:?\s*(?P<start>{date}){range_sep}(?P<end>{date})"),
            format!(r"(?i)\bfrom\s+(?P<start>{date})\s+(?:to|through|thru)\s+(?P<end>{date})"),
            format!(r"(?i)\b(?:period|cycle)(?:\s+covered)?\s*:?\s*(?P<start>{date}){range_sep}(?P<end>{date})"),
            format!(r"(?i)(?P<start>{date})\s+(?:to|through|thru|-|–)\s+(?P<end>{date})"),
        ],
        opening_balance: vec![
            format!(r"(?i)\b(?:opening|beginning)\s+balance[^\d\n]*?(?P<value>{amount})"),
            format!(r"(?i)\b(?:opening|beginning)\s+balance\s+(?:on|as\s+of)\s+{date}[^\d\n]*?(?P<value>{amount})"),
            format!(r"(?i)\bprevious\s+balance[^\d\n]*?(?P<value>{amount})"),
            format!(r"(?i)\bbalance\s+(?:forward|from\s+last\s+statement)[^\d\n]*?(?P<value>{amount})"),
        ],
        closing_balance: vec![
            format!(r"(?i)\b(?:closing|ending)\s+balance[^\d\n]*?(?P<value>{amount})"),
            format!(r"(?i)\b(?:closing|ending)\s+balance\s+(?:on|as\s+of)\s+{date}[^\d\n]*?(?P<value>{amount})"),
            format!(r"(?i)\bnew\s+balance[^\d\n]*?(?P<value>{amount})"),
            format!(r"(?i)\b(?:statement|total)\s+balance[^\d\n]*?(?P<value>{amount})"),
        ],
        account_types: vec![
            TypeRuleSpec {
                account_type: AccountType::CreditCard,
                pattern: r"(?i:credit\s+card|credit\s+account|cash\s+advance|minimum\s+payment)|\bAPR\b".to_string(),
            },
            TypeRuleSpec {
                account_type: AccountType::Bank,
                pattern: r"(?i:checking|savings|bank\s+statement|\bdeposits?\b|withdraw)|\bATM\b".to_string(),
            },
            TypeRuleSpec {
                account_type: AccountType::Investment,
                pattern: r"(?i)investment|portfolio|securities|brokerage|mutual\s+fund|\bstocks?\b|\bbonds?\b".to_string(),
            },
        ],
        default_type: None,
        line: Default::default(),
        region_start: vec![
            r"(?i)^\s*(?:transaction\s+(?:detail|details|history)|account\s+activity|transactions?|payments?\s+and\s+(?:other\s+)?credits|purchases(?:\s+and\s+(?:other\s+)?(?:charges|debits))?|deposits\s+and\s+(?:other\s+)?(?:additions|credits)|withdrawals\s+and\s+(?:other\s+)?(?:subtractions|debits)|electronic\s+withdrawals|checks\s+paid|atm\s+(?:&|and)\s+debit\s+card\s+withdrawals|fees(?:\s+charged)?|interest\s+charged)\b[^\d]*$".to_string(),
        ],
        region_end: vec![
            r"(?i)^\s*(?:total\s+\w|(?:ending|closing|new)\s+balance\b|account\s+summary|balance\s+summary|daily\s+(?:ending\s+)?balance|interest\s+charge\s+calculation|important\s+(?:information|notices?)|year[-\s]to[-\s]date\s+totals)".to_string(),
        ],
        skip_lines: vec![
            r"(?i)^\s*page\s+\d+(?:\s+of\s+\d+)?\s*$".to_string(),
            r"(?i)^\s*(?:(?:trans(?:action)?|post(?:ing)?)\.?\s+)?date\b.*\b(?:description|details|merchant|amount)\b".to_string(),
            r"(?i)^\s*\(?continued\)?\s*$".to_string(),
            r"(?i)^\s*(?:[\d/-]+\s+)?(?:beginning|opening|previous)\s+balance\b".to_string(),
        ],
        sign: SignPolicy::default(),
    }
}

fn institution(name: &str, signature: &str, domain: &str) -> GrammarSpec {
    GrammarSpec {
        institution: name.to_string(),
        signatures: vec![
            SignatureSpec::new(signature, NAME_WEIGHT),
            SignatureSpec::new(domain, DOMAIN_WEIGHT),
        ],
        ..Default::default()
    }
}

/// Specs of the built-in institution grammars, in registration order.
pub fn institution_specs() -> Vec<GrammarSpec> {
    let base = generic_spec();
    let amount = AMOUNT_FRAGMENT;

    INSTITUTIONS
        .iter()
        .map(|(name, signature, domain)| {
            let mut spec = institution(name, signature, domain);
            match *name {
                "American Express" => {
                    spec.default_type = Some(AccountType::CreditCard);
                    spec.sign.credit_card = SignConvention::Inverted;
                    spec.account_number = vec![format!(
                        r"(?i)\baccount\s+ending\s+(?P<value>\d-\d{{5}})\b"
                    )];
                    spec.account_number.extend(base.account_number.iter().cloned());
                }
                "Discover" => {
                    spec.default_type = Some(AccountType::CreditCard);
                }
                "Charles Schwab" | "Fidelity" | "Vanguard" => {
                    spec.default_type = Some(AccountType::Investment);
                    spec.opening_balance = vec![format!(
                        r"(?i)\b(?:beginning|starting)\s+account\s+value[^\d\n]*?(?P<value>{amount})"
                    )];
                    spec.opening_balance.extend(base.opening_balance.iter().cloned());
                    spec.closing_balance = vec![format!(
                        r"(?i)\b(?:ending|total)\s+account\s+value[^\d\n]*?(?P<value>{amount})"
                    )];
                    spec.closing_balance.extend(base.closing_balance.iter().cloned());
                }
                _ => {}
            }
            spec.inherit(&base)
        })
        .collect()
}
