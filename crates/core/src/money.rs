use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Scale of monetary totals (cents).
pub const CURRENCY_SCALE: u32 = 2;

/// Scale kept for unit prices, which may carry fractions of a cent (e.g. 0,6667).
pub const PRICE_SCALE: u32 = 4;

/// Why a printed number could not be read without a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ambiguity {
    /// Integer token with no decimal separator (`12`, `1.234.567`).
    NoDecimalSeparator,
    /// A single dot that reads either as thousands or decimal (`1.234`, `5.50`).
    SeparatorAmbiguous,
}

impl std::fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ambiguity::NoDecimalSeparator => write!(f, "separatore decimale assente"),
            Ambiguity::SeparatorAmbiguous => write!(f, "separatore ambiguo"),
        }
    }
}

/// A number read from Italian-locale text. `ambiguity` is set when the
/// reading relied on locale convention rather than an unambiguous shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAmount {
    pub value: Decimal,
    pub ambiguity: Option<Ambiguity>,
}

impl ParsedAmount {
    fn clear(value: Decimal) -> Self {
        Self { value, ambiguity: None }
    }

    fn ambiguous(value: Decimal, why: Ambiguity) -> Self {
        Self { value, ambiguity: Some(why) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("not a number: '{0}'")]
    Invalid(String),
}

/// Parse an Italian-formatted amount (`1.234,56`, `5,00`, `€ 12,50`, `-3,10`).
///
/// Comma is the decimal separator and dot groups thousands. Tokens whose
/// shape leaves the separator role open are returned with an [`Ambiguity`]
/// instead of being rejected, so callers can flag them.
pub fn parse_amount_it(token: &str) -> Result<ParsedAmount, AmountError> {
    let s = token.trim().trim_start_matches('€').trim_end_matches('€').trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    let invalid = || AmountError::Invalid(token.trim().to_string());

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };
    if body.is_empty()
        || !body.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
        || !body.chars().any(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let commas = body.matches(',').count();
    let dots = body.matches('.').count();

    let parsed = match (commas, dots) {
        (0, 0) => ParsedAmount::ambiguous(to_decimal(body).ok_or_else(invalid)?, Ambiguity::NoDecimalSeparator),
        (1, _) => {
            let (int_part, frac) = body.split_once(',').ok_or_else(invalid)?;
            if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            let digits = ungroup(int_part).ok_or_else(invalid)?;
            ParsedAmount::clear(to_decimal(&format!("{digits}.{frac}")).ok_or_else(invalid)?)
        }
        (0, 1) => {
            let (int_part, frac) = body.split_once('.').ok_or_else(invalid)?;
            if int_part.is_empty() || frac.is_empty() {
                return Err(invalid());
            }
            // Three trailing digits after a 1-3 digit group with no leading
            // zero read as thousands; anything else only works as a decimal point.
            let thousands = frac.len() == 3 && (1..=3).contains(&int_part.len()) && !int_part.starts_with('0');
            let value = if thousands {
                to_decimal(&format!("{int_part}{frac}"))
            } else {
                to_decimal(&format!("{int_part}.{frac}"))
            };
            ParsedAmount::ambiguous(value.ok_or_else(invalid)?, Ambiguity::SeparatorAmbiguous)
        }
        (0, _) => {
            let digits = ungroup(body).ok_or_else(invalid)?;
            ParsedAmount::ambiguous(to_decimal(&digits).ok_or_else(invalid)?, Ambiguity::NoDecimalSeparator)
        }
        _ => return Err(invalid()),
    };

    Ok(if negative {
        ParsedAmount { value: -parsed.value, ..parsed }
    } else {
        parsed
    })
}

/// Strip dot thousands separators, checking the 1-3 / 3 / 3 grouping.
fn ungroup(int_part: &str) -> Option<String> {
    if !int_part.contains('.') {
        return (!int_part.is_empty()).then(|| int_part.to_string());
    }
    let groups: Vec<&str> = int_part.split('.').collect();
    let first_ok = (1..=3).contains(&groups[0].len());
    let rest_ok = groups[1..].iter().all(|g| g.len() == 3);
    (first_ok && rest_ok).then(|| groups.concat())
}

fn to_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s).ok()
}

/// Format with Italian separators: `1234.5` → `1.234,50` at `dp = 2`.
pub fn format_amount_it(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp(dp);
    let plain = format!("{:.*}", dp as usize, rounded.abs());
    let (int_part, frac) = match plain.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (plain.clone(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    match frac {
        Some(f) => format!("{sign}{grouped},{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Currency display used in reports: `€ 1.234,56`.
pub fn format_eur(value: Decimal) -> String {
    format!("€ {}", format_amount_it(value, CURRENCY_SCALE))
}
