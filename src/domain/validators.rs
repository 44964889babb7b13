//! Card field validators.
//!
//! Every validator reports whether the value is valid now and whether it could
//! still become valid with more input. Date validators take the current month
//! explicitly.

use super::card_type::{self, CardType};
use chrono::Datelike;
use serde::Serialize;

/// Upper bound on how far in the future an expiration year may be.
pub const MAX_ELAPSED_YEARS: i32 = 19;
pub const DEFAULT_POSTAL_CODE_MIN_LENGTH: usize = 3;
pub const CARDHOLDER_NAME_MAX_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub is_valid: bool,
    pub is_potentially_valid: bool,
}

impl Verification {
    pub const fn new(is_valid: bool, is_potentially_valid: bool) -> Self {
        Self {
            is_valid,
            is_potentially_valid,
        }
    }

    const INVALID: Self = Self::new(false, false);
    const INCOMPLETE: Self = Self::new(false, true);
    const VALID: Self = Self::new(true, true);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn today() -> Self {
        let now = chrono::Local::now();
        Self::new(now.year(), now.month())
    }
}

fn is_digits(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_digit())
}

pub fn luhn(number: &str) -> bool {
    let mut sum = 0;
    let mut double = false;
    for byte in number.bytes().rev() {
        if !byte.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(byte - b'0');
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
    }
    !number.is_empty() && sum % 10 == 0
}

/// Strips the separators a user may type between digit groups.
pub fn strip_gaps(value: &str) -> String {
    value.chars().filter(|c| *c != ' ' && *c != '-').collect()
}

/// Validates a card number, returning the detected brand when exactly one matches.
pub fn number(value: &str, max_length: Option<usize>) -> (Verification, Option<CardType>) {
    let value = strip_gaps(value);
    if !is_digits(&value) {
        return (Verification::INVALID, None);
    }

    let mut candidates = card_type::detect(&value);
    if candidates.is_empty() {
        return (Verification::INVALID, None);
    }
    if candidates.len() != 1 {
        return (Verification::INCOMPLETE, None);
    }
    let card = candidates.remove(0);

    if max_length.is_some_and(|max| value.len() > max) {
        return (Verification::INVALID, Some(card));
    }

    let is_valid = card.brand == card_type::CardBrand::Unionpay || luhn(&value);
    let mut longest = card.max_length();
    if let Some(max) = max_length {
        longest = longest.min(max);
    }

    let verification = if card.lengths.contains(&value.len()) {
        Verification::new(is_valid, value.len() < longest || is_valid)
    } else {
        Verification::new(false, value.len() < longest)
    };
    (verification, Some(card))
}

pub fn cvv(value: &str, size: usize) -> Verification {
    if !is_digits(value) {
        return Verification::INVALID;
    }
    match value.len() {
        len if len == size => Verification::VALID,
        len if len < size => Verification::INCOMPLETE,
        _ => Verification::INVALID,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthVerification {
    pub verification: Verification,
    pub is_valid_for_this_year: bool,
}

pub fn expiration_month(value: &str, today: YearMonth) -> MonthVerification {
    let trimmed: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if trimmed.is_empty() || value == "0" {
        return MonthVerification {
            verification: Verification::INCOMPLETE,
            is_valid_for_this_year: false,
        };
    }
    let month = match value.parse::<u32>() {
        Ok(month) if is_digits(value) => month,
        _ => {
            return MonthVerification {
                verification: Verification::INVALID,
                is_valid_for_this_year: false,
            };
        }
    };
    let valid = (1..=12).contains(&month);
    MonthVerification {
        verification: Verification::new(valid, valid),
        is_valid_for_this_year: valid && month >= today.month,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearVerification {
    pub verification: Verification,
    pub is_current_year: bool,
}

pub fn expiration_year(value: &str, today: YearMonth) -> YearVerification {
    let not_current = |verification| YearVerification {
        verification,
        is_current_year: false,
    };

    if value.trim().is_empty() {
        return not_current(Verification::INCOMPLETE);
    }
    if !is_digits(value) {
        return not_current(Verification::INVALID);
    }

    let current = today.year;
    let century = current.to_string();
    match value.len() {
        0 | 1 => not_current(Verification::INCOMPLETE),
        // Could still become a four-digit year.
        2 if value == &century[..2] => not_current(Verification::INCOMPLETE),
        3 => not_current(Verification::new(false, value[..2] == century[..2])),
        2 | 4 => {
            let Ok(year) = value.parse::<i32>() else {
                return not_current(Verification::INVALID);
            };
            let (reference, is_current_year) = if value.len() == 2 {
                (current % 100, year == current % 100)
            } else {
                (current, year == current)
            };
            let valid = year >= reference && year <= reference + MAX_ELAPSED_YEARS;
            YearVerification {
                verification: Verification::new(valid, valid),
                is_current_year,
            }
        }
        _ => not_current(Verification::INVALID),
    }
}

/// Splits a combined expiration date into month and year.
///
/// With a `/` the halves are taken as typed. Otherwise a leading `0` or `1`
/// means a two-digit month; any other leading digit is a single-digit month
/// that gets zero padded.
pub fn split_date(value: &str) -> (String, String) {
    if let Some((month, year)) = value.split_once('/') {
        let month: String = month.chars().filter(char::is_ascii_digit).collect();
        let year: String = year.chars().filter(char::is_ascii_digit).collect();
        let month = if month.len() == 1 && month != "0" && month != "1" {
            format!("0{month}")
        } else {
            month
        };
        return (month, year);
    }

    let digits: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '/'))
        .collect();
    match digits.chars().next() {
        None => (String::new(), String::new()),
        Some('0' | '1') => {
            let split = digits.len().min(2);
            (digits[..split].to_string(), digits[split..].to_string())
        }
        Some(leading) => (format!("0{leading}"), digits[leading.len_utf8()..].to_string()),
    }
}

/// Joint verdict for a month and a year.
pub fn expiration_date_parts(month: &str, year: &str, today: YearMonth) -> Verification {
    let month_check = expiration_month(month, today);
    let year_check = expiration_year(year, today);

    if month_check.verification.is_valid {
        if year_check.is_current_year {
            let valid = month_check.is_valid_for_this_year;
            return Verification::new(valid, valid);
        }
        if year_check.verification.is_valid {
            return Verification::VALID;
        }
    }

    if month_check.verification.is_potentially_valid && year_check.verification.is_potentially_valid
    {
        Verification::INCOMPLETE
    } else {
        Verification::INVALID
    }
}

pub fn expiration_date(value: &str, today: YearMonth) -> Verification {
    let (month, year) = split_date(value);
    expiration_date_parts(&month, &year, today)
}

pub fn postal_code(value: &str, min_length: usize) -> Verification {
    if value.chars().count() < min_length {
        Verification::INCOMPLETE
    } else {
        Verification::VALID
    }
}

pub fn cardholder_name(value: &str) -> Verification {
    let length = value.chars().count();
    if length == 0 {
        return Verification::INCOMPLETE;
    }
    if length > CARDHOLDER_NAME_MAX_LENGTH {
        return Verification::INVALID;
    }
    if value.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-') {
        // Looks like a card number typed into the wrong field.
        return Verification::INCOMPLETE;
    }
    Verification::VALID
}
