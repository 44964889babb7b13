//! Field inputs: one variant per field kind behind a shared capability trait.
//!
//! Inputs only describe the element and convert between what the customer sees
//! and the raw value stored in the card form. Painting the element is left to
//! the host.

use crate::config::FieldOptions;
use crate::domain::card_form::CardForm;
use crate::domain::card_type;
use crate::domain::field::FieldKey;
use crate::domain::validators::{self, YearMonth};
use serde::Serialize;
use std::collections::BTreeSet;

const DEFAULT_GAPS: [usize; 3] = [4, 8, 12];
const DEFAULT_NUMBER_LENGTH: usize = 19;
const DEFAULT_POSTAL_CODE_LENGTH: usize = 10;

/// Description of the input element a frame renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputElement {
    pub id: String,
    pub name: String,
    pub input_type: String,
    pub input_mode: String,
    pub autocomplete: String,
    pub maxlength: usize,
    pub placeholder: Option<String>,
    pub classes: BTreeSet<String>,
    pub value: String,
}

pub trait FieldInput: Send + Sync {
    fn key(&self) -> FieldKey;

    fn construct_element(&self, options: &FieldOptions) -> InputElement;

    /// Text shown for the raw `value`.
    fn render(&self, value: &str, form: &CardForm) -> String;

    /// Raw value for what the customer typed. Never longer than what
    /// [`FieldInput::render`] would show for it.
    fn unformatted_value(&self, raw: &str, form: &CardForm) -> String;

    fn set_placeholder(&self, element: &mut InputElement, text: &str) {
        element.placeholder = Some(text.to_string());
    }
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn element(key: FieldKey, options: &FieldOptions, autocomplete: &str, numeric: bool, maxlength: usize) -> InputElement {
    let name = match key {
        FieldKey::Number => "credit-card-number",
        FieldKey::Cvv => "cvv",
        FieldKey::ExpirationDate => "expiration",
        FieldKey::ExpirationMonth => "expiration-month",
        FieldKey::ExpirationYear => "expiration-year",
        FieldKey::PostalCode => "postal-code",
        FieldKey::CardholderName => "cardholder-name",
    };
    InputElement {
        id: name.to_string(),
        name: name.to_string(),
        input_type: options.input_type.clone().unwrap_or_else(|| "text".to_string()),
        input_mode: if numeric { "numeric" } else { "text" }.to_string(),
        autocomplete: autocomplete.to_string(),
        maxlength: options.maxlength.map_or(maxlength, |max| max.min(maxlength)),
        placeholder: options.placeholder.clone(),
        classes: BTreeSet::new(),
        value: String::new(),
    }
}

/// Splits `value` into groups at the given offsets.
fn with_gaps(value: &str, gaps: &[usize]) -> String {
    let mut formatted = String::with_capacity(value.len() + gaps.len());
    for (index, c) in value.chars().enumerate() {
        if index > 0 && gaps.contains(&index) {
            formatted.push(' ');
        }
        formatted.push(c);
    }
    formatted
}

pub struct NumberInput;

impl FieldInput for NumberInput {
    fn key(&self) -> FieldKey {
        FieldKey::Number
    }

    fn construct_element(&self, options: &FieldOptions) -> InputElement {
        // Room for the digits plus the spaces between groups.
        element(self.key(), options, "cc-number", true, DEFAULT_NUMBER_LENGTH + DEFAULT_GAPS.len())
    }

    fn render(&self, value: &str, form: &CardForm) -> String {
        let cards = form.possible_card_types();
        let (gaps, max_length) = match cards.as_slice() {
            [card] => (card.gaps.clone(), card.max_length()),
            _ => (DEFAULT_GAPS.to_vec(), DEFAULT_NUMBER_LENGTH),
        };
        let value: String = value.chars().take(max_length).collect();
        with_gaps(&value, &gaps)
    }

    fn unformatted_value(&self, raw: &str, _form: &CardForm) -> String {
        let typed = digits(raw);
        let max_length = match card_type::detect(&typed).as_slice() {
            [card] => card.max_length(),
            _ => DEFAULT_NUMBER_LENGTH,
        };
        typed.chars().take(max_length).collect()
    }
}

pub struct CvvInput;

impl FieldInput for CvvInput {
    fn key(&self) -> FieldKey {
        FieldKey::Cvv
    }

    fn construct_element(&self, options: &FieldOptions) -> InputElement {
        element(self.key(), options, "cc-csc", true, 4)
    }

    fn render(&self, value: &str, form: &CardForm) -> String {
        value.chars().take(form.cvv_size()).collect()
    }

    fn unformatted_value(&self, raw: &str, form: &CardForm) -> String {
        digits(raw).chars().take(form.cvv_size()).collect()
    }
}

/// How the month part of a typed expiration date is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePattern {
    /// `MM / YYYY`
    TwoDigitMonth,
    /// `M / YYYY`, shown zero padded.
    SingleDigitMonth,
}

/// Picks the layout for the digits typed so far. The rules are checked in order.
pub fn pattern_for(digits: &str, today: YearMonth) -> DatePattern {
    match digits.chars().next() {
        None | Some('0' | '1') => DatePattern::TwoDigitMonth,
        Some(_) if (3..=4).contains(&digits.len()) && validators::expiration_date(digits, today).is_valid => {
            DatePattern::TwoDigitMonth
        }
        Some(_) => DatePattern::SingleDigitMonth,
    }
}

/// Month and year parts of typed digits under `pattern`. Single digit months
/// that complete a valid date are zero padded.
fn date_parts(digits: &str, pattern: DatePattern) -> (String, String) {
    let Some(first) = digits.chars().next() else {
        return (String::new(), String::new());
    };
    match (pattern, first) {
        (DatePattern::TwoDigitMonth, '0' | '1') => {
            let split = digits.len().min(2);
            (digits[..split].to_string(), digits[split..].to_string())
        }
        (DatePattern::TwoDigitMonth, _) => (format!("0{first}"), digits[1..].to_string()),
        (DatePattern::SingleDigitMonth, _) => (first.to_string(), digits[1..].to_string()),
    }
}

pub struct ExpirationDateInput;

impl ExpirationDateInput {
    fn parts(&self, raw: &str, today: YearMonth) -> (DatePattern, String, String) {
        let typed = digits(raw);
        let pattern = pattern_for(&typed, today);
        let (month, year) = date_parts(&typed, pattern);
        let year = year.chars().take(4).collect();
        (pattern, month, year)
    }
}

impl FieldInput for ExpirationDateInput {
    fn key(&self) -> FieldKey {
        FieldKey::ExpirationDate
    }

    fn construct_element(&self, options: &FieldOptions) -> InputElement {
        element(self.key(), options, "cc-exp", true, 9)
    }

    fn render(&self, value: &str, form: &CardForm) -> String {
        let (pattern, month, year) = self.parts(value, form.today());
        let month = match pattern {
            DatePattern::SingleDigitMonth => format!("0{month}"),
            DatePattern::TwoDigitMonth => month,
        };
        if month.len() < 2 {
            month
        } else {
            format!("{month} / {year}")
        }
    }

    fn unformatted_value(&self, raw: &str, form: &CardForm) -> String {
        let (_, month, year) = self.parts(raw, form.today());
        if year.is_empty() {
            month
        } else {
            format!("{month}/{year}")
        }
    }
}

pub struct ExpirationMonthInput;

impl FieldInput for ExpirationMonthInput {
    fn key(&self) -> FieldKey {
        FieldKey::ExpirationMonth
    }

    fn construct_element(&self, options: &FieldOptions) -> InputElement {
        element(self.key(), options, "cc-exp-month", true, 2)
    }

    fn render(&self, value: &str, _form: &CardForm) -> String {
        value.chars().take(2).collect()
    }

    fn unformatted_value(&self, raw: &str, _form: &CardForm) -> String {
        digits(raw)
    }
}

pub struct ExpirationYearInput;

impl FieldInput for ExpirationYearInput {
    fn key(&self) -> FieldKey {
        FieldKey::ExpirationYear
    }

    fn construct_element(&self, options: &FieldOptions) -> InputElement {
        element(self.key(), options, "cc-exp-year", true, 4)
    }

    fn render(&self, value: &str, _form: &CardForm) -> String {
        value.chars().take(4).collect()
    }

    fn unformatted_value(&self, raw: &str, _form: &CardForm) -> String {
        digits(raw)
    }
}

pub struct PostalCodeInput;

impl FieldInput for PostalCodeInput {
    fn key(&self) -> FieldKey {
        FieldKey::PostalCode
    }

    fn construct_element(&self, options: &FieldOptions) -> InputElement {
        element(self.key(), options, "billing postal-code", false, DEFAULT_POSTAL_CODE_LENGTH)
    }

    fn render(&self, value: &str, _form: &CardForm) -> String {
        value.to_string()
    }

    fn unformatted_value(&self, raw: &str, _form: &CardForm) -> String {
        raw.trim().to_string()
    }
}

pub struct CardholderNameInput;

impl FieldInput for CardholderNameInput {
    fn key(&self) -> FieldKey {
        FieldKey::CardholderName
    }

    fn construct_element(&self, options: &FieldOptions) -> InputElement {
        element(self.key(), options, "cc-name", false, validators::CARDHOLDER_NAME_MAX_LENGTH)
    }

    fn render(&self, value: &str, _form: &CardForm) -> String {
        value.to_string()
    }

    fn unformatted_value(&self, raw: &str, _form: &CardForm) -> String {
        raw.to_string()
    }
}

/// The input variant for `key`.
pub fn input_for(key: FieldKey) -> Box<dyn FieldInput> {
    match key {
        FieldKey::Number => Box::new(NumberInput),
        FieldKey::Cvv => Box::new(CvvInput),
        FieldKey::ExpirationDate => Box::new(ExpirationDateInput),
        FieldKey::ExpirationMonth => Box::new(ExpirationMonthInput),
        FieldKey::ExpirationYear => Box::new(ExpirationYearInput),
        FieldKey::PostalCode => Box::new(PostalCodeInput),
        FieldKey::CardholderName => Box::new(CardholderNameInput),
    }
}
