// Request payloads and their validation. Everything here is pure; storage
// concerns such as uniqueness are left to the repositories.
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

use crate::error::FieldErrors;

pub const TITLE_MAX_CHARS: usize = 150;
pub const DEFAULT_TITLE: &str = "Some title";
pub const FIRST_NAME_MAX_CHARS: usize = 20;
pub const LAST_NAME_MAX_CHARS: usize = 35;
const PRICE_MAX_WHOLE_DIGITS: u32 = 9;
const PRICE_DECIMAL_PLACES: u32 = 2;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn too_long(max: usize) -> String {
    format!("Ensure this field has no more than {max} characters.")
}

// --- Ads ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAd {
    pub title: Option<String>,
    pub price: Option<Value>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdPatch {
    pub title: Option<String>,
    pub price: Option<Value>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdDraft {
    pub title: String,
    pub price_cents: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdChanges {
    pub title: Option<String>,
    pub price_cents: Option<i64>,
    pub description: Option<Option<String>>,
}

impl NewAd {
    pub fn validate(self) -> Result<AdDraft, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = self.title.map(|t| validate_title(&mut errors, &t));
        let price_cents = self.price.map(|p| validate_price(&mut errors, &p));
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(AdDraft {
            title: title.flatten().unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            price_cents: price_cents.flatten().unwrap_or(0),
            description: self.description,
        })
    }
}

impl AdPatch {
    pub fn validate(self) -> Result<AdChanges, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = self.title.and_then(|t| validate_title(&mut errors, &t));
        let price_cents = self.price.and_then(|p| validate_price(&mut errors, &p));
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(AdChanges {
            title,
            price_cents,
            description: self.description,
        })
    }
}

fn validate_title(errors: &mut FieldErrors, raw: &str) -> Option<String> {
    let title = raw.trim();
    if title.is_empty() {
        errors.add("title", BLANK);
        return None;
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        errors.add("title", too_long(TITLE_MAX_CHARS));
        return None;
    }
    Some(title.to_string())
}

/// Parses a JSON number or numeric string into whole cents.
pub fn validate_price(errors: &mut FieldErrors, raw: &Value) -> Option<i64> {
    let parsed = match raw {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string())),
        Value::String(s) => Decimal::from_str(s.trim()),
        _ => {
            errors.add("price", "A valid number is required.");
            return None;
        }
    };
    let Ok(price) = parsed.map(|p| p.normalize()) else {
        errors.add("price", "A valid number is required.");
        return None;
    };

    let mut problems = Vec::new();
    if price.is_sign_negative() && !price.is_zero() {
        problems.push("Ensure this value is greater than or equal to 0.".to_string());
    }
    if price.scale() > PRICE_DECIMAL_PLACES {
        problems.push(format!(
            "Ensure that there are no more than {PRICE_DECIMAL_PLACES} decimal places."
        ));
    }
    if price.trunc().abs() >= Decimal::from(10_i64.pow(PRICE_MAX_WHOLE_DIGITS)) {
        problems.push(format!(
            "Ensure that there are no more than {PRICE_MAX_WHOLE_DIGITS} digits \
             before the decimal point."
        ));
    }
    if !problems.is_empty() {
        for problem in problems {
            errors.add("price", problem);
        }
        return None;
    }

    (price * Decimal::ONE_HUNDRED).to_i64()
}

// --- Comments ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewComment {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentPatch {
    pub text: Option<String>,
}

impl NewComment {
    pub fn validate(self) -> Result<String, FieldErrors> {
        match self.text {
            None => Err(FieldErrors::single("text", REQUIRED)),
            Some(text) => validate_text(&text),
        }
    }
}

impl CommentPatch {
    pub fn validate(self) -> Result<Option<String>, FieldErrors> {
        self.text.map(|text| validate_text(&text)).transpose()
    }
}

fn validate_text(raw: &str) -> Result<String, FieldErrors> {
    let text = raw.trim();
    if text.is_empty() {
        Err(FieldErrors::single("text", BLANK))
    } else {
        Ok(text.to_string())
    }
}

// --- Users ---

/// Profile fields a user may change about themselves. PUT and PATCH both
/// apply only what was sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub phone: Option<Option<String>>,
}

impl ProfilePatch {
    pub fn validate(self) -> Result<ProfileChanges, FieldErrors> {
        let mut errors = FieldErrors::new();

        let email = self.email.map(|e| e.trim().to_string());
        if let Some(ref email) = email {
            if !is_valid_email(email) {
                errors.add("email", "Enter a valid email address.");
            }
        }

        let first_name = self
            .first_name
            .map(|name| optional_name(&mut errors, "first_name", name, FIRST_NAME_MAX_CHARS));
        let last_name = self
            .last_name
            .map(|name| optional_name(&mut errors, "last_name", name, LAST_NAME_MAX_CHARS));

        let phone = self.phone.map(|phone| {
            let phone = phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
            if let Some(ref number) = phone {
                if !is_valid_phone(number) {
                    errors.add("phone", "The phone number entered is not valid.");
                }
            }
            phone
        });

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(ProfileChanges {
            email,
            first_name,
            last_name,
            phone,
        })
    }
}

fn optional_name(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<String>,
    max: usize,
) -> Option<String> {
    let value = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(ref v) = value {
        if v.chars().count() > max {
            errors.add(field, too_long(max));
        }
    }
    value
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// International format: a `+` followed by 10 to 15 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    phone
        .strip_prefix('+')
        .map(|digits| {
            (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false)
}
