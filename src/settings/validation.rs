//! Field-level validation for settings writes.
//!
//! # Responsibilities
//! - Check each field class (prices, fuel rate, tax percentage, email, flag)
//! - Offer a corrected value where one can be derived
//! - Aggregate results over a partial update
//!
//! # Design Decisions
//! - Pure functions: no I/O, never touches the cache
//! - Numeric input must match `^[0-9]+(\.[0-9]+)?$` before it is parsed, so
//!   malformed input never reaches a range comparison
//! - Returns every field error, not just the first
//! - Precision suggestions round half-up on the decimal digits of the input

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::settings::types::{FieldKind, SettingValue, SettingsField, SettingsPatch};

static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("decimal pattern is valid"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// Maximum email length (RFC 5321 path limit).
const MAX_EMAIL_LENGTH: usize = 254;

/// Outcome of validating a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldCheck {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl FieldCheck {
    fn ok() -> Self {
        Self {
            is_valid: true,
            error: None,
            suggestion: None,
        }
    }

    fn fail(error: String) -> Self {
        Self {
            is_valid: false,
            error: Some(error),
            suggestion: None,
        }
    }

    fn suggest(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }
}

/// A corrected value proposed for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSuggestion {
    pub field: SettingsField,
    pub value: String,
}

/// Aggregate outcome of validating a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub field_errors: BTreeMap<SettingsField, String>,
    pub suggestions: Vec<FieldSuggestion>,
}

impl ValidationReport {
    /// Report carrying one field error.
    pub fn single(field: SettingsField, message: String) -> Self {
        let mut report = Self {
            is_valid: true,
            ..Default::default()
        };
        report.record(field, FieldCheck::fail(message));
        report
    }

    fn record(&mut self, field: SettingsField, check: FieldCheck) {
        if let Some(suggestion) = check.suggestion {
            self.suggestions.push(FieldSuggestion {
                field,
                value: suggestion,
            });
        }
        if let Some(error) = check.error {
            self.is_valid = false;
            self.errors.push(error.clone());
            self.field_errors.insert(field, error);
        }
    }

    pub fn error_for(&self, field: SettingsField) -> Option<&str> {
        self.field_errors.get(&field).map(String::as_str)
    }

    pub fn suggestion_for(&self, field: SettingsField) -> Option<&str> {
        self.suggestions
            .iter()
            .find(|s| s.field == field)
            .map(|s| s.value.as_str())
    }
}

/// Bounds and precision of a decimal field.
struct DecimalRule {
    places: usize,
    min: f64,
    max: f64,
}

const PRICE_RULE: DecimalRule = DecimalRule {
    places: 2,
    min: 0.01,
    max: 999_999.99,
};

const FUEL_RATE_RULE: DecimalRule = DecimalRule {
    places: 3,
    min: 0.001,
    max: 9_999.999,
};

const PERCENTAGE_RULE: DecimalRule = DecimalRule {
    places: 2,
    min: 0.0,
    max: 100.0,
};

/// Round a plain decimal string (`^[0-9]+(\.[0-9]+)?$`) half-up to
/// `places` fraction digits. Works on the digits; no float is involved.
fn round_half_up(raw: &str, places: usize) -> String {
    let (int, frac) = raw.split_once('.').unwrap_or((raw, ""));
    if frac.len() <= places {
        return match places {
            0 => int.to_string(),
            _ => format!("{}.{:0<width$}", int, frac, width = places),
        };
    }

    let mut digits: Vec<u8> = int.bytes().chain(frac[..places].bytes()).collect();
    if frac.as_bytes()[places] >= b'5' {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }

    let (int, frac) = digits.split_at(digits.len() - places);
    let int: String = int.iter().map(|&d| d as char).collect();
    let frac: String = frac.iter().map(|&d| d as char).collect();
    match places {
        0 => int,
        _ => format!("{}.{}", int, frac),
    }
}

fn validate_decimal(label: &str, raw: &str, rule: &DecimalRule) -> FieldCheck {
    if raw.trim().is_empty() {
        return FieldCheck::fail(format!("{} is required", label));
    }

    if !DECIMAL_RE.is_match(raw) {
        let trimmed = raw.trim();
        let check = FieldCheck::fail(format!("{} must be a valid number", label));
        return if DECIMAL_RE.is_match(trimmed) {
            check.suggest(trimmed.to_string())
        } else {
            check
        };
    }

    let value: f64 = match raw.parse() {
        Ok(v) => v,
        Err(_) => return FieldCheck::fail(format!("{} must be a valid number", label)),
    };
    let p = rule.places;

    let decimals = raw.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0);
    if decimals > p {
        let rounded = round_half_up(raw, p);
        let suggestion = match rounded.parse::<f64>() {
            Ok(v) if v < rule.min => format!("{:.*}", p, rule.min),
            Ok(v) if v > rule.max => format!("{:.*}", p, rule.max),
            _ => rounded,
        };
        return FieldCheck::fail(format!(
            "{} must have at most {} decimal places",
            label, p
        ))
        .suggest(suggestion);
    }

    if value < rule.min {
        return FieldCheck::fail(format!("{} must be at least {:.*}", label, p, rule.min))
            .suggest(format!("{:.*}", p, rule.min));
    }
    if value > rule.max {
        return FieldCheck::fail(format!("{} must not exceed {:.*}", label, p, rule.max))
            .suggest(format!("{:.*}", p, rule.max));
    }

    FieldCheck::ok()
}

/// Validate one of the four currency fields.
pub fn validate_price(field: SettingsField, raw: &str) -> FieldCheck {
    validate_decimal(field.label(), raw, &PRICE_RULE)
}

/// Validate `cost_per_kilometer_fuel`.
pub fn validate_fuel_rate(raw: &str) -> FieldCheck {
    validate_decimal(
        SettingsField::CostPerKilometerFuel.label(),
        raw,
        &FUEL_RATE_RULE,
    )
}

/// Validate `tax_percentage`.
pub fn validate_tax_percentage(raw: &str) -> FieldCheck {
    validate_decimal(SettingsField::TaxPercentage.label(), raw, &PERCENTAGE_RULE)
}

/// Validate `forward_certificate_emails_to`.
pub fn validate_email(raw: &str) -> FieldCheck {
    let label = SettingsField::ForwardCertificateEmailsTo.label();
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return FieldCheck::fail(format!("{} is required", label));
    }
    if trimmed != raw {
        let check = FieldCheck::fail(format!("{} must not contain surrounding spaces", label));
        return if validate_email(trimmed).is_valid {
            check.suggest(trimmed.to_string())
        } else {
            check
        };
    }
    if raw.len() > MAX_EMAIL_LENGTH {
        return FieldCheck::fail(format!(
            "{} must be at most {} characters",
            label, MAX_EMAIL_LENGTH
        ));
    }

    let local = raw.split('@').next().unwrap_or_default();
    if raw.starts_with('.')
        || raw.ends_with('.')
        || raw.contains("..")
        || local.ends_with('.')
        || raw.contains("@.")
    {
        return FieldCheck::fail(format!(
            "{} must not contain leading, trailing or consecutive dots",
            label
        ));
    }

    if !EMAIL_RE.is_match(raw) {
        return FieldCheck::fail(format!("{} must be a valid email address", label));
    }

    FieldCheck::ok()
}

/// Interpret boolean-like text.
pub fn coerce_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Validate `send_emails_to_self`.
pub fn validate_flag(value: &SettingValue) -> FieldCheck {
    match value {
        SettingValue::Flag(_) => FieldCheck::ok(),
        SettingValue::Text(s) => match coerce_bool(s) {
            Some(_) => FieldCheck::ok(),
            None => FieldCheck::fail(format!(
                "{} must be true or false",
                SettingsField::SendEmailsToSelf.label()
            )),
        },
    }
}

/// Validate a single field value, dispatching on its class.
pub fn validate_field(field: SettingsField, value: &SettingValue) -> FieldCheck {
    let raw = match (field.kind(), value) {
        (FieldKind::Flag, value) => return validate_flag(value),
        (FieldKind::Email, SettingValue::Flag(_)) => {
            return FieldCheck::fail(format!("{} must be a valid email address", field.label()))
        }
        (_, SettingValue::Flag(_)) => {
            return FieldCheck::fail(format!("{} must be a valid number", field.label()))
        }
        (_, SettingValue::Text(raw)) => raw.as_str(),
    };

    match field.kind() {
        FieldKind::Price => validate_price(field, raw),
        FieldKind::FuelRate => validate_fuel_rate(raw),
        FieldKind::Percentage => validate_tax_percentage(raw),
        FieldKind::Email => validate_email(raw),
        FieldKind::Flag => validate_flag(value),
    }
}

/// Validate every field of a partial update.
pub fn validate_patch(patch: &SettingsPatch) -> ValidationReport {
    let mut report = ValidationReport {
        is_valid: true,
        ..Default::default()
    };

    if patch.is_empty() {
        report.is_valid = false;
        report.errors.push("No settings to update".to_string());
        return report;
    }

    for (field, value) in patch.iter() {
        report.record(*field, validate_field(*field, value));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_accepts_valid_amounts() {
        for raw in ["0.01", "110.00", "125.5", "999999.99", "42"] {
            let check = validate_price(SettingsField::CostPerBag, raw);
            assert!(check.is_valid, "{} should be valid", raw);
        }
    }

    #[test]
    fn test_price_rejects_malformed_input_before_range() {
        for raw in ["abc", "-1.00", "1e3", "NaN", "1.2.3", ".5", "5."] {
            let check = validate_price(SettingsField::CostPerBag, raw);
            assert!(!check.is_valid, "{} should be rejected", raw);
            assert_eq!(
                check.error.as_deref(),
                Some("Cost per bag must be a valid number")
            );
        }
    }

    #[test]
    fn test_price_range() {
        let check = validate_price(SettingsField::CallOutFee, "0.00");
        assert_eq!(check.error.as_deref(), Some("Call-out fee must be at least 0.01"));
        assert_eq!(check.suggestion.as_deref(), Some("0.01"));

        let check = validate_price(SettingsField::CallOutFee, "1000000.00");
        assert_eq!(
            check.error.as_deref(),
            Some("Call-out fee must not exceed 999999.99")
        );
    }

    #[test]
    fn test_required() {
        let check = validate_price(SettingsField::CostPerCertificate, "  ");
        assert_eq!(
            check.error.as_deref(),
            Some("Cost per certificate is required")
        );
        assert!(!validate_email("").is_valid);
    }

    #[test]
    fn test_whitespace_gets_trimmed_suggestion() {
        let check = validate_price(SettingsField::CostPerBag, " 12.50 ");
        assert!(!check.is_valid);
        assert_eq!(check.suggestion.as_deref(), Some("12.50"));
    }

    #[test]
    fn test_tax_percentage_upper_bound() {
        let check = validate_tax_percentage("150.00");
        assert!(!check.is_valid);
        assert!(check.error.unwrap().contains("must not exceed 100.00"));

        assert!(validate_tax_percentage("0.00").is_valid);
        assert!(validate_tax_percentage("100.00").is_valid);
    }

    #[test]
    fn test_fuel_rate_precision_suggestion() {
        let check = validate_fuel_rate("1.7500");
        assert!(!check.is_valid);
        assert_eq!(check.suggestion.as_deref(), Some("1.750"));

        assert!(validate_fuel_rate("1.750").is_valid);
        assert!(!validate_fuel_rate("0.000").is_valid);
        assert!(!validate_fuel_rate("10000.000").is_valid);
    }

    #[test]
    fn test_precision_suggestion_rounds_half_up_on_digits() {
        for (raw, expected) in [
            ("0.125", "0.13"),
            ("1.005", "1.01"),
            ("2.675", "2.68"),
            ("12.345", "12.35"),
            ("12.3449", "12.34"),
            ("110.004999", "110.00"),
            ("9.995", "10.00"),
            ("99.999", "100.00"),
        ] {
            let check = validate_price(SettingsField::CostPerBag, raw);
            assert!(!check.is_valid, "{} should be rejected", raw);
            assert_eq!(check.suggestion.as_deref(), Some(expected), "{}", raw);
        }

        assert_eq!(validate_fuel_rate("1.0005").suggestion.as_deref(), Some("1.001"));
        assert_eq!(validate_fuel_rate("1.00049").suggestion.as_deref(), Some("1.000"));
    }

    #[test]
    fn test_precision_suggestion_stays_in_range() {
        let check = validate_price(SettingsField::CostPerBag, "0.004");
        assert_eq!(check.suggestion.as_deref(), Some("0.01"));

        let check = validate_price(SettingsField::CostPerBag, "999999.995");
        assert_eq!(check.suggestion.as_deref(), Some("999999.99"));

        let check = validate_tax_percentage("100.005");
        assert_eq!(check.suggestion.as_deref(), Some("100.00"));

        let check = validate_tax_percentage("99.995");
        assert_eq!(check.suggestion.as_deref(), Some("100.00"));
    }

    #[test]
    fn test_round_half_up_carries_and_pads() {
        assert_eq!(round_half_up("999.995", 2), "1000.00");
        assert_eq!(round_half_up("0.5", 0), "1");
        assert_eq!(round_half_up("42", 2), "42.00");
        assert_eq!(round_half_up("1.7", 3), "1.700");
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("certs@forensics.example.org").is_valid);
        assert!(validate_email("first.last+tag@lab.gov.za").is_valid);

        for raw in [
            "not-an-email",
            ".lead@example.org",
            "trail.@example.org",
            "double..dot@example.org",
            "user@example..org",
            "user@example.org.",
            "user@.example.org",
            "user@example",
        ] {
            assert!(!validate_email(raw).is_valid, "{} should be rejected", raw);
        }

        let long = format!("{}@example.org", "a".repeat(250));
        let check = validate_email(&long);
        assert_eq!(
            check.error.as_deref(),
            Some("Forward certificate emails to must be at most 254 characters")
        );

        let check = validate_email(" certs@example.org ");
        assert_eq!(check.suggestion.as_deref(), Some("certs@example.org"));
    }

    #[test]
    fn test_flag_coercion() {
        for raw in ["true", "FALSE", "1", "0", "yes", "No", "on", "off"] {
            assert!(validate_flag(&SettingValue::from(raw)).is_valid, "{}", raw);
        }
        assert!(validate_flag(&SettingValue::Flag(true)).is_valid);
        assert!(!validate_flag(&SettingValue::from("maybe")).is_valid);
        assert_eq!(coerce_bool("On"), Some(true));
        assert_eq!(coerce_bool("2"), None);
    }

    #[test]
    fn test_validate_patch_collects_all_errors() {
        let patch = SettingsPatch::new()
            .with(SettingsField::TaxPercentage, "150.00")
            .with(SettingsField::CostPerKilometerFuel, "1.7500")
            .with(SettingsField::CostPerBag, "15.00");

        let report = validate_patch(&patch);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 2);
        assert!(report.error_for(SettingsField::TaxPercentage).is_some());
        assert!(report.error_for(SettingsField::CostPerBag).is_none());
        assert_eq!(
            report.suggestion_for(SettingsField::CostPerKilometerFuel),
            Some("1.750")
        );
    }

    #[test]
    fn test_validate_patch_wrong_shape_and_empty() {
        let patch = SettingsPatch::new().with(SettingsField::CostPerBag, true);
        let report = validate_patch(&patch);
        assert_eq!(
            report.error_for(SettingsField::CostPerBag),
            Some("Cost per bag must be a valid number")
        );

        let report = validate_patch(&SettingsPatch::new());
        assert!(!report.is_valid);
        assert_eq!(report.errors, vec!["No settings to update".to_string()]);
    }
}
