//! Settings document, field catalogue and snapshot types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::SettingsError;
use crate::settings::validation::{coerce_bool, ValidationReport};

/// The writable settings fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingsField {
    CostPerCertificate,
    CostPerBag,
    CallOutFee,
    CostPerForensicHour,
    CostPerKilometerFuel,
    TaxPercentage,
    ForwardCertificateEmailsTo,
    SendEmailsToSelf,
}

/// Validation class of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Currency amount, 2 decimals.
    Price,
    /// Fuel rate per kilometer, 3 decimals.
    FuelRate,
    /// Percentage 0-100, 2 decimals.
    Percentage,
    Email,
    Flag,
}

impl SettingsField {
    pub const ALL: [SettingsField; 8] = [
        SettingsField::CostPerCertificate,
        SettingsField::CostPerBag,
        SettingsField::CallOutFee,
        SettingsField::CostPerForensicHour,
        SettingsField::CostPerKilometerFuel,
        SettingsField::TaxPercentage,
        SettingsField::ForwardCertificateEmailsTo,
        SettingsField::SendEmailsToSelf,
    ];

    /// Wire name used by the settings endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsField::CostPerCertificate => "cost_per_certificate",
            SettingsField::CostPerBag => "cost_per_bag",
            SettingsField::CallOutFee => "call_out_fee",
            SettingsField::CostPerForensicHour => "cost_per_forensic_hour",
            SettingsField::CostPerKilometerFuel => "cost_per_kilometer_fuel",
            SettingsField::TaxPercentage => "tax_percentage",
            SettingsField::ForwardCertificateEmailsTo => "forward_certificate_emails_to",
            SettingsField::SendEmailsToSelf => "send_emails_to_self",
        }
    }

    /// Human-readable label used in validation messages.
    pub fn label(&self) -> &'static str {
        match self {
            SettingsField::CostPerCertificate => "Cost per certificate",
            SettingsField::CostPerBag => "Cost per bag",
            SettingsField::CallOutFee => "Call-out fee",
            SettingsField::CostPerForensicHour => "Cost per forensic hour",
            SettingsField::CostPerKilometerFuel => "Fuel cost per kilometer",
            SettingsField::TaxPercentage => "Tax percentage",
            SettingsField::ForwardCertificateEmailsTo => "Forward certificate emails to",
            SettingsField::SendEmailsToSelf => "Send emails to self",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            SettingsField::CostPerCertificate
            | SettingsField::CostPerBag
            | SettingsField::CallOutFee
            | SettingsField::CostPerForensicHour => FieldKind::Price,
            SettingsField::CostPerKilometerFuel => FieldKind::FuelRate,
            SettingsField::TaxPercentage => FieldKind::Percentage,
            SettingsField::ForwardCertificateEmailsTo => FieldKind::Email,
            SettingsField::SendEmailsToSelf => FieldKind::Flag,
        }
    }
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a field name the settings endpoint does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown settings field '{0}'")]
pub struct UnknownField(pub String);

impl FromStr for SettingsField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingsField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

impl Serialize for SettingsField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SettingsField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

/// A single setting value as entered or stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Text(String),
}

impl SettingValue {
    /// Convert a raw JSON value; numbers keep their textual form.
    fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(SettingValue::Flag(b)),
            Value::String(s) => Some(SettingValue::Text(s)),
            Value::Number(n) => Some(SettingValue::Text(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Flag(b) => write!(f, "{}", b),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::Text(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        SettingValue::Text(s)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        SettingValue::Flag(b)
    }
}

/// Full settings document as returned by the settings endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(deserialize_with = "decimal_string")]
    pub cost_per_certificate: String,
    #[serde(deserialize_with = "decimal_string")]
    pub cost_per_bag: String,
    #[serde(deserialize_with = "decimal_string")]
    pub call_out_fee: String,
    #[serde(deserialize_with = "decimal_string")]
    pub cost_per_forensic_hour: String,
    #[serde(deserialize_with = "decimal_string")]
    pub cost_per_kilometer_fuel: String,
    #[serde(deserialize_with = "decimal_string")]
    pub tax_percentage: String,
    pub forward_certificate_emails_to: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub send_emails_to_self: bool,

    /// Server-maintained revision, bumped on every accepted write.
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Audit user of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

fn decimal_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a decimal string, got {}",
            other
        ))),
    }
}

fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let coerced = match &value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => coerce_bool(s),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    };
    coerced.ok_or_else(|| de::Error::custom(format!("expected a boolean, got {}", value)))
}

impl Settings {
    /// Read one field as a [`SettingValue`].
    pub fn get(&self, field: SettingsField) -> SettingValue {
        match field {
            SettingsField::CostPerCertificate => self.cost_per_certificate.as_str().into(),
            SettingsField::CostPerBag => self.cost_per_bag.as_str().into(),
            SettingsField::CallOutFee => self.call_out_fee.as_str().into(),
            SettingsField::CostPerForensicHour => self.cost_per_forensic_hour.as_str().into(),
            SettingsField::CostPerKilometerFuel => self.cost_per_kilometer_fuel.as_str().into(),
            SettingsField::TaxPercentage => self.tax_percentage.as_str().into(),
            SettingsField::ForwardCertificateEmailsTo => {
                self.forward_certificate_emails_to.as_str().into()
            }
            SettingsField::SendEmailsToSelf => self.send_emails_to_self.into(),
        }
    }

    /// Return a copy with `patch` merged in. Values of the wrong shape for
    /// their field are rejected.
    pub fn apply(&self, patch: &SettingsPatch) -> Result<Settings, SettingsError> {
        let mut next = self.clone();
        for (field, value) in patch.iter() {
            let slot = match field {
                SettingsField::SendEmailsToSelf => {
                    next.send_emails_to_self = match value {
                        SettingValue::Flag(b) => *b,
                        SettingValue::Text(s) => coerce_bool(s).ok_or_else(|| {
                            shape_error(*field, "must be true or false")
                        })?,
                    };
                    continue;
                }
                SettingsField::CostPerCertificate => &mut next.cost_per_certificate,
                SettingsField::CostPerBag => &mut next.cost_per_bag,
                SettingsField::CallOutFee => &mut next.call_out_fee,
                SettingsField::CostPerForensicHour => &mut next.cost_per_forensic_hour,
                SettingsField::CostPerKilometerFuel => &mut next.cost_per_kilometer_fuel,
                SettingsField::TaxPercentage => &mut next.tax_percentage,
                SettingsField::ForwardCertificateEmailsTo => {
                    &mut next.forward_certificate_emails_to
                }
            };
            match value {
                SettingValue::Text(s) => *slot = s.clone(),
                SettingValue::Flag(_) => return Err(shape_error(*field, "must be a text value")),
            }
        }
        Ok(next)
    }

    /// Fields whose values differ between `self` and `other`, as
    /// `(field, self_value, other_value)`.
    pub fn diff(&self, other: &Settings) -> Vec<(SettingsField, SettingValue, SettingValue)> {
        SettingsField::ALL
            .into_iter()
            .filter_map(|field| {
                let before = self.get(field);
                let after = other.get(field);
                (before != after).then_some((field, before, after))
            })
            .collect()
    }
}

fn shape_error(field: SettingsField, message: &str) -> SettingsError {
    SettingsError::Validation(ValidationReport::single(
        field,
        format!("{} {}", field.label(), message),
    ))
}

/// A partial update: any subset of the writable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    values: BTreeMap<SettingsField, SettingValue>,
}

impl SettingsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, field: SettingsField, value: impl Into<SettingValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: SettingsField, value: impl Into<SettingValue>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: SettingsField) -> Option<&SettingValue> {
        self.values.get(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SettingsField, &SettingValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for SettingsPatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in &self.values {
            match (field.kind(), value) {
                // Normalise boolean-like input so the server always sees a bool.
                (FieldKind::Flag, SettingValue::Text(s)) => match coerce_bool(s) {
                    Some(b) => map.serialize_entry(field.as_str(), &b)?,
                    None => map.serialize_entry(field.as_str(), s)?,
                },
                _ => map.serialize_entry(field.as_str(), value)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SettingsPatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut patch = SettingsPatch::new();
        for (key, value) in raw {
            let field: SettingsField = key.parse().map_err(de::Error::custom)?;
            let value = SettingValue::from_json(value).ok_or_else(|| {
                de::Error::custom(format!("unsupported value for '{}'", field))
            })?;
            patch.insert(field, value);
        }
        Ok(patch)
    }
}

/// One immutable, versioned copy of the full settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationSnapshot {
    pub settings: Settings,
    /// Epoch milliseconds at which the underlying document was fetched.
    pub fetched_at: u64,
}

impl ConfigurationSnapshot {
    pub fn new(settings: Settings, fetched_at: u64) -> Self {
        Self {
            settings,
            fetched_at,
        }
    }

    pub fn version(&self) -> u64 {
        self.settings.version
    }

    /// Speculative successor: `patch` merged in, version bumped, freshness
    /// inherited from `self`.
    pub fn with_patch(&self, patch: &SettingsPatch) -> Result<Self, SettingsError> {
        let mut settings = self.settings.apply(patch)?;
        settings.version = self.settings.version + 1;
        Ok(Self {
            settings,
            fetched_at: self.fetched_at,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_settings() -> Settings {
    Settings {
        cost_per_certificate: "110.00".into(),
        cost_per_bag: "15.00".into(),
        call_out_fee: "250.00".into(),
        cost_per_forensic_hour: "95.00".into(),
        cost_per_kilometer_fuel: "1.750".into(),
        tax_percentage: "15.00".into(),
        forward_certificate_emails_to: "certs@forensics.example.org".into(),
        send_emails_to_self: false,
        version: 7,
        updated_at: None,
        updated_by: None,
    }
}
