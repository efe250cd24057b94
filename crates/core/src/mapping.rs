use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A fixed logical column the processing backend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    TransactionId,
    Amount,
    ReferenceNumber,
    Date,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 4] = [
        CanonicalField::TransactionId,
        CanonicalField::Amount,
        CanonicalField::ReferenceNumber,
        CanonicalField::Date,
    ];

    pub const REQUIRED: [CanonicalField; 2] =
        [CanonicalField::TransactionId, CanonicalField::Amount];

    /// Wire key used in the serialized mapping.
    pub fn key(self) -> &'static str {
        match self {
            CanonicalField::TransactionId => "transactionId",
            CanonicalField::Amount => "amount",
            CanonicalField::ReferenceNumber => "referenceNumber",
            CanonicalField::Date => "date",
        }
    }

    /// Human-facing label.
    pub fn label(self) -> &'static str {
        match self {
            CanonicalField::TransactionId => "Transaction ID",
            CanonicalField::Amount => "Amount",
            CanonicalField::ReferenceNumber => "Reference Number",
            CanonicalField::Date => "Date",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanonicalField::ALL
            .into_iter()
            .find(|f| f.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown field: '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Please map the following required columns: {}", labels(.missing))]
pub struct ValidationError {
    pub missing: Vec<CanonicalField>,
}

fn labels(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Canonical field -> selected source header.
///
/// Serializes to a JSON object keyed by wire key holding only the set fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl ColumnMapping {
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Returns whether the stored value changed.
    pub fn set(&mut self, field: CanonicalField, header: Option<String>) -> bool {
        let slot = self.slot_mut(field);
        if *slot == header {
            return false;
        }
        *slot = header;
        true
    }

    pub fn is_satisfied(&self, field: CanonicalField) -> bool {
        self.get(field).is_some_and(|h| !h.trim().is_empty())
    }

    pub fn is_valid(&self) -> bool {
        CanonicalField::REQUIRED
            .iter()
            .all(|f| self.is_satisfied(*f))
    }

    pub fn missing_required_fields(&self) -> Vec<CanonicalField> {
        CanonicalField::REQUIRED
            .into_iter()
            .filter(|f| !self.is_satisfied(*f))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing = self.missing_required_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing })
        }
    }

    /// Unset every field whose header fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        for field in CanonicalField::ALL {
            let slot = self.slot_mut(field);
            if slot.as_deref().is_some_and(|h| !keep(h)) {
                *slot = None;
            }
        }
    }

    /// Wire form sent as the `columnMapping` form field.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn slot(&self, field: CanonicalField) -> &Option<String> {
        match field {
            CanonicalField::TransactionId => &self.transaction_id,
            CanonicalField::Amount => &self.amount,
            CanonicalField::ReferenceNumber => &self.reference_number,
            CanonicalField::Date => &self.date,
        }
    }

    fn slot_mut(&mut self, field: CanonicalField) -> &mut Option<String> {
        match field {
            CanonicalField::TransactionId => &mut self.transaction_id,
            CanonicalField::Amount => &mut self.amount,
            CanonicalField::ReferenceNumber => &mut self.reference_number,
            CanonicalField::Date => &mut self.date,
        }
    }
}
