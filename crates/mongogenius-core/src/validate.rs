use crate::error::{FieldViolation, ValidationError};

/// Shortest accepted input. An interface guard, not a domain rule; the
/// `minFieldLength` setting overrides it.
pub const DEFAULT_MIN_FIELD_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub min_len: usize,
    /// Shown to the user when the field is rejected.
    pub message: &'static str,
}

impl FieldRule {
    pub const fn new(name: &'static str, message: &'static str) -> Self {
        Self {
            name,
            min_len: DEFAULT_MIN_FIELD_LENGTH,
            message,
        }
    }

    pub const fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }
}

/// Check every rule against `fields` and collect all violations.
///
/// Length is counted in UTF-16 code units of the raw text, whitespace
/// included, the way browser form validation measures it. A field with no
/// entry in `fields` is rejected like an empty one.
pub fn validate_fields(fields: &[(&str, &str)], rules: &[FieldRule]) -> Result<(), ValidationError> {
    let violations: Vec<FieldViolation> = rules
        .iter()
        .filter(|rule| {
            let value = fields
                .iter()
                .find(|(name, _)| *name == rule.name)
                .map(|(_, v)| *v)
                .unwrap_or("");
            value.is_empty() || value.encode_utf16().count() < rule.min_len
        })
        .map(|rule| FieldViolation {
            field: rule.name.to_string(),
            message: rule.message.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}
