//! Value formatting and validation.
//!
//! Storage keeps every active param value as a nullable string. The formatter
//! is the single place that turns those strings into typed [`ParamValue`]s and
//! back, validating incoming values against the declared [`ValueType`].

use chrono::NaiveDate;

use crate::value::{format_number, DATE_FORMAT};
use crate::{ParamValue, ValidationError, ValueType};

/// Converts between stored raw strings and typed values.
pub trait ValueFormatter: Send + Sync {
    /// Coerce a stored raw value into a typed value.
    fn format(&self, raw: Option<&str>, value_type: ValueType)
        -> Result<ParamValue, ValidationError>;

    /// Raw value stored for a freshly materialized param of this type.
    fn type_default(&self, value_type: ValueType) -> String;

    /// Validate a typed value against the declared type and render it for storage.
    ///
    /// `Null` renders as `None` for every type.
    fn render(
        &self,
        value: &ParamValue,
        value_type: ValueType,
    ) -> Result<Option<String>, ValidationError>;

    /// Validate and normalize a value: render it, then format the rendered string.
    fn normalize(
        &self,
        value: &ParamValue,
        value_type: ValueType,
    ) -> Result<(ParamValue, Option<String>), ValidationError> {
        let raw = self.render(value, value_type)?;
        let typed = self.format(raw.as_deref(), value_type)?;
        Ok((typed, raw))
    }
}

/// Formatter for the built-in `string`, `number`, `boolean` and `date` types.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl DefaultFormatter {
    pub fn new() -> Self {
        Self
    }

    fn parse_number(raw: &str) -> Result<f64, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(0.0);
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(ValidationError::InvalidValue {
                value_type: ValueType::Number,
                value: raw.to_string(),
                reason: "not a finite number".to_string(),
            }),
        }
    }

    fn parse_boolean(raw: &str) -> Result<bool, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ValidationError::InvalidValue {
                value_type: ValueType::Boolean,
                value: raw.to_string(),
                reason: "expected 0/1 or true/false".to_string(),
            }),
        }
    }

    fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(NaiveDate::default());
        }
        NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|e| {
            ValidationError::InvalidValue {
                value_type: ValueType::Date,
                value: raw.to_string(),
                reason: e.to_string(),
            }
        })
    }

    fn mismatch(expected: ValueType, value: &ParamValue) -> ValidationError {
        ValidationError::TypeMismatch {
            expected,
            got: value.kind().to_string(),
        }
    }
}

fn render_bool(b: bool) -> String {
    let raw = if b { "1" } else { "0" };
    raw.to_string()
}

impl ValueFormatter for DefaultFormatter {
    fn format(
        &self,
        raw: Option<&str>,
        value_type: ValueType,
    ) -> Result<ParamValue, ValidationError> {
        let Some(raw) = raw else {
            return Ok(ParamValue::Null);
        };
        match value_type {
            ValueType::String => Ok(ParamValue::String(raw.to_string())),
            ValueType::Number => Self::parse_number(raw).map(ParamValue::Number),
            ValueType::Boolean => Self::parse_boolean(raw).map(ParamValue::Boolean),
            ValueType::Date => Self::parse_date(raw).map(ParamValue::Date),
        }
    }

    fn type_default(&self, value_type: ValueType) -> String {
        match value_type {
            ValueType::String => String::new(),
            ValueType::Number | ValueType::Boolean => "0".to_string(),
            ValueType::Date => NaiveDate::default().format(DATE_FORMAT).to_string(),
        }
    }

    fn render(
        &self,
        value: &ParamValue,
        value_type: ValueType,
    ) -> Result<Option<String>, ValidationError> {
        if value.is_null() {
            return Ok(None);
        }
        let rendered = match (value_type, value) {
            // Strings accept any scalar
            (ValueType::String, ParamValue::Boolean(b)) => render_bool(*b),
            (ValueType::String, other) => other.to_string(),

            (ValueType::Number, ParamValue::Number(n)) if n.is_finite() => format_number(*n),
            (ValueType::Number, ParamValue::String(s)) => format_number(Self::parse_number(s)?),

            (ValueType::Boolean, ParamValue::Boolean(b)) => render_bool(*b),
            (ValueType::Boolean, ParamValue::Number(n)) if *n == 0.0 || *n == 1.0 => {
                render_bool(*n == 1.0)
            }
            (ValueType::Boolean, ParamValue::String(s)) => render_bool(Self::parse_boolean(s)?),

            (ValueType::Date, ParamValue::Date(d)) => d.format(DATE_FORMAT).to_string(),
            (ValueType::Date, ParamValue::String(s)) => {
                Self::parse_date(s)?.format(DATE_FORMAT).to_string()
            }

            (expected, other) => return Err(Self::mismatch(expected, other)),
        };
        Ok(Some(rendered))
    }
}
