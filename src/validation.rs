//! Input validation driven by the resource schemas.
//!
//! Validation never stops at the first problem: every violated field is
//! reported so a form can show all of them at once.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;
use validator::{ValidateEmail, ValidateUrl};

use crate::{
    error::FieldError,
    schema::{Document, Fallback, FieldKind, FieldSpec, FieldValue, ResourceSpec},
};

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("slug pattern compiles"));

/// Minimum length of slugs and other key-like identifiers.
const SLUG_MIN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Required fields must be present; omitted fields take their fallback.
    Create,
    /// Every field is optional; only supplied fields are checked and returned.
    Partial,
}

/// Validate an untrusted JSON body against `spec`.
///
/// Unknown and server-maintained fields are dropped. In [`Mode::Partial`] the
/// returned document holds only the supplied fields, so an empty body yields
/// an empty document.
pub fn validate(
    spec: &ResourceSpec,
    input: &Value,
    mode: Mode,
) -> Result<Document, Vec<FieldError>> {
    let Some(object) = input.as_object() else {
        return Err(vec![FieldError::new("body", "Expected a JSON object")]);
    };

    let mut document = Document::new();
    let mut errors = Vec::new();

    for field in spec.fields {
        if !field.writable || (mode == Mode::Create && field.update_only) {
            if mode == Mode::Create {
                if let Some(fallback) = field.fallback {
                    document.insert(field.name, fallback_value(fallback));
                }
            }
            continue;
        }

        let supplied = object.get(field.name);
        let value = match supplied {
            Some(value) if !is_blank(field, value) => value,
            // Explicit null (or "" for URLs) clears an optional field. Fields
            // with a fallback always hold a value.
            Some(_) if mode == Mode::Partial => {
                if field.required {
                    errors.push(FieldError::new(field.name, format!("{} is required", field.name)));
                } else if field.fallback.is_some() {
                    errors.push(FieldError::new(
                        field.name,
                        format!("{} cannot be null", field.name),
                    ));
                } else {
                    document.insert(field.name, FieldValue::Null);
                }
                continue;
            }
            _ => {
                if mode == Mode::Create {
                    if field.required {
                        errors.push(FieldError::new(
                            field.name,
                            format!("{} is required", field.name),
                        ));
                    } else if let Some(fallback) = field.fallback {
                        document.insert(field.name, fallback_value(fallback));
                    }
                }
                continue;
            }
        };

        match check(field, value) {
            Ok(parsed) => {
                document.insert(field.name, parsed);
            }
            Err(message) => errors.push(FieldError::new(field.name, message)),
        }
    }

    if errors.is_empty() {
        Ok(document)
    } else {
        Err(errors)
    }
}

fn is_blank(field: &FieldSpec, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => matches!(field.kind, FieldKind::Url) && s.is_empty(),
        _ => false,
    }
}

pub fn fallback_value(fallback: Fallback) -> FieldValue {
    match fallback {
        Fallback::Text(text) => FieldValue::Text(text.to_string()),
        Fallback::Integer(n) => FieldValue::Integer(n),
        Fallback::Flag(b) => FieldValue::Flag(b),
        Fallback::EmptyList => FieldValue::List(Vec::new()),
    }
}

/// Check a single present, non-null value.
pub fn check(field: &FieldSpec, value: &Value) -> Result<FieldValue, String> {
    let name = field.name;
    match field.kind {
        FieldKind::Text { min } => {
            let text = expect_text(name, value)?;
            if text.chars().count() < min {
                return Err(format!("{name} must be at least {min} characters"));
            }
            Ok(FieldValue::Text(text))
        }
        FieldKind::Email => {
            let text = expect_text(name, value)?;
            if !text.validate_email() {
                return Err(format!("{name} must be a valid email address"));
            }
            Ok(FieldValue::Text(text))
        }
        FieldKind::Url => {
            let text = expect_text(name, value)?;
            if !text.validate_url() {
                return Err(format!("{name} must be a valid URL"));
            }
            Ok(FieldValue::Text(text))
        }
        FieldKind::Slug => {
            let text = expect_text(name, value)?;
            if text.chars().count() < SLUG_MIN {
                return Err(format!("{name} must be at least {SLUG_MIN} characters"));
            }
            if !SLUG.is_match(&text) {
                return Err(format!(
                    "{name} may only contain lowercase letters, digits and hyphens"
                ));
            }
            Ok(FieldValue::Text(text))
        }
        FieldKind::Choice(options) => {
            let text = expect_text(name, value)?;
            if !options.contains(&text.as_str()) {
                return Err(format!("{name} must be one of: {}", options.join(", ")));
            }
            Ok(FieldValue::Text(text))
        }
        FieldKind::Integer { min, max } => {
            let n = value
                .as_i64()
                .ok_or_else(|| format!("{name} must be an integer"))?;
            match (min, max) {
                (Some(lo), Some(hi)) if n < lo || n > hi => {
                    Err(format!("{name} must be between {lo} and {hi}"))
                }
                (Some(lo), None) if n < lo => Err(format!("{name} must be at least {lo}")),
                (None, Some(hi)) if n > hi => Err(format!("{name} must be at most {hi}")),
                _ => Ok(FieldValue::Integer(n)),
            }
        }
        FieldKind::Decimal => value
            .as_f64()
            .map(FieldValue::Decimal)
            .ok_or_else(|| format!("{name} must be a number")),
        FieldKind::Flag => value
            .as_bool()
            .map(FieldValue::Flag)
            .ok_or_else(|| format!("{name} must be true or false")),
        FieldKind::List { min } => {
            let items = value
                .as_array()
                .ok_or_else(|| format!("{name} must be a list of strings"))?;
            let strings = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| format!("{name} must be a list of strings"))?;
            if strings.len() < min {
                return Err(format!("{name} must contain at least {min} item(s)"));
            }
            Ok(FieldValue::List(strings))
        }
        FieldKind::Timestamp => {
            let text = expect_text(name, value)?;
            parse_timestamp(&text)
                .map(FieldValue::Timestamp)
                .ok_or_else(|| format!("{name} must be a date (YYYY-MM-DD) or RFC 3339 timestamp"))
        }
        FieldKind::Reference { .. } => {
            let text = expect_text(name, value)?;
            Uuid::parse_str(&text)
                .map(FieldValue::Reference)
                .map_err(|_| format!("{name} must be a valid identifier"))
        }
    }
}

fn expect_text(name: &str, value: &Value) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("{name} must be a string"))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

/// Boolean query parameters accept exactly `true` and `false`.
pub fn parse_flag(name: &str, raw: &str) -> Result<bool, String> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("{name} must be true or false")),
    }
}

/// Interpret a query-string value as a condition operand for `field`.
///
/// `null` selects records where an optional reference is unset (root
/// categories, top-level menu items).
pub fn coerce_param(field: &FieldSpec, raw: &str) -> Result<FieldValue, String> {
    let name = field.name;
    match field.kind {
        FieldKind::Flag => parse_flag(name, raw).map(FieldValue::Flag),
        FieldKind::Integer { .. } => raw
            .parse()
            .map(FieldValue::Integer)
            .map_err(|_| format!("{name} must be an integer")),
        FieldKind::Decimal => raw
            .parse()
            .map(FieldValue::Decimal)
            .map_err(|_| format!("{name} must be a number")),
        FieldKind::Reference { .. } if raw == "null" => Ok(FieldValue::Null),
        FieldKind::Reference { .. } => Uuid::parse_str(raw)
            .map(FieldValue::Reference)
            .map_err(|_| format!("{name} must be a valid identifier")),
        FieldKind::Timestamp => parse_timestamp(raw)
            .map(FieldValue::Timestamp)
            .ok_or_else(|| format!("{name} must be a date")),
        FieldKind::List { .. } => Err(format!("{name} cannot be filtered")),
        FieldKind::Text { .. }
        | FieldKind::Email
        | FieldKind::Url
        | FieldKind::Slug
        | FieldKind::Choice(_) => Ok(FieldValue::Text(raw.to_string())),
    }
}
