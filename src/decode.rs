//! Turning an HTTP request into the input of a procedure.
//!
//! Query values (and the body of a form request) are collected into [`FormValues`]. A JSON body
//! is then merged on top: an object overrides field by field while any other JSON value replaces
//! the input entirely. The result is a [`RawInput`] which deserializes into the procedure's input
//! type.

use std::collections::{btree_map, BTreeMap};

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, request::Parts},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::DecodeError;

mod de;

const APPLICATION_JSON: &str = "application/json";
const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";

/// Values decoded from a query string or form body, in the order they appeared.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormValues(BTreeMap<String, Vec<String>>);

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Decode `application/x-www-form-urlencoded` data into `target`.
///
/// Repeated keys accumulate, so values already in `target` come first.
pub fn decode_form_values(input: &[u8], target: &mut FormValues) {
    for (key, value) in form_urlencoded::parse(input) {
        target
            .0
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
}

/// One top level field of a [`RawInput`].
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Decoded leniently, `"1"` is a valid number.
    Form(Vec<String>),
    /// Decoded as JSON.
    Json(Value),
}

/// The merged request values, not yet deserialized.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Fields(BTreeMap<String, Field>),
    Json(Value),
}

impl From<FormValues> for RawInput {
    fn from(values: FormValues) -> Self {
        RawInput::Fields(
            values
                .0
                .into_iter()
                .map(|(key, values)| (key, Field::Form(values)))
                .collect(),
        )
    }
}

impl RawInput {
    /// Merge a JSON body on top of the existing values.
    ///
    /// An object overrides fields by key. Any other value, or any value merged onto
    /// [`RawInput::Json`], replaces the input.
    pub fn merge_json(self, value: Value) -> Self {
        match (self, value) {
            (RawInput::Fields(mut fields), Value::Object(object)) => {
                fields.extend(object.into_iter().map(|(key, value)| (key, Field::Json(value))));
                RawInput::Fields(fields)
            }
            (_, value) => RawInput::Json(value),
        }
    }

    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            RawInput::Fields(fields) => T::deserialize(de::FieldsDeserializer(fields)),
            RawInput::Json(value) => serde_json::from_value(value),
        }
    }
}

/// Collect the query, form body and JSON body of a request into a [`RawInput`].
///
/// Bodies larger than `limit` bytes are rejected.
pub async fn decode_request(
    parts: &Parts,
    body: Body,
    limit: usize,
) -> Result<RawInput, DecodeError> {
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();

    let mut values = FormValues::new();
    let json = match media_type(&content_type).as_str() {
        APPLICATION_JSON => {
            let body = axum::body::to_bytes(body, limit)
                .await
                .map_err(DecodeError::Body)?;
            Some(serde_json::from_slice::<Value>(&body).map_err(DecodeError::Json)?)
        }
        APPLICATION_FORM => {
            let body = axum::body::to_bytes(body, limit)
                .await
                .map_err(DecodeError::Body)?;
            decode_form_values(&body, &mut values);
            None
        }
        "" => None,
        _ => return Err(DecodeError::UnsupportedContentType(content_type)),
    };

    if let Some(query) = parts.uri.query() {
        decode_form_values(query.as_bytes(), &mut values);
    }

    let input = RawInput::from(values);
    Ok(match json {
        Some(json) => input.merge_json(json),
        None => input,
    })
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
