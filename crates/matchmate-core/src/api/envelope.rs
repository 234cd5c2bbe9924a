//! The `{success, message?, data?, errors?}` wrapper every endpoint answers with.

use std::collections::BTreeMap;
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::transport::Response;
use super::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode a response, turning non-2xx statuses into [`ApiError`].
    pub fn from_response(response: Response) -> Result<Self, ApiError> {
        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }
        serde_json::from_str(&response.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

impl<T> Envelope<T> {
    /// Best human-readable line for this envelope.
    pub fn summary(&self) -> String {
        if let Some(ref message) = self.message {
            return message.clone();
        }
        self.errors
            .as_ref()
            .and_then(|errors| errors.first())
            .map(|(field, message)| format!("{}: {}", field, message))
            .unwrap_or_else(|| "Request failed".to_string())
    }
}

/// Field name → messages. Servers sometimes send a bare string for a field
/// instead of a list; both shapes decode to a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Messages>")]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

#[derive(Deserialize)]
#[serde(untagged)]
enum Messages {
    One(String),
    Many(Vec<String>),
}

impl From<BTreeMap<String, Messages>> for FieldErrors {
    fn from(raw: BTreeMap<String, Messages>) -> Self {
        Self(
            raw.into_iter()
                .map(|(field, messages)| match messages {
                    Messages::One(message) => (field, vec![message]),
                    Messages::Many(messages) => (field, messages),
                })
                .collect(),
        )
    }
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn first(&self) -> Option<(&str, &str)> {
        self.0
            .iter()
            .find_map(|(field, messages)| messages.first().map(|m| (field.as_str(), m.as_str())))
    }

    /// `Ok(())` when empty, otherwise a validation error carrying these fields.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}
