//! Structured text forms (`text_form` events).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::cart::json_type_name;

/// Named form keys and the label used when the producer omits one.
const NAMED_FIELDS: [(&str, &str); 5] = [
    ("address", "Address"),
    ("budget", "Budget"),
    ("date", "Date"),
    ("duration", "Duration (days)"),
    ("numberOfAttendees", "Number of attendees"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    #[serde(default)]
    pub label: String,
    /// Prefilled value; empty when the producer knows nothing yet.
    #[serde(default)]
    pub content: String,
}

impl TextField {
    pub fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

/// A full form snapshot, fields in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextForm {
    pub fields: Vec<TextField>,
}

impl TextForm {
    /// Decode a form from either a `fields` array or the named-key layout
    /// (`address`, `budget`, `date`, `duration`, `numberOfAttendees`).
    pub fn from_json(payload: &Map<String, Value>) -> Result<Self, String> {
        if let Some(fields) = payload.get("fields") {
            return serde_json::from_value::<Vec<TextField>>(fields.clone())
                .map(|fields| Self { fields })
                .map_err(|error| format!("invalid form `fields`: {error}"));
        }

        let mut fields = Vec::new();
        for (key, default_label) in NAMED_FIELDS {
            let raw = payload.get(key).or_else(|| match key {
                "numberOfAttendees" => payload.get("number_of_attendees"),
                _ => None,
            });
            let Some(raw) = raw else {
                continue;
            };
            let field = match raw {
                Value::Null => continue,
                Value::String(content) => TextField::new(default_label, content.clone()),
                Value::Object(_) => {
                    let mut field: TextField = serde_json::from_value(raw.clone())
                        .map_err(|error| format!("invalid form field `{key}`: {error}"))?;
                    if field.label.trim().is_empty() {
                        field.label = default_label.to_owned();
                    }
                    field
                }
                other => {
                    return Err(format!(
                        "form field `{key}` must be an object or string, found {}",
                        json_type_name(other)
                    ));
                }
            };
            fields.push(field);
        }

        if fields.is_empty() {
            return Err("text_form carries no fields".to_owned());
        }
        Ok(Self { fields })
    }

    /// Look a field up by label, ignoring case and surrounding whitespace.
    pub fn field(&self, label: &str) -> Option<&TextField> {
        let wanted = label.trim();
        self.fields
            .iter()
            .find(|field| field.label.trim().eq_ignore_ascii_case(wanted))
    }

    /// Lower-cased label → trimmed content, skipping blank labels.
    pub fn form_data(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter(|field| !field.label.trim().is_empty())
            .map(|field| {
                (
                    field.label.trim().to_lowercase(),
                    field.content.trim().to_owned(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_array_keeps_order() {
        let payload = json!({
            "fields": [
                {"label": "Date", "content": "2026-05-01"},
                {"label": "Address", "content": ""},
            ]
        });
        let form = TextForm::from_json(payload.as_object().unwrap()).unwrap();
        assert_eq!(form.fields.len(), 2);
        assert_eq!(form.fields[0].label, "Date");
        assert_eq!(form.fields[1].content, "");
    }

    #[test]
    fn named_keys_decode_in_canonical_order() {
        let payload = json!({
            "numberOfAttendees": {"label": "Number of attendees", "content": "40"},
            "address": {"label": "Address", "content": " 1 Main St "},
            "budget": "500",
            "date": {"content": "Friday"},
        });
        let form = TextForm::from_json(payload.as_object().unwrap()).unwrap();
        let labels: Vec<&str> = form.fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Address", "Budget", "Date", "Number of attendees"]);
        assert_eq!(form.field("budget").map(|f| f.content.as_str()), Some("500"));

        let data = form.form_data();
        assert_eq!(data.get("address").map(String::as_str), Some("1 Main St"));
        assert_eq!(data.get("number of attendees").map(String::as_str), Some("40"));
    }

    #[test]
    fn empty_form_is_a_schema_error() {
        let payload = json!({"unrelated": 1});
        assert!(TextForm::from_json(payload.as_object().unwrap()).is_err());

        let payload = json!({"budget": 12});
        let err = TextForm::from_json(payload.as_object().unwrap()).unwrap_err();
        assert!(err.contains("found number"));
    }
}
