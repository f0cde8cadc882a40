use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ApplicationError;

/// The attendee profile: a flat JSON object as returned by the profile source, plus
/// bookkeeping fields added on save.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    pub fn from_value(value: Value) -> Result<Self, ApplicationError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ApplicationError::InvalidInput(format!(
                "profile data must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Non-empty, trimmed string field.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn first_name(&self) -> &str {
        self.text("firstName").unwrap_or_default()
    }

    pub fn last_name(&self) -> &str {
        self.text("lastName").unwrap_or_default()
    }

    /// Fills `firstName`/`lastName` from `fullName` (or `name`) when both are missing, and
    /// fails when no name can be derived at all.
    pub fn normalize_names(&mut self) -> Result<(), ApplicationError> {
        if self.text("firstName").is_none() && self.text("lastName").is_none() {
            let derived = self
                .text("fullName")
                .or_else(|| self.text("name"))
                .map(|full| match full.split_once(' ') {
                    Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
                    None => (full.to_string(), String::new()),
                });

            if let Some((first, last)) = derived {
                if !first.is_empty() {
                    self.insert("firstName", first);
                }
                if !last.is_empty() {
                    self.insert("lastName", last);
                }
            }
        }

        if self.text("firstName").is_none() && self.text("lastName").is_none() {
            return Err(ApplicationError::Integration(
                "could not extract firstName and lastName from profile data".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the profile as the "User info" block appended to the assistant instructions.
    pub fn assistant_brief(&self) -> Option<String> {
        if self.is_empty() || self.text("firstName").is_none() {
            return None;
        }

        let mut lines = Vec::new();

        if let (Some(first), Some(last)) = (self.text("firstName"), self.text("lastName")) {
            lines.push(format!("Name: {first} {last}"));
        }
        if let Some(headline) = self.text("headline") {
            lines.push(format!("Professional headline: {headline}"));
        }
        if let (Some(title), Some(company)) = (self.text("jobTitle"), self.text("companyName")) {
            lines.push(format!("Current position: {title} at {company}"));
        }
        if let Some(email) = self.text("email") {
            lines.push(format!("Email: {email}"));
        }
        if let Some(location) = self.text("addressWithCountry") {
            lines.push(format!("Location: {location}"));
        }
        if let Some(about) = self.text("about") {
            lines.push(format!("About: {about}"));
        }
        if let Some(url) = self.text("linkedinUrl") {
            lines.push(format!("LinkedIn: {url}"));
        }
        if let Some(current) = self.current_experience() {
            lines.push(current);
        }

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    fn current_experience(&self) -> Option<String> {
        let first = self.0.get("experiences")?.as_array()?.first()?;
        let field = |key: &str| first.get(key).and_then(Value::as_str).map(str::trim);
        let title = field("title").filter(|value| !value.is_empty())?;
        let company = field("subtitle").filter(|value| !value.is_empty())?;
        let duration = field("caption").unwrap_or_default();
        Some(format!("Current role: {title} at {company} ({duration})"))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
