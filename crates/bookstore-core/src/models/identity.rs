use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Profile fields the backend associates with a credential token.
///
/// The backend decides which fields exist; `name` and `email` are the ones
/// the client reads. Everything else is carried through unchanged so a
/// persisted identity round-trips exactly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(Map<String, Value>);

impl UserIdentity {
    pub fn with_email(email: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("email".to_string(), Value::String(email.to_string()));
        Self(fields)
    }

    /// Build an identity from an arbitrary JSON value. Only objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.str_field("email")
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Name for display: the profile name, else the email.
    pub fn display_name(&self) -> &str {
        self.name()
            .filter(|n| !n.is_empty())
            .or_else(|| self.email())
            .unwrap_or("unknown user")
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }
}
