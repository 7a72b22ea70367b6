use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The authenticated principal as returned by `/user/me`.
///
/// Fields are owned by the identity service; the value is kept exactly as
/// received and handed back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct User(Value);

impl User {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn username(&self) -> Option<&str> {
        self.0.get("username").and_then(Value::as_str)
    }

    /// Name suitable for display: the username, else the id, else "unknown".
    pub fn display_name(&self) -> String {
        if let Some(name) = self.username() {
            return name.to_string();
        }
        match self.id() {
            Some(Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => "unknown".to_string(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_accessors() {
        let user = User::new(json!({"id": 1, "username": "bob", "email": "bob@example.com"}));
        assert_eq!(user.id(), Some(&json!(1)));
        assert_eq!(user.username(), Some("bob"));
        assert_eq!(user.display_name(), "bob");
        assert_eq!(user.as_value()["email"], "bob@example.com");
    }

    #[test]
    fn test_user_display_name_fallbacks() {
        assert_eq!(User::new(json!({"id": 7})).display_name(), "7");
        assert_eq!(User::new(json!({"id": "abc"})).display_name(), "abc");
        assert_eq!(User::new(json!({})).display_name(), "unknown");
    }

    #[test]
    fn test_user_is_passed_through_verbatim() {
        let raw = json!({"id": 1, "roles": ["admin"], "nested": {"a": null}});
        let user: User = serde_json::from_value(raw.clone()).expect("user parses");
        assert_eq!(serde_json::to_value(&user).expect("user serializes"), raw);
    }
}
