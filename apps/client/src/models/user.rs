use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The signed-in user as the UI shows it.
///
/// Built from whatever the backend returns for "current user" and cached
/// locally. The cache is a convenience copy; the backend stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Backend hint that this account has not been used yet.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_new_user: bool,
}

impl UserProfile {
    /// Normalizes a backend user object. The display name comes from the first
    /// non-empty of `full_name`, `name`, `username`; the object may be nested
    /// under `data` or `user`. Returns `None` when there is no email.
    pub fn from_backend(body: &Value) -> Option<Self> {
        let user = ["data", "user"]
            .iter()
            .find_map(|k| body.get(k).filter(|v| v.is_object()))
            .unwrap_or(body);

        let email = non_empty(user.get("email"))?;
        let name = ["full_name", "name", "username"]
            .iter()
            .find_map(|k| non_empty(user.get(k)))
            .unwrap_or_else(|| email_local_part(&email));
        let avatar = ["avatar", "avatar_url", "picture"]
            .iter()
            .find_map(|k| non_empty(user.get(k)));
        let is_new_user = ["is_new_user", "first_login", "created_recently"]
            .iter()
            .any(|k| user.get(k).and_then(Value::as_bool).unwrap_or(false));

        Some(Self {
            name,
            email,
            avatar,
            is_new_user,
        })
    }

    /// First word of the display name, else the email local part, else "User".
    pub fn first_name(&self) -> String {
        self.name
            .split_whitespace()
            .next()
            .map(str::to_string)
            .or_else(|| {
                let local = email_local_part(&self.email);
                (!local.is_empty()).then_some(local)
            })
            .unwrap_or_else(|| "User".to_string())
    }

    pub fn greeting(&self) -> String {
        if self.is_new_user {
            format!("Welcome, {}!", self.first_name())
        } else {
            format!("Welcome back, {}!", self.first_name())
        }
    }

    /// Two-letter initials for the avatar fallback.
    pub fn initials(&self) -> String {
        let initials: String = self
            .name
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect();
        if initials.is_empty() {
            "U".to_string()
        } else {
            initials
        }
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn email_local_part(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
