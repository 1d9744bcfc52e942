use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn is_moderator(&self) -> bool {
        matches!(self, UserRole::Moderator | UserRole::Admin)
    }

    /// Picks the strongest role out of the role names the auth service reports.
    pub fn from_roles<S: AsRef<str>>(roles: &[S]) -> Self {
        roles
            .iter()
            .filter_map(|role| role.as_ref().parse::<UserRole>().ok())
            .max_by_key(|role| match role {
                UserRole::User => 0,
                UserRole::Moderator => 1,
                UserRole::Admin => 2,
            })
            .unwrap_or_default()
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "moderator" | "mod" => Ok(UserRole::Moderator),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The authenticated user a thread session acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: String,
    pub role: UserRole,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(user_id, UserRole::User)
    }

    pub fn moderator(user_id: impl Into<String>) -> Self {
        Self::new(user_id, UserRole::Moderator)
    }
}
