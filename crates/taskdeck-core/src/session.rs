use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bearer token issued by the backend login call. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token.trim().to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_approved: bool,
}

/// Everything a logged-in console needs; passed explicitly to the API client
/// and the channel manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    credential: Credential,
    user: Option<UserProfile>,
    established_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(credential: Credential, user: Option<UserProfile>) -> Self {
        Self {
            credential,
            user,
            established_at: Utc::now(),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn display_name(&self) -> String {
        match &self.user {
            Some(user) if !user.name.trim().is_empty() => user.name.clone(),
            Some(user) => user.email.clone(),
            None => "token session".to_string(),
        }
    }
}
