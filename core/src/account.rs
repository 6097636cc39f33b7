use std::fmt;

use serde::{Deserialize, Serialize};

/// String wrapper that never prints its contents.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(**********)")
    }
}

/// The account a plugin acts on behalf of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub email: String,
    #[serde(default)]
    pub password: Secret,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub two_factor_secret: Option<Secret>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Account {
    pub fn new(account_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            email: email.into(),
            password: Secret::default(),
            user_agent: None,
            proxy: None,
            two_factor_secret: None,
            notes: None,
            active: true,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Secret::new(password);
        self
    }

    pub fn has_two_factor(&self) -> bool {
        self.two_factor_secret
            .as_ref()
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }
}
