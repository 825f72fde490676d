use serde::{Deserialize, Serialize};
use std::fmt;

/// Replaces every credential when clusters are listed over the API.
pub const CREDENTIAL_PLACEHOLDER: &str = "******";

/// A monitored cluster: where its control plane lives and how to authenticate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Cluster {
    #[serde(alias = "Identifier")]
    pub identifier: String,
    #[serde(alias = "Address")]
    pub address: String,
    #[serde(default, alias = "Username", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, alias = "Password", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, alias = "Token", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// How requests to a control plane are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: Option<String> },
    Bearer(String),
    Anonymous,
}

impl Cluster {
    pub fn credentials(&self) -> Credentials {
        match (&self.token, &self.username) {
            (Some(token), _) if !token.is_empty() => Credentials::Bearer(token.clone()),
            (_, Some(username)) if !username.is_empty() => Credentials::Basic {
                username: username.clone(),
                password: self.password.clone(),
            },
            _ => Credentials::Anonymous,
        }
    }

    /// Copy safe to hand out: identifier and address stay visible, credentials do not.
    pub fn obfuscated(&self) -> Cluster {
        let hide = |v: &Option<String>| v.as_ref().map(|_| CREDENTIAL_PLACEHOLDER.to_string());
        Cluster {
            identifier: self.identifier.clone(),
            address: self.address.clone(),
            username: hide(&self.username),
            password: hide(&self.password),
            token: hide(&self.token),
        }
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.obfuscated();
        f.debug_struct("Cluster")
            .field("identifier", &o.identifier)
            .field("address", &o.address)
            .field("username", &o.username)
            .field("password", &o.password)
            .field("token", &o.token)
            .finish()
    }
}
