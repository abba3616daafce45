//! Registry credentials for image operations.
//!
//! The encoding is base64url (padded) of the JSON document, carried in the
//! `X-Registry-Auth` header.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Header carrying an encoded [`AuthConfig`].
pub const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Credentials for one registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serveraddress: String,
}

impl AuthConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Value for the `X-Registry-Auth` header.
    pub fn encode(&self) -> Result<String> {
        encode_json(self)
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(BASE64_URL_SAFE.encode(json))
}
