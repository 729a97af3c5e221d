//! Authenticator selection. Real deployments plug in a token or SCRAM
//! verifier behind [`crate::auth::Authenticator`]; this config only names
//! the reference implementation shipped with this crate.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticatorKind {
    /// Trusts the `user_id` field of an `authenticate` request verbatim.
    /// Suitable only behind a trusted network boundary.
    #[default]
    TrustedUserId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub authenticator: AuthenticatorKind,
}
