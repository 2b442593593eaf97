// Authentication types

use serde::{Deserialize, Serialize};

/// Access/refresh token pair
///
/// Always written and removed as a unit: readers never observe an access
/// token from one exchange paired with a refresh token from another.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Claims decoded from the access token payload
///
/// Derived on demand by the token inspector, never stored. Field names are
/// the only place the payload format is assumed.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject identifier
    pub sub: Option<String>,
    /// Expiry as epoch seconds
    pub exp: Option<i64>,
    /// Display name
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Login request body
#[derive(Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token endpoint response; login and refresh share this shape
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
}
