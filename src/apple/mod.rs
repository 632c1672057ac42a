/// Apple Sign-In
///
/// Verifies identity tokens issued by Apple against Apple's published
/// JWKS, which is cached in memory and refreshed on expiry or key rotation.

pub mod keys;
pub mod verifier;

pub use keys::{AppleKeyCache, CachedKeySet, HttpKeySetSource, KeySetSource};
pub use verifier::{decode_header_unverified, verify_and_decode, AppleTokenVerifier, TokenHeader};

use crate::error::AppleAuthError;
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Deserializer, Serialize};

/// Issuer of every Apple identity token
pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Apple's key-distribution endpoint
pub const APPLE_KEYS_URL: &str = "https://appleid.apple.com/auth/keys";

/// One public key from Apple's JWKS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleJwk {
    pub kty: String,
    pub kid: String,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    /// RSA modulus, base64url big-endian
    pub n: String,
    /// RSA exponent, base64url big-endian
    pub e: String,
}

impl AppleJwk {
    /// Build an RSA verification key from the modulus and exponent
    pub fn decoding_key(&self) -> Result<DecodingKey, AppleAuthError> {
        if self.kty != "RSA" {
            return Err(AppleAuthError::UnsupportedAlgorithm(format!(
                "key {} has type {}, expected RSA",
                self.kid, self.kty
            )));
        }

        DecodingKey::from_rsa_components(&self.n, &self.e).map_err(|e| {
            AppleAuthError::UnsupportedAlgorithm(format!(
                "key {} has unusable RSA components: {}",
                self.kid, e
            ))
        })
    }
}

/// Apple's JSON Web Key Set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleKeySet {
    pub keys: Vec<AppleJwk>,
}

impl AppleKeySet {
    pub fn find(&self, kid: &str) -> Option<&AppleJwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

/// Verified claims of an Apple identity token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppleIdentityClaims {
    #[serde(rename = "iss")]
    pub issuer: String,
    /// `aud`, which may arrive as a string or an array
    #[serde(rename = "aud", deserialize_with = "string_or_seq")]
    pub audience: Vec<String>,
    /// Stable Apple user identifier
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub email_verified: Option<bool>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_private_email: Option<bool>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub nbf: Option<i64>,
}

impl AppleIdentityClaims {
    /// True only when `client_id` is the sole audience
    pub fn is_for(&self, client_id: &str) -> bool {
        matches!(self.audience.as_slice(), [aud] if aud == client_id)
    }
}

fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(auds) => auds,
    })
}

/// Apple sends some boolean claims as `true` and others as `"true"`
fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    Ok(match Option::<BoolOrString>::deserialize(deserializer)? {
        Some(BoolOrString::Bool(b)) => Some(b),
        Some(BoolOrString::Str(s)) => Some(s.eq_ignore_ascii_case("true")),
        None => None,
    })
}
