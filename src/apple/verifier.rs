/// Apple identity token verification
use crate::{
    apple::{AppleIdentityClaims, AppleKeyCache, HttpKeySetSource, APPLE_ISSUER},
    config::AppleConfig,
    error::{AppResult, AppleAuthError, ClaimCheck},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Algorithms accepted for Apple's RSA keys
const RSA_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Unverified JOSE header of a compact token
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// Decode the header of a compact token WITHOUT checking its signature.
///
/// Nothing returned here is trusted; it only selects the key to verify with.
pub fn decode_header_unverified(token: &str) -> Result<TokenHeader, AppleAuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AppleAuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let mut decoded = Vec::with_capacity(3);
    for (name, segment) in ["header", "payload", "signature"].iter().zip(&segments) {
        if segment.is_empty() {
            return Err(AppleAuthError::MalformedToken(format!("empty {} segment", name)));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| AppleAuthError::MalformedToken(format!("{} is not base64url: {}", name, e)))?;
        decoded.push(bytes);
    }

    serde_json::from_slice(&decoded[0])
        .map_err(|e| AppleAuthError::MalformedToken(format!("invalid header: {}", e)))
}

/// Check the signature of `token` with `key` and decode its claims.
///
/// Time and audience checks are left to the caller.
pub fn verify_and_decode(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
) -> Result<AppleIdentityClaims, AppleAuthError> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<AppleIdentityClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AppleAuthError::InvalidSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_) => AppleAuthError::UnsupportedAlgorithm(e.to_string()),
            _ => AppleAuthError::MalformedToken(e.to_string()),
        })
}

/// Verifies Apple identity tokens for one client id
pub struct AppleTokenVerifier {
    client_id: String,
    leeway: Duration,
    keys: AppleKeyCache,
}

impl AppleTokenVerifier {
    /// Create a verifier expecting `client_id` as the token audience
    pub fn new(client_id: impl Into<String>, keys: AppleKeyCache) -> Self {
        Self {
            client_id: client_id.into(),
            leeway: Duration::zero(),
            keys,
        }
    }

    /// Tolerate clock skew on `exp` / `nbf`
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Build a verifier fetching keys over HTTPS per configuration
    pub fn from_config(config: &AppleConfig) -> AppResult<Self> {
        let source = HttpKeySetSource::new(
            config.keys_url.clone(),
            std::time::Duration::from_secs(config.http_timeout_secs),
        )?;
        let keys = AppleKeyCache::new(Arc::new(source))
            .with_ttl(seconds(config.key_cache_ttl_secs));

        Ok(Self::new(config.client_id.clone(), keys).with_leeway(seconds(config.clock_leeway_secs)))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn key_cache(&self) -> &AppleKeyCache {
        &self.keys
    }

    /// Force a key set refresh, e.g. to warm the cache at startup
    pub async fn refresh_keys(&self) -> Result<(), AppleAuthError> {
        self.keys.refresh(Utc::now()).await.map(|_| ())
    }

    /// Verify a token against the current time
    pub async fn verify(&self, token: &str) -> Result<AppleIdentityClaims, AppleAuthError> {
        self.verify_at(token, Utc::now()).await
    }

    /// Verify a token as of `now`
    pub async fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AppleIdentityClaims, AppleAuthError> {
        let header = decode_header_unverified(token)?;
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| AppleAuthError::MalformedToken("header has no kid".to_string()))?;

        let jwk = self.keys.key_for(kid, now).await?;

        let algorithm = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| RSA_ALGORITHMS.contains(alg))
            .ok_or_else(|| {
                AppleAuthError::UnsupportedAlgorithm(format!("token algorithm {} is not RSA", header.alg))
            })?;

        if let Some(key_alg) = jwk.alg.as_deref() {
            if key_alg != header.alg {
                return Err(AppleAuthError::UnsupportedAlgorithm(format!(
                    "key {} is for {}, token uses {}",
                    jwk.kid, key_alg, header.alg
                )));
            }
        }

        let key = jwk.decoding_key()?;
        let claims = verify_and_decode(token, &key, algorithm).map_err(|e| {
            warn!("Apple token rejected (kid {}): {}", kid, e);
            e
        })?;

        self.validate_claims(&claims, now).map_err(|check| {
            warn!("Apple token claim check failed for sub {}: {}", claims.subject, check);
            AppleAuthError::ClaimValidationFailed(check)
        })?;

        debug!("Verified Apple identity token for sub {}", claims.subject);

        Ok(claims)
    }

    fn validate_claims(&self, claims: &AppleIdentityClaims, now: DateTime<Utc>) -> Result<(), ClaimCheck> {
        if claims.issuer != APPLE_ISSUER {
            return Err(ClaimCheck::Issuer);
        }

        if !claims.is_for(&self.client_id) {
            return Err(ClaimCheck::Audience);
        }

        let now = now.timestamp();
        let leeway = self.leeway.num_seconds();

        if let Some(exp) = claims.exp {
            if now >= exp.saturating_add(leeway) {
                return Err(ClaimCheck::Expired);
            }
        }

        if let Some(nbf) = claims.nbf {
            if now.saturating_add(leeway) < nbf {
                return Err(ClaimCheck::NotYetValid);
            }
        }

        Ok(())
    }
}

/// Config seconds to a chrono duration, saturating at chrono's range
fn seconds(secs: u64) -> Duration {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    Duration::seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apple::keys::tests::StaticKeySource;
    use crate::apple::{AppleJwk, AppleKeySet};
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{json, Value};

    const SIGNING_PEM: &str = include_str!("../../tests/fixtures/signing.pem");
    const OTHER_PEM: &str = include_str!("../../tests/fixtures/other.pem");
    const JWKS: &str = include_str!("../../tests/fixtures/jwks.json");
    const CLIENT_ID: &str = "com.yachtlife.app";

    fn fixture_keys() -> AppleKeySet {
        serde_json::from_str(JWKS).unwrap()
    }

    fn sign(pem: &str, kid: &str, alg: Algorithm, claims: &Value) -> String {
        let mut header = Header::new(alg);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }

    fn claims_at(now: DateTime<Utc>) -> Value {
        json!({
            "iss": APPLE_ISSUER,
            "aud": CLIENT_ID,
            "sub": "001234.5f0c2b4e9d.0042",
            "email": "skipper@example.com",
            "email_verified": "true",
            "iat": now.timestamp(),
            "exp": (now + Duration::minutes(10)).timestamp(),
        })
    }

    fn verifier() -> (AppleTokenVerifier, Arc<StaticKeySource>) {
        let source = Arc::new(StaticKeySource::new(fixture_keys()));
        let verifier = AppleTokenVerifier::new(CLIENT_ID, AppleKeyCache::new(source.clone()));
        (verifier, source)
    }

    #[test]
    fn test_decode_header_unverified() {
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims_at(Utc::now()));
        let header = decode_header_unverified(&token).unwrap();

        assert_eq!(header.alg, "RS256");
        assert_eq!(header.kid.as_deref(), Some("test-key-1"));
    }

    #[test]
    fn test_decode_header_rejects_bad_shapes() {
        for token in ["", "abc", "a.b", "a.b.c.d", "eyJhbGciOiJSUzI1NiJ9..c2ln", "!!!.e30.c2ln", "bm90IGpzb24.e30.c2ln"] {
            assert!(
                matches!(decode_header_unverified(token), Err(AppleAuthError::MalformedToken(_))),
                "accepted {:?}",
                token
            );
        }
    }

    #[tokio::test]
    async fn test_valid_token_yields_claims() {
        let (verifier, _) = verifier();
        let now = Utc::now();
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims_at(now));

        let claims = verifier.verify_at(&token, now).await.unwrap();

        assert_eq!(claims.subject, "001234.5f0c2b4e9d.0042");
        assert_eq!(claims.audience, vec![CLIENT_ID.to_string()]);
        assert_eq!(claims.issuer, APPLE_ISSUER);
        assert_eq!(claims.email.as_deref(), Some("skipper@example.com"));
        assert_eq!(claims.email_verified, Some(true));
    }

    #[tokio::test]
    async fn test_altered_signature_is_rejected() {
        let (verifier, _) = verifier();
        let now = Utc::now();
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims_at(now));

        let (signed, signature) = token.rsplit_once('.').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
        for i in [0, bytes.len() / 2, bytes.len() - 1] {
            bytes[i] ^= 0x01;
            let tampered = format!("{}.{}", signed, URL_SAFE_NO_PAD.encode(&bytes));
            let result = verifier.verify_at(&tampered, now).await;
            assert!(matches!(result, Err(AppleAuthError::InvalidSignature)));
            bytes[i] ^= 0x01;
        }
    }

    #[tokio::test]
    async fn test_token_signed_by_other_key_is_rejected() {
        let (verifier, _) = verifier();
        let now = Utc::now();
        // Claims to be test-key-1 but signed with a different private key
        let token = sign(OTHER_PEM, "test-key-1", Algorithm::RS256, &claims_at(now));

        let result = verifier.verify_at(&token, now).await;
        assert!(matches!(result, Err(AppleAuthError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_wrong_audience_is_rejected() {
        let (verifier, _) = verifier();
        let now = Utc::now();
        let mut claims = claims_at(now);
        claims["aud"] = json!("com.someone.else");
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims);

        let result = verifier.verify_at(&token, now).await;
        assert!(matches!(
            result,
            Err(AppleAuthError::ClaimValidationFailed(ClaimCheck::Audience))
        ));
    }

    #[tokio::test]
    async fn test_array_audience() {
        let (verifier, _) = verifier();
        let now = Utc::now();

        let cases = [
            (json!(["com.other"]), false),
            (json!([CLIENT_ID, "com.other"]), false),
            (json!([]), false),
            (json!([CLIENT_ID]), true),
        ];
        for (aud, accepted) in cases {
            let mut claims = claims_at(now);
            claims["aud"] = aud.clone();
            let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims);

            let result = verifier.verify_at(&token, now).await;
            if accepted {
                assert_eq!(result.unwrap().audience, vec![CLIENT_ID.to_string()]);
            } else {
                assert!(
                    matches!(result, Err(AppleAuthError::ClaimValidationFailed(ClaimCheck::Audience))),
                    "aud {} gave {:?}",
                    aud,
                    result
                );
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_issuer_is_rejected() {
        let (verifier, _) = verifier();
        let now = Utc::now();
        let mut claims = claims_at(now);
        claims["iss"] = json!("https://accounts.google.com");
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims);

        let result = verifier.verify_at(&token, now).await;
        assert!(matches!(
            result,
            Err(AppleAuthError::ClaimValidationFailed(ClaimCheck::Issuer))
        ));
    }

    #[tokio::test]
    async fn test_expiry_and_not_before() {
        let (verifier, _) = verifier();
        let now = Utc::now();
        let mut claims = claims_at(now);
        claims["nbf"] = json!((now + Duration::minutes(1)).timestamp());
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims);

        let early = verifier.verify_at(&token, now).await;
        assert!(matches!(
            early,
            Err(AppleAuthError::ClaimValidationFailed(ClaimCheck::NotYetValid))
        ));

        assert!(verifier.verify_at(&token, now + Duration::minutes(2)).await.is_ok());

        let late = verifier.verify_at(&token, now + Duration::minutes(10)).await;
        assert!(matches!(
            late,
            Err(AppleAuthError::ClaimValidationFailed(ClaimCheck::Expired))
        ));
    }

    #[tokio::test]
    async fn test_leeway_tolerates_small_skew() {
        let source = Arc::new(StaticKeySource::new(fixture_keys()));
        let verifier = AppleTokenVerifier::new(CLIENT_ID, AppleKeyCache::new(source))
            .with_leeway(Duration::seconds(60));
        let now = Utc::now();
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims_at(now));

        assert!(verifier
            .verify_at(&token, now + Duration::minutes(10) + Duration::seconds(30))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_token_without_time_claims_is_accepted() {
        let (verifier, _) = verifier();
        let claims = json!({
            "iss": APPLE_ISSUER,
            "aud": CLIENT_ID,
            "sub": "no-expiry-user",
        });
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims);

        let claims = verifier.verify_at(&token, Utc::now()).await.unwrap();
        assert_eq!(claims.subject, "no-expiry-user");
        assert_eq!(claims.email, None);
    }

    #[tokio::test]
    async fn test_non_rsa_algorithm_is_unsupported() {
        let (verifier, _) = verifier();
        let claims = claims_at(Utc::now());
        let header = Header {
            kid: Some("test-key-1".to_string()),
            ..Header::new(Algorithm::HS256)
        };
        let token = jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(b"guess")).unwrap();

        let result = verifier.verify_at(&token, Utc::now()).await;
        assert!(matches!(result, Err(AppleAuthError::UnsupportedAlgorithm(_))));
    }

    #[tokio::test]
    async fn test_algorithm_must_match_key() {
        let (verifier, _) = verifier();
        let now = Utc::now();
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS512, &claims_at(now));

        let result = verifier.verify_at(&token, now).await;
        assert!(matches!(result, Err(AppleAuthError::UnsupportedAlgorithm(_))));
    }

    #[tokio::test]
    async fn test_missing_kid_is_malformed() {
        let (verifier, source) = verifier();
        let key = EncodingKey::from_rsa_pem(SIGNING_PEM.as_bytes()).unwrap();
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims_at(Utc::now()), &key).unwrap();

        let result = verifier.verify_at(&token, Utc::now()).await;
        assert!(matches!(result, Err(AppleAuthError::MalformedToken(_))));
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_kid_is_not_found_after_one_fetch() {
        let (verifier, source) = verifier();
        let now = Utc::now();
        let token = sign(SIGNING_PEM, "retired-key", Algorithm::RS256, &claims_at(now));

        let result = verifier.verify_at(&token, now).await;
        assert!(matches!(result, Err(AppleAuthError::KeyNotFound(_))));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_window_controls_fetches() {
        let (verifier, source) = verifier();
        let now = Utc::now();
        let token = sign(SIGNING_PEM, "test-key-1", Algorithm::RS256, &claims_at(now));

        verifier.verify_at(&token, now).await.unwrap();
        verifier.verify_at(&token, now + Duration::minutes(1)).await.unwrap();
        assert_eq!(source.fetch_count(), 1);

        // Token would be expired by then; the fetch still happens first
        let later = now + Duration::hours(24) + Duration::seconds(1);
        let _ = verifier.verify_at(&token, later).await;
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_unusable_key_material_is_unsupported() {
        let source = Arc::new(StaticKeySource::new(AppleKeySet {
            keys: vec![AppleJwk {
                kty: "RSA".to_string(),
                kid: "broken".to_string(),
                key_use: Some("sig".to_string()),
                alg: Some("RS256".to_string()),
                n: "***".to_string(),
                e: "AQAB".to_string(),
            }],
        }));
        let verifier = AppleTokenVerifier::new(CLIENT_ID, AppleKeyCache::new(source));
        let now = Utc::now();
        let token = sign(SIGNING_PEM, "broken", Algorithm::RS256, &claims_at(now));

        let result = verifier.verify_at(&token, now).await;
        assert!(matches!(result, Err(AppleAuthError::UnsupportedAlgorithm(_))));
    }
}
