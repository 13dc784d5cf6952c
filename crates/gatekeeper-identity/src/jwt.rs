//! Verification of RSA-signed bearer tokens.
//!
//! The verifier is built once from a `key id -> public key` map and is
//! immutable afterwards. Several keys may be valid at the same time, which is
//! how signing-key rotation is handled.

use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use gatekeeper_core::EntityData;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{JwtError, JwtResult};

/// Default claim carrying the username.
pub const DEFAULT_USERNAME_CLAIM: &str = "cognito:username";

/// Default claim carrying group memberships.
pub const DEFAULT_GROUPS_CLAIM: &str = "cognito:groups";

/// Algorithms a token may be signed with.
///
/// A known algorithm outside this list fails with
/// [`JwtError::UnsupportedAlgorithm`]. An `alg` the token library cannot
/// name at all, such as `none`, fails while decoding the header and comes
/// back as [`JwtError::TokenMalformed`]. Both are rejected as unauthorised.
pub const ALLOWED_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Claim names and validation settings for JWT verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Claim holding the caller's username.
    pub username_claim: String,
    /// Claim holding the caller's groups.
    pub groups_claim: String,
    /// Required `iss` value, if any.
    pub issuer: Option<String>,
    /// Required `aud` value, if any.
    pub audience: Option<String>,
    /// Clock skew allowed on `exp` and `nbf`, in seconds.
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            username_claim: DEFAULT_USERNAME_CLAIM.to_string(),
            groups_claim: DEFAULT_GROUPS_CLAIM.to_string(),
            issuer: None,
            audience: None,
            leeway_secs: 60,
        }
    }
}

impl JwtConfig {
    /// Create a configuration with the default claim names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the required issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the required audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the clock skew leeway.
    pub fn with_leeway_secs(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }
}

/// Groups may arrive as a list or, from some issuers, a single string.
#[derive(Deserialize)]
#[serde(untagged)]
enum GroupsClaim {
    Single(String),
    Multiple(Vec<String>),
}

impl GroupsClaim {
    fn into_vec(self) -> Vec<String> {
        match self {
            GroupsClaim::Single(group) => vec![group],
            GroupsClaim::Multiple(groups) => groups,
        }
    }
}

/// Verifies signed tokens and extracts the caller's identity.
pub struct JwtVerifier {
    keys: HashMap<String, DecodingKey>,
    config: JwtConfig,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<_> = self.keys.keys().collect();
        kids.sort();
        f.debug_struct("JwtVerifier")
            .field("kids", &kids)
            .field("config", &self.config)
            .finish()
    }
}

impl JwtVerifier {
    /// Build a verifier from base64-encoded DER (SubjectPublicKeyInfo) RSA keys.
    ///
    /// An empty map is accepted; every `parse` then fails with
    /// [`JwtError::PublicKeysEmpty`] until a verifier with keys replaces it.
    pub fn new(public_keys: &HashMap<String, String>, config: JwtConfig) -> JwtResult<Self> {
        let mut keys = HashMap::with_capacity(public_keys.len());
        for (kid, encoded) in public_keys {
            keys.insert(kid.clone(), decoding_key(kid, encoded)?);
        }

        if keys.is_empty() {
            warn!("JWT verifier created without public keys");
        } else {
            debug!(keys = keys.len(), "JWT verifier created");
        }

        Ok(Self { keys, config })
    }

    /// Number of configured signing keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Whether a key with this id is configured.
    pub fn has_key(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// The claim configuration in use.
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Verify `token` and return the identity it carries.
    pub fn parse(&self, token: &str) -> JwtResult<EntityData> {
        if self.keys.is_empty() {
            return Err(JwtError::PublicKeysEmpty);
        }

        let header = decode_header(token).map_err(|e| JwtError::TokenMalformed(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| JwtError::UnknownKey("token header has no kid".to_string()))?;
        let key = self
            .keys
            .get(&kid)
            .ok_or_else(|| JwtError::UnknownKey(kid.clone()))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(JwtError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let validation = self.validation(header.alg);
        let claims = decode::<Map<String, Value>>(token, key, &validation)?.claims;

        let entity = self.entity_from_claims(claims)?;
        debug!(kid = %kid, caller = %entity.log_id(), "token verified");
        Ok(entity)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.config.leeway_secs;
        validation.validate_nbf = true;

        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }

        validation
    }

    fn entity_from_claims(&self, mut claims: Map<String, Value>) -> JwtResult<EntityData> {
        let user_id = match claims.remove(&self.config.username_claim) {
            Some(Value::String(user_id)) if !user_id.is_empty() => user_id,
            _ => return Err(JwtError::NoUserId),
        };

        let groups = claims
            .remove(&self.config.groups_claim)
            .ok_or(JwtError::NoGroups)
            .and_then(|value| {
                serde_json::from_value::<GroupsClaim>(value)
                    .map_err(|e| JwtError::InvalidClaims(format!("groups claim: {e}")))
            })?
            .into_vec();

        Ok(EntityData::user(user_id).with_groups(groups))
    }
}

fn decoding_key(kid: &str, encoded: &str) -> JwtResult<DecodingKey> {
    let der = STANDARD
        .decode(encoded.trim())
        .map_err(|e| JwtError::invalid_public_key(kid, format!("not base64: {e}")))?;

    DecodingKey::from_rsa_pem(spki_pem(&der).as_bytes())
        .map_err(|e| JwtError::invalid_public_key(kid, e.to_string()))
}

fn spki_pem(der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = String::with_capacity(body.len() + 64);
    pem.push_str("-----BEGIN PUBLIC KEY-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
    use serde_json::json;

    const SIGNING_KEY: &str = include_str!("../tests/fixtures/signing_key.pem");
    const SIGNING_PUB: &str = include_str!("../tests/fixtures/signing_key.pub.b64");
    const OTHER_KEY: &str = include_str!("../tests/fixtures/other_key.pem");
    const OTHER_PUB: &str = include_str!("../tests/fixtures/other_key.pub.b64");

    fn verifier() -> JwtVerifier {
        let keys = HashMap::from([
            ("key1".to_string(), SIGNING_PUB.to_string()),
            ("key2".to_string(), OTHER_PUB.to_string()),
        ]);
        JwtVerifier::new(&keys, JwtConfig::default()).unwrap()
    }

    fn sign(private_pem: &str, alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(alg);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
        encode(&header, claims, &key).unwrap()
    }

    fn valid_claims() -> Value {
        json!({
            "cognito:username": "janedoe",
            "cognito:groups": ["admin", "publisher"],
            "exp": get_current_timestamp() + 3600,
        })
    }

    #[test]
    fn test_parse_valid_token() {
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &valid_claims());

        let entity = verifier().parse(&token).unwrap();

        assert_eq!(entity.user_id.as_deref(), Some("janedoe"));
        assert_eq!(entity.groups, vec!["admin", "publisher"]);
        assert_eq!(entity.service_id, None);
    }

    #[test]
    fn test_parse_with_rotated_key() {
        let token = sign(OTHER_KEY, Algorithm::RS512, Some("key2"), &valid_claims());
        assert!(verifier().parse(&token).is_ok());

        let token = sign(OTHER_KEY, Algorithm::PS256, Some("key2"), &valid_claims());
        assert!(verifier().parse(&token).is_ok());
    }

    #[test]
    fn test_signature_from_wrong_key() {
        let token = sign(OTHER_KEY, Algorithm::RS256, Some("key1"), &valid_claims());
        assert_eq!(verifier().parse(&token), Err(JwtError::InvalidSignature));
    }

    #[test]
    fn test_expired_token() {
        let mut claims = valid_claims();
        claims["exp"] = json!(get_current_timestamp() - 3600);
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &claims);

        assert_eq!(verifier().parse(&token), Err(JwtError::TokenExpired));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let mut claims = valid_claims();
        claims["nbf"] = json!(get_current_timestamp() + 1800);
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &claims);

        assert_eq!(verifier().parse(&token), Err(JwtError::TokenNotYetValid));
    }

    #[test]
    fn test_unknown_and_missing_kid() {
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key9"), &valid_claims());
        assert!(matches!(verifier().parse(&token), Err(JwtError::UnknownKey(_))));

        let token = sign(SIGNING_KEY, Algorithm::RS256, None, &valid_claims());
        assert!(matches!(verifier().parse(&token), Err(JwtError::UnknownKey(_))));
    }

    #[test]
    fn test_rejects_unsigned_token() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT","kid":"key1"}"#);
        let payload = URL_SAFE_NO_PAD.encode(valid_claims().to_string());
        let token = format!("{header}.{payload}.c2ln");

        assert!(matches!(
            verifier().parse(&token),
            Err(JwtError::TokenMalformed(_))
        ));
    }

    #[test]
    fn test_rejects_hmac_algorithm() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("key1".to_string());
        let token = encode(
            &header,
            &valid_claims(),
            &EncodingKey::from_secret(SIGNING_PUB.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            verifier().parse(&token),
            Err(JwtError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_malformed_token() {
        assert!(matches!(
            verifier().parse("not.a.token"),
            Err(JwtError::TokenMalformed(_))
        ));
        assert!(matches!(verifier().parse(""), Err(JwtError::TokenMalformed(_))));
    }

    #[test]
    fn test_missing_username() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("cognito:username");
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &claims);
        assert_eq!(verifier().parse(&token), Err(JwtError::NoUserId));

        let mut claims = valid_claims();
        claims["cognito:username"] = json!("");
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &claims);
        assert_eq!(verifier().parse(&token), Err(JwtError::NoUserId));
    }

    #[test]
    fn test_missing_groups() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("cognito:groups");
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &claims);

        assert_eq!(verifier().parse(&token), Err(JwtError::NoGroups));
    }

    #[test]
    fn test_empty_groups_allowed() {
        let mut claims = valid_claims();
        claims["cognito:groups"] = json!([]);
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &claims);

        let entity = verifier().parse(&token).unwrap();
        assert!(entity.groups.is_empty());
    }

    #[test]
    fn test_custom_claim_names_and_issuer() {
        let keys = HashMap::from([("key1".to_string(), SIGNING_PUB.to_string())]);
        let config = JwtConfig {
            username_claim: "sub".to_string(),
            groups_claim: "groups".to_string(),
            ..JwtConfig::default()
        }
        .with_issuer("https://issuer.example");
        let verifier = JwtVerifier::new(&keys, config).unwrap();

        let claims = json!({
            "sub": "svc-user",
            "groups": "readers",
            "iss": "https://issuer.example",
            "exp": get_current_timestamp() + 600,
        });
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &claims);
        let entity = verifier.parse(&token).unwrap();
        assert_eq!(entity.user_id.as_deref(), Some("svc-user"));
        assert_eq!(entity.groups, vec!["readers"]);

        let mut claims = claims;
        claims["iss"] = json!("https://elsewhere.example");
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &claims);
        assert!(matches!(verifier.parse(&token), Err(JwtError::InvalidClaims(_))));
    }

    #[test]
    fn test_empty_key_set() {
        let verifier = JwtVerifier::new(&HashMap::new(), JwtConfig::default()).unwrap();
        let token = sign(SIGNING_KEY, Algorithm::RS256, Some("key1"), &valid_claims());

        assert_eq!(verifier.key_count(), 0);
        assert_eq!(verifier.parse(&token), Err(JwtError::PublicKeysEmpty));
    }

    #[test]
    fn test_invalid_public_key() {
        let keys = HashMap::from([("bad".to_string(), "%%%".to_string())]);
        assert!(matches!(
            JwtVerifier::new(&keys, JwtConfig::default()),
            Err(JwtError::InvalidPublicKey { .. })
        ));

        let keys = HashMap::from([("bad".to_string(), STANDARD.encode(b"not a key"))]);
        assert!(matches!(
            JwtVerifier::new(&keys, JwtConfig::default()),
            Err(JwtError::InvalidPublicKey { .. })
        ));
    }

    #[test]
    fn test_spki_pem_wraps_lines() {
        let pem = spki_pem(&[0u8; 100]);
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        assert!(pem.lines().all(|line| line.len() <= 64));
    }

    #[test]
    fn test_debug_hides_keys() {
        let debug = format!("{:?}", verifier());
        assert!(debug.contains("key1"));
        assert!(!debug.contains(SIGNING_PUB.trim()));
    }
}
