//! Inbound request authentication.
//!
//! Every API request carries a Google OpenID identity token (the scheduler
//! and queue attach one to their callbacks; operators use their own). The
//! token is verified against Google's published JWKS, its audience must be
//! the URL actually visited, and its email must map to a local account.

use std::collections::HashMap;

use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::Json;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use ring::signature;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use timekeeper_core::config::{AuthConfig, AuthMode};
use timekeeper_core::error::TimekeeperError;
use timekeeper_store::{Account, Store};

/// Cached JWKS keys are trusted for this long before a refetch.
const KEYS_TTL_SECS: i64 = 3600;
/// Tolerated clock skew on the `iat` claim.
const IAT_LEEWAY_SECS: i64 = 60;

const ALLOWED_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

pub type Rejection = (StatusCode, Json<Value>);

/// Who a verified request is acting as.
pub enum Principal {
    /// Auth is disabled (`auth.mode = "none"`, local development).
    Anonymous,
    Account(Account),
}

impl Principal {
    fn is_timekeeper(&self) -> bool {
        match self {
            Principal::Anonymous => true,
            Principal::Account(a) => a.role.is_timekeeper(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenHeader {
    #[serde(default)]
    alg: String,
    #[serde(default)]
    kid: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    aud: String,
    iss: String,
    email: String,
    #[serde(default)]
    email_verified: bool,
    iat: i64,
    exp: i64,
    #[allow(dead_code)]
    sub: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kty: String,
    #[serde(default)]
    kid: String,
    #[serde(default)]
    n: String,
    #[serde(default)]
    e: String,
}

/// RSA public key components, decoded from a JWK.
#[derive(Clone)]
struct RsaKey {
    n: Vec<u8>,
    e: Vec<u8>,
}

struct KeySet {
    keys: HashMap<String, RsaKey>,
    fetched_at: i64,
}

impl KeySet {
    fn fresh(&self, now: i64) -> bool {
        now - self.fetched_at < KEYS_TTL_SECS
    }
}

pub struct Verifier {
    config: AuthConfig,
    store: Store,
    client: reqwest::Client,
    keys: RwLock<Option<KeySet>>,
}

impl Verifier {
    pub fn new(config: AuthConfig, store: Store) -> Self {
        Self {
            config,
            store,
            client: reqwest::Client::new(),
            keys: RwLock::new(None),
        }
    }

    /// Verify the bearer token and resolve it to a local account.
    pub async fn authenticate(&self, headers: &HeaderMap, uri: &Uri) -> Result<Principal, Rejection> {
        if self.config.mode == AuthMode::None {
            return Ok(Principal::Anonymous);
        }

        let token = bearer_token(headers).ok_or_else(|| unauthorized("missing bearer token"))?;
        let (header_seg, claims_seg, signature_seg) =
            split_token(token).ok_or_else(|| unauthorized("malformed token"))?;

        let token_header: TokenHeader = decode_segment(header_seg)
            .map_err(|e| unauthorized(&format!("bad token header: {e}")))?;
        if token_header.alg != "RS256" {
            return Err(unauthorized("unsupported signing algorithm"));
        }
        let claims: Claims = decode_segment(claims_seg)
            .map_err(|e| unauthorized(&format!("bad token claims: {e}")))?;

        if !ALLOWED_ISSUERS.contains(&claims.iss.as_str()) {
            return Err(unauthorized("unexpected issuer"));
        }
        if !claims.email_verified {
            return Err(unauthorized("email not verified"));
        }
        let now = Utc::now().timestamp();
        if !time_window_ok(claims.iat, claims.exp, now) {
            return Err(unauthorized("token expired or not yet valid"));
        }
        let expected = visited_url(headers, uri).ok_or_else(|| unauthorized("missing host"))?;
        if !audience_matches(&claims.aud, &expected) {
            warn!(aud = %claims.aud, expected = %expected, "audience mismatch");
            return Err(unauthorized("audience mismatch"));
        }

        let key = self
            .key_for(&token_header.kid)
            .await
            .ok_or_else(|| unauthorized("unknown signing key"))?;
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_seg)
            .map_err(|_| unauthorized("malformed signature"))?;
        let message = format!("{header_seg}.{claims_seg}");
        signature::RsaPublicKeyComponents {
            n: key.n.as_slice(),
            e: key.e.as_slice(),
        }
        .verify(
            &signature::RSA_PKCS1_2048_8192_SHA256,
            message.as_bytes(),
            &signature_bytes,
        )
        .map_err(|_| unauthorized("signature verification failed"))?;

        match self.store.find_account_by_email(&claims.email) {
            Ok(Some(account)) => {
                debug!(email = %account.email, role = %account.role, "request authenticated");
                Ok(Principal::Account(account))
            }
            Ok(None) => {
                let e = TimekeeperError::AccountNotFound {
                    email: claims.email,
                };
                Err((
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": e.to_string(), "code": e.code()})),
                ))
            }
            Err(e) => Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string(), "code": "DATABASE_ERROR"})),
            )),
        }
    }

    /// Auth + role gate for the management surface (clock actions, CRUD,
    /// tick).
    pub async fn require_timekeeper(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> Result<Principal, Rejection> {
        let principal = self.authenticate(headers, uri).await?;
        if !principal.is_timekeeper() {
            let e = TimekeeperError::PermissionDenied {
                reason: "timekeeper role required".into(),
            };
            return Err((
                StatusCode::FORBIDDEN,
                Json(json!({"error": e.to_string(), "code": e.code()})),
            ));
        }
        Ok(principal)
    }

    /// Auth gate for execute/run callbacks; both roles qualify.
    pub async fn require_executor(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> Result<Principal, Rejection> {
        self.authenticate(headers, uri).await
    }

    /// Look up the RSA key for a key id, refetching the JWKS when the cache
    /// is stale or the kid is unknown (Google rotates keys).
    async fn key_for(&self, kid: &str) -> Option<RsaKey> {
        let now = Utc::now().timestamp();
        {
            let guard = self.keys.read().await;
            if let Some(set) = guard.as_ref() {
                if set.fresh(now) {
                    if let Some(key) = set.keys.get(kid) {
                        return Some(key.clone());
                    }
                }
            }
        }

        let jwks: Jwks = match self.client.get(&self.config.certs_url).send().await {
            Ok(resp) => match resp.json().await {
                Ok(jwks) => jwks,
                Err(e) => {
                    warn!(error = %e, "JWKS response was not valid JSON");
                    return None;
                }
            },
            Err(e) => {
                warn!(url = %self.config.certs_url, error = %e, "JWKS fetch failed");
                return None;
            }
        };

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            match (
                URL_SAFE_NO_PAD.decode(&jwk.n),
                URL_SAFE_NO_PAD.decode(&jwk.e),
            ) {
                (Ok(n), Ok(e)) => {
                    keys.insert(jwk.kid, RsaKey { n, e });
                }
                _ => warn!(kid = %jwk.kid, "skipping malformed JWK"),
            }
        }
        debug!(count = keys.len(), "JWKS refreshed");

        let mut guard = self.keys.write().await;
        *guard = Some(KeySet {
            keys,
            fetched_at: now,
        });
        guard.as_ref().and_then(|set| set.keys.get(kid).cloned())
    }
}

fn unauthorized(message: &str) -> Rejection {
    let e = TimekeeperError::AuthFailed(message.to_string());
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": e.to_string(), "code": e.code()})),
    )
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn split_token(token: &str) -> Option<(&str, &str, &str)> {
    let mut parts = token.split('.');
    let header = parts.next()?;
    let claims = parts.next()?;
    let signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((header, claims, signature))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

/// `iat` (with leeway for skew) must be in the past, `exp` in the future.
fn time_window_ok(iat: i64, exp: i64, now: i64) -> bool {
    iat - IAT_LEEWAY_SECS <= now && now < exp
}

/// The URL the client visited, protocol stripped: `host` + path + query.
fn visited_url(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    Some(format!("{host}{path}"))
}

/// Tokens minted for our callbacks carry the full URL as audience; the
/// comparison is protocol-insensitive.
fn audience_matches(aud: &str, visited: &str) -> bool {
    strip_scheme(aud) == visited
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_comparison_ignores_protocol() {
        assert!(audience_matches(
            "https://acme.appspot.com/api/clocks/1/tick/",
            "acme.appspot.com/api/clocks/1/tick/"
        ));
        assert!(audience_matches(
            "acme.appspot.com/api/clocks/1/tick/",
            "acme.appspot.com/api/clocks/1/tick/"
        ));
        assert!(!audience_matches(
            "https://acme.appspot.com/api/clocks/2/tick/",
            "acme.appspot.com/api/clocks/1/tick/"
        ));
    }

    #[test]
    fn query_string_is_part_of_the_audience() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "acme.appspot.com".parse().unwrap());
        let uri: Uri = "/api/tasks/3/execute/?task_execution_id=41"
            .parse()
            .unwrap();
        assert_eq!(
            visited_url(&headers, &uri).unwrap(),
            "acme.appspot.com/api/tasks/3/execute/?task_execution_id=41"
        );
    }

    #[test]
    fn token_must_be_inside_its_validity_window() {
        assert!(time_window_ok(100, 200, 150));
        assert!(time_window_ok(100, 200, 100 - IAT_LEEWAY_SECS));
        assert!(!time_window_ok(100, 200, 200));
        assert!(!time_window_ok(300, 400, 150));
    }

    #[test]
    fn three_segments_exactly() {
        assert!(split_token("a.b.c").is_some());
        assert!(split_token("a.b").is_none());
        assert!(split_token("a.b.c.d").is_none());
    }
}
