//! Service-account token minting.
//!
//! Flow:
//!   1. Read a service account JSON key file from disk.
//!   2. Sign an RS256 JWT (using `ring`) and exchange it at the key's
//!      `token_uri` — for an OAuth access token (scheduler/queue RPCs) or
//!      for an OIDC identity token scoped to a target audience (step calls).
//!   3. Cache each token and refresh shortly before expiry.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::signature::{self, RsaKeyPair};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{RemoteError, Result};

/// Refresh window: tokens are reused only while they have at least this many
/// seconds of life left.
const EXPIRY_MARGIN_SECS: i64 = 120;
const TOKEN_LIFETIME_SECS: i64 = 3600;
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Issues bearer tokens for outbound calls.
///
/// `access_token` authenticates against the provider's own APIs;
/// `identity_token` mints an OIDC token whose audience is the step's target
/// URL, which is what the targets verify on their end.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
    async fn identity_token(&self, audience: &str) -> Result<String>;
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

impl CachedToken {
    fn fresh(&self, now: i64) -> bool {
        now + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

/// Parsed service account key material.
struct ServiceAccount {
    client_email: String,
    token_uri: String,
    private_key_der: Vec<u8>,
}

/// Raw JSON structure of a service account key file.
#[derive(Deserialize)]
struct ServiceAccountJson {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

/// Production [`TokenProvider`] backed by a service account key file.
pub struct ServiceAccountTokens {
    client: reqwest::Client,
    service_account: ServiceAccount,
    cached_access: RwLock<Option<CachedToken>>,
    /// Identity tokens are audience-scoped, so the cache is keyed by audience.
    cached_identity: RwLock<HashMap<String, CachedToken>>,
}

impl ServiceAccountTokens {
    /// Create from a service account JSON key file.
    pub fn from_file(path: &str) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| RemoteError::Token(format!("cannot read service account key: {e}")))?;
        let sa_json: ServiceAccountJson = serde_json::from_str(&data)
            .map_err(|e| RemoteError::Token(format!("invalid service account JSON: {e}")))?;
        let private_key_der = pem_to_der(&sa_json.private_key)?;

        Ok(Self {
            client: reqwest::Client::new(),
            service_account: ServiceAccount {
                client_email: sa_json.client_email,
                token_uri: sa_json.token_uri,
                private_key_der,
            },
            cached_access: RwLock::new(None),
            cached_identity: RwLock::new(HashMap::new()),
        })
    }

    /// Sign an RS256 JWT over the given claims.
    fn sign_jwt(&self, claims: &serde_json::Value) -> Result<String> {
        let header = serde_json::json!({"alg": "RS256", "typ": "JWT"});
        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        let message = format!("{header_b64}.{claims_b64}");

        let key_pair = RsaKeyPair::from_pkcs8(&self.service_account.private_key_der)
            .map_err(|e| RemoteError::Token(format!("invalid RSA private key: {e}")))?;
        let mut sig = vec![0u8; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                message.as_bytes(),
                &mut sig,
            )
            .map_err(|e| RemoteError::Token(format!("RSA signing failed: {e}")))?;

        Ok(format!("{message}.{}", URL_SAFE_NO_PAD.encode(&sig)))
    }

    /// Exchange a signed assertion at the token endpoint.
    async fn exchange(&self, claims: serde_json::Value, want_id_token: bool) -> Result<CachedToken> {
        let now = chrono::Utc::now().timestamp();
        let jwt = self.sign_jwt(&claims)?;

        let resp = self
            .client
            .post(&self.service_account.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Token(format!("token exchange failed: {text}")));
        }

        let token_resp: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Token(e.to_string()))?;

        let token = if want_id_token {
            token_resp.id_token
        } else {
            token_resp.access_token
        }
        .ok_or_else(|| RemoteError::Token("token endpoint returned no token".to_string()))?;

        debug!(expires_in = token_resp.expires_in, "token obtained");
        Ok(CachedToken {
            token,
            expires_at: now + token_resp.expires_in as i64,
        })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();

        // Fast path
        {
            let cached = self.cached_access.read().await;
            if let Some(ref c) = *cached {
                if c.fresh(now) {
                    return Ok(c.token.clone());
                }
            }
        }

        let mut cached = self.cached_access.write().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(ref c) = *cached {
            if c.fresh(now) {
                return Ok(c.token.clone());
            }
        }

        info!("exchanging service account JWT for access token");
        let claims = serde_json::json!({
            "iss": self.service_account.client_email,
            "scope": CLOUD_PLATFORM_SCOPE,
            "aud": self.service_account.token_uri,
            "iat": now,
            "exp": now + TOKEN_LIFETIME_SECS,
        });
        let new_token = self.exchange(claims, false).await?;
        let result = new_token.token.clone();
        *cached = Some(new_token);
        Ok(result)
    }

    async fn identity_token(&self, audience: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();

        {
            let cached = self.cached_identity.read().await;
            if let Some(c) = cached.get(audience) {
                if c.fresh(now) {
                    return Ok(c.token.clone());
                }
            }
        }

        let mut cached = self.cached_identity.write().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(c) = cached.get(audience) {
            if c.fresh(now) {
                return Ok(c.token.clone());
            }
        }

        info!(audience, "exchanging service account JWT for identity token");
        let claims = serde_json::json!({
            "iss": self.service_account.client_email,
            "sub": self.service_account.client_email,
            "target_audience": audience,
            "aud": self.service_account.token_uri,
            "iat": now,
            "exp": now + TOKEN_LIFETIME_SECS,
        });
        let new_token = self.exchange(claims, true).await?;
        let result = new_token.token.clone();
        cached.insert(audience.to_string(), new_token);
        Ok(result)
    }
}

fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;

    let b64: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("");
    STANDARD
        .decode(b64.trim())
        .map_err(|e| RemoteError::Token(format!("invalid PEM in private key: {e}")))
}
