//! Web Push delivery (RFC 8291 payload encryption, RFC 8292 VAPID).

use std::time::Duration;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit};
use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use dashmap::DashMap;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::SigningKey;
use p256::ecdsa::signature::Signer;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;
use sha2::Sha256;
use url::Url;

use crate::database::models::PushSubscriptionDbModel;
use crate::notification::dispatcher::{DeliveryError, PushDelivery};
use crate::notification::message::{MAX_PUSH_PAYLOAD_BYTES, truncate_string};
use crate::utils::http_client;
use crate::{Error, Result};

const SALT_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;
const DEFAULT_RS: u32 = 4096;
const DEFAULT_TTL_SECS: u32 = 3600;
const REQUEST_TIMEOUT_SECS: u64 = 15;
const MAX_RETRY_AFTER_SECS: u64 = 30;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(REQUEST_TIMEOUT_SECS);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(MAX_RETRY_AFTER_SECS);

/// Worst case for one [`WebPushClient::deliver`]: a request, the longest
/// honoured `Retry-After`, then the retried request.
pub const MAX_DELIVERY_TIME: Duration =
    Duration::from_secs(2 * REQUEST_TIMEOUT_SECS + MAX_RETRY_AFTER_SECS);
const VAPID_JWT_EXP_SECS: i64 = 12 * 60 * 60;
const VAPID_JWT_SKEW_SECS: i64 = 60;

const IKM_INFO_PREFIX: &str = "WebPush: info\0";
const KEY_INFO: &str = "Content-Encoding: aes128gcm\0";
const NONCE_INFO: &str = "Content-Encoding: nonce\0";

#[derive(Debug, Clone)]
struct CachedVapidJwt {
    jwt: String,
    exp_unix: i64,
}

/// VAPID identity used to sign push requests.
#[derive(Clone)]
pub struct WebPushConfig {
    vapid_public_key_b64: String,
    vapid_private_key_raw: [u8; 32],
    vapid_subject: String,
}

impl std::fmt::Debug for WebPushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebPushConfig")
            .field("vapid_public_key_b64", &self.vapid_public_key_b64)
            .field("vapid_private_key_raw", &"<redacted>")
            .field("vapid_subject", &self.vapid_subject)
            .finish()
    }
}

impl WebPushConfig {
    /// Validate a base64url key pair.
    ///
    /// The public key must be the uncompressed point of the private key.
    pub fn new(
        public_key_b64: impl Into<String>,
        private_key_b64: &str,
        subject: impl Into<String>,
    ) -> Result<Self> {
        let vapid_public_key_b64 = public_key_b64.into().trim().to_string();

        let public_raw = decode_b64url(&vapid_public_key_b64)
            .map_err(|e| Error::config(format!("Invalid VAPID public key: {}", e)))?;
        let private_raw = decode_b64url(private_key_b64.trim())
            .map_err(|e| Error::config(format!("Invalid VAPID private key: {}", e)))?;

        if public_raw.len() != PUBLIC_KEY_LEN {
            return Err(Error::config(format!(
                "VAPID public key must decode to {} bytes",
                PUBLIC_KEY_LEN
            )));
        }
        let private_raw: [u8; 32] = private_raw
            .try_into()
            .map_err(|_| Error::config("VAPID private key must decode to 32 bytes"))?;

        let signing_key = SigningKey::from_bytes((&private_raw).into())
            .map_err(|_| Error::config("VAPID private key is not a valid P-256 scalar"))?;
        let derived = signing_key.verifying_key().to_encoded_point(false);
        if derived.as_bytes() != public_raw.as_slice() {
            return Err(Error::config(
                "VAPID public key does not match the private key",
            ));
        }

        Ok(Self {
            vapid_public_key_b64,
            vapid_private_key_raw: private_raw,
            vapid_subject: subject.into(),
        })
    }

    /// Read the key pair from a variable lookup.
    ///
    /// Returns `Ok(None)` when neither key is set. Only one half of the pair
    /// is a configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let public = non_empty(&["PUBLIC_VAPID_KEY", "WEB_PUSH_VAPID_PUBLIC_KEY"]);
        let private = non_empty(&["PRIVATE_VAPID_KEY", "WEB_PUSH_VAPID_PRIVATE_KEY"]);

        let (public, private) = match (public, private) {
            (None, None) => return Ok(None),
            (Some(public), Some(private)) => (public, private),
            _ => {
                return Err(Error::config(
                    "Both PUBLIC_VAPID_KEY and PRIVATE_VAPID_KEY must be set",
                ));
            }
        };

        let subject = non_empty(&["WEB_PUSH_VAPID_SUBJECT"])
            .or_else(|| non_empty(&["EMAIL_USER"]).map(|user| format!("mailto:{}", user)))
            .unwrap_or_else(|| "mailto:admin@localhost".to_string());

        Self::new(public, &private, subject).map(Some)
    }

    pub fn vapid_public_key_b64(&self) -> &str {
        &self.vapid_public_key_b64
    }

    pub fn vapid_subject(&self) -> &str {
        &self.vapid_subject
    }
}

/// HTTP push client. Holds no subscription state.
#[derive(Debug)]
pub struct WebPushClient {
    config: WebPushConfig,
    client: reqwest::Client,
    vapid_jwt_cache: DashMap<String, CachedVapidJwt>,
}

impl WebPushClient {
    pub fn new(config: WebPushConfig) -> Result<Self> {
        let client = http_client::build_client(REQUEST_TIMEOUT)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: WebPushConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            vapid_jwt_cache: DashMap::new(),
        }
    }

    pub fn vapid_public_key(&self) -> &str {
        self.config.vapid_public_key_b64()
    }

    async fn post(
        &self,
        endpoint: &str,
        body: Vec<u8>,
        authorization: &str,
    ) -> std::result::Result<reqwest::Response, DeliveryError> {
        self.client
            .post(endpoint)
            .header("TTL", DEFAULT_TTL_SECS.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Urgency", "normal")
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }

    fn get_or_build_vapid_jwt(&self, aud: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        if let Some(entry) = self.vapid_jwt_cache.get(aud)
            && entry.exp_unix - VAPID_JWT_SKEW_SECS > now
        {
            return Ok(entry.jwt.clone());
        }

        let (jwt, exp_unix) = build_vapid_jwt(
            aud,
            &self.config.vapid_subject,
            &self.config.vapid_private_key_raw,
            VAPID_JWT_EXP_SECS,
        )?;
        self.vapid_jwt_cache.insert(
            aud.to_string(),
            CachedVapidJwt {
                jwt: jwt.clone(),
                exp_unix,
            },
        );
        Ok(jwt)
    }
}

#[async_trait]
impl PushDelivery for WebPushClient {
    async fn deliver(
        &self,
        sub: &PushSubscriptionDbModel,
        payload: &[u8],
    ) -> std::result::Result<(), DeliveryError> {
        if payload.len() > MAX_PUSH_PAYLOAD_BYTES {
            return Err(DeliveryError::PayloadTooLarge(payload.len()));
        }

        let aud = push_service_audience(&sub.endpoint)
            .map_err(|e| DeliveryError::InvalidSubscription(e.to_string()))?;
        let jwt = self
            .get_or_build_vapid_jwt(&aud)
            .map_err(|e| DeliveryError::Other(e.to_string()))?;

        let client_pub: [u8; PUBLIC_KEY_LEN] = decode_b64url(&sub.p256dh)
            .ok()
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| DeliveryError::InvalidSubscription("bad p256dh key".to_string()))?;
        let client_auth: [u8; AUTH_SECRET_LEN] = decode_b64url(&sub.auth)
            .ok()
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| DeliveryError::InvalidSubscription("bad auth secret".to_string()))?;

        let body = encrypt_aes128gcm(payload, &client_pub, &client_auth)
            .map_err(|e| DeliveryError::InvalidSubscription(e.to_string()))?;

        let authorization = format!("vapid t={}, k={}", jwt, self.config.vapid_public_key_b64);

        let mut response = self
            .post(&sub.endpoint, body.clone(), &authorization)
            .await?;

        if response.status().as_u16() == 429
            && let Some(delay) = retry_after_delay(&response)
            && delay <= MAX_RETRY_AFTER
        {
            tokio::time::sleep(delay).await;
            response = self.post(&sub.endpoint, body, &authorization).await?;
        }

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());

        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body: truncate_string(&body_text, 500),
        })
    }
}

/// VAPID `aud` claim: scheme, host and explicit port of the endpoint.
fn push_service_audience(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::web_push(format!("Invalid push endpoint URL: {}", e)))?;
    let host = url
        .host()
        .ok_or_else(|| Error::web_push("Push endpoint missing host"))?;

    let host = match host {
        url::Host::Domain(d) => d.to_string(),
        url::Host::Ipv4(ip) => ip.to_string(),
        url::Host::Ipv6(ip) => format!("[{}]", ip),
    };

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

fn retry_after_delay(response: &reqwest::Response) -> Option<Duration> {
    let value = response.headers().get("Retry-After")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn decode_b64url(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(input.trim_end_matches('=').as_bytes())
}

fn encode_b64url(input: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| Error::web_push("HKDF expand failed"))?;
    Ok(okm)
}

/// Encrypt `plaintext` as a single aes128gcm record for the given receiver.
///
/// Output is the full request body: salt, record size, sender key, ciphertext.
fn encrypt_aes128gcm(
    plaintext: &[u8],
    remote_public_key_raw: &[u8; PUBLIC_KEY_LEN],
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<Vec<u8>> {
    if plaintext.is_empty() {
        return Err(Error::web_push("Web push payload cannot be empty"));
    }

    let mut salt = [0u8; SALT_LEN];
    let mut rng = OsRng;
    rng.fill_bytes(&mut salt);

    let remote_pub = p256::PublicKey::from_sec1_bytes(remote_public_key_raw)
        .map_err(|_| Error::web_push("Invalid remote public key"))?;

    let local_secret = EphemeralSecret::random(&mut rng);
    let local_pub = p256::PublicKey::from(&local_secret).to_encoded_point(false);
    let local_pub_raw: [u8; PUBLIC_KEY_LEN] = local_pub
        .as_bytes()
        .try_into()
        .map_err(|_| Error::web_push("Invalid local public key length"))?;

    let shared_secret = local_secret.diffie_hellman(&remote_pub);

    let mut ikm_info = Vec::with_capacity(IKM_INFO_PREFIX.len() + PUBLIC_KEY_LEN * 2);
    ikm_info.extend_from_slice(IKM_INFO_PREFIX.as_bytes());
    ikm_info.extend_from_slice(remote_public_key_raw);
    ikm_info.extend_from_slice(&local_pub_raw);

    let ikm = hkdf_sha256(
        auth_secret,
        shared_secret.raw_secret_bytes().as_slice(),
        &ikm_info,
        32,
    )?;
    let cek = hkdf_sha256(&salt, &ikm, KEY_INFO.as_bytes(), 16)?;
    let nonce = hkdf_sha256(&salt, &ikm, NONCE_INFO.as_bytes(), 12)?;

    let cipher =
        Aes128Gcm::new_from_slice(&cek).map_err(|_| Error::web_push("Invalid CEK length"))?;

    // Single record: the sequence number is zero, so the IV is the nonce itself.
    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(2); // last-record delimiter

    let ciphertext = cipher
        .encrypt(aes_gcm::Nonce::from_slice(&nonce), padded.as_slice())
        .map_err(|_| Error::web_push("AES-GCM encryption failed"))?;

    let mut body = Vec::with_capacity(SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&DEFAULT_RS.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(&local_pub_raw);
    body.extend_from_slice(&ciphertext);

    Ok(body)
}

/// Build an ES256 VAPID JWT. Returns the token and its `exp` (Unix seconds).
fn build_vapid_jwt(
    aud: &str,
    subject: &str,
    private_key_raw: &[u8; 32],
    exp_secs: i64,
) -> Result<(String, i64)> {
    #[derive(Serialize)]
    struct Claims<'a> {
        aud: &'a str,
        exp: i64,
        sub: &'a str,
    }

    let header = serde_json::json!({ "typ": "JWT", "alg": "ES256" });
    let exp_unix = Utc::now().timestamp() + exp_secs;
    let claims = Claims {
        aud,
        exp: exp_unix,
        sub: subject,
    };

    let header_b64 = encode_b64url(serde_json::to_string(&header)?.as_bytes());
    let claims_b64 = encode_b64url(serde_json::to_string(&claims)?.as_bytes());
    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let signing_key = SigningKey::from_bytes(private_key_raw.into())
        .map_err(|_| Error::web_push("Invalid VAPID private key"))?;
    let sig: p256::ecdsa::Signature = signing_key.sign(signing_input.as_bytes());

    Ok((
        format!("{}.{}", signing_input, encode_b64url(&sig.to_bytes())),
        exp_unix,
    ))
}

/// Generate a fresh VAPID key pair as base64url `(public, private)`.
pub fn generate_vapid_keys() -> (String, String) {
    let signing_key = SigningKey::random(&mut OsRng);
    let public_raw = signing_key.verifying_key().to_encoded_point(false);
    (
        encode_b64url(public_raw.as_bytes()),
        encode_b64url(&signing_key.to_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::VerifyingKey;
    use p256::ecdsa::signature::Verifier;

    fn config() -> WebPushConfig {
        let (public, private) = generate_vapid_keys();
        WebPushConfig::new(public, &private, "mailto:owner@example.com").unwrap()
    }

    #[test]
    fn test_config_accepts_generated_pair() {
        let (public, private) = generate_vapid_keys();
        let config = WebPushConfig::new(public.clone(), &private, "mailto:a@b.c").unwrap();
        assert_eq!(config.vapid_public_key_b64(), public);
    }

    #[test]
    fn test_config_rejects_mismatched_pair() {
        let (public, _) = generate_vapid_keys();
        let (_, private) = generate_vapid_keys();
        assert!(WebPushConfig::new(public, &private, "mailto:a@b.c").is_err());
    }

    #[test]
    fn test_from_lookup() {
        let (public, private) = generate_vapid_keys();

        let none = WebPushConfig::from_lookup(|_| None).unwrap();
        assert!(none.is_none());

        let half = WebPushConfig::from_lookup(|k| (k == "PUBLIC_VAPID_KEY").then(|| public.clone()));
        assert!(half.is_err());

        let full = WebPushConfig::from_lookup(|k| match k {
            "PUBLIC_VAPID_KEY" => Some(public.clone()),
            "PRIVATE_VAPID_KEY" => Some(private.clone()),
            "EMAIL_USER" => Some("owner@example.com".to_string()),
            _ => None,
        })
        .unwrap()
        .unwrap();
        assert_eq!(full.vapid_subject(), "mailto:owner@example.com");
    }

    #[test]
    fn test_push_service_audience() {
        assert_eq!(
            push_service_audience("https://fcm.googleapis.com/fcm/send/abc").unwrap(),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            push_service_audience("http://127.0.0.1:8080/push/1").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert!(push_service_audience("not a url").is_err());
    }

    #[test]
    fn test_vapid_jwt_signature_verifies() {
        let (public, private) = generate_vapid_keys();
        let private_raw: [u8; 32] = decode_b64url(&private).unwrap().try_into().unwrap();

        let (jwt, exp) =
            build_vapid_jwt("https://push.example", "mailto:a@b.c", &private_raw, 60).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let claims: serde_json::Value =
            serde_json::from_slice(&decode_b64url(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://push.example");
        assert_eq!(claims["exp"], exp);

        let verifying_key = VerifyingKey::from_sec1_bytes(&decode_b64url(&public).unwrap()).unwrap();
        let sig = p256::ecdsa::Signature::from_slice(&decode_b64url(parts[2]).unwrap()).unwrap();
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        assert!(verifying_key.verify(signing_input.as_bytes(), &sig).is_ok());
    }

    #[test]
    fn test_jwt_is_cached_per_audience() {
        let client = WebPushClient::new(config()).unwrap();
        let a = client.get_or_build_vapid_jwt("https://a.example").unwrap();
        let a_again = client.get_or_build_vapid_jwt("https://a.example").unwrap();
        let b = client.get_or_build_vapid_jwt("https://b.example").unwrap();
        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }

    /// Decrypt as a user agent would, to check the record layout and key schedule.
    #[test]
    fn test_encrypted_record_decrypts_for_receiver() {
        let receiver = p256::SecretKey::random(&mut OsRng);
        let receiver_pub: [u8; PUBLIC_KEY_LEN] = receiver
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .try_into()
            .unwrap();
        let mut auth = [0u8; AUTH_SECRET_LEN];
        OsRng.fill_bytes(&mut auth);

        let plaintext = br#"{"title":"t","body":"b"}"#;
        let body = encrypt_aes128gcm(plaintext, &receiver_pub, &auth).unwrap();

        let salt = &body[..SALT_LEN];
        let rs = u32::from_be_bytes(body[SALT_LEN..SALT_LEN + 4].try_into().unwrap());
        assert_eq!(rs, DEFAULT_RS);
        let idlen = body[SALT_LEN + 4] as usize;
        assert_eq!(idlen, PUBLIC_KEY_LEN);
        let sender_pub = &body[SALT_LEN + 5..SALT_LEN + 5 + idlen];
        let ciphertext = &body[SALT_LEN + 5 + idlen..];

        let sender = p256::PublicKey::from_sec1_bytes(sender_pub).unwrap();
        let shared = p256::ecdh::diffie_hellman(receiver.to_nonzero_scalar(), sender.as_affine());

        let mut info = Vec::new();
        info.extend_from_slice(IKM_INFO_PREFIX.as_bytes());
        info.extend_from_slice(&receiver_pub);
        info.extend_from_slice(sender_pub);
        let ikm = hkdf_sha256(&auth, shared.raw_secret_bytes().as_slice(), &info, 32).unwrap();
        let cek = hkdf_sha256(salt, &ikm, KEY_INFO.as_bytes(), 16).unwrap();
        let nonce = hkdf_sha256(salt, &ikm, NONCE_INFO.as_bytes(), 12).unwrap();

        let cipher = Aes128Gcm::new_from_slice(&cek).unwrap();
        let mut decrypted = cipher
            .decrypt(aes_gcm::Nonce::from_slice(&nonce), ciphertext)
            .unwrap();
        assert_eq!(decrypted.pop(), Some(2));
        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn test_invalid_keys_are_classified_before_any_request() {
        let client = WebPushClient::new(config()).unwrap();
        let sub = PushSubscriptionDbModel::new("https://push.example/x", "not-a-key", "nope");
        let err = client.deliver(&sub, b"{}").await.unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidSubscription(_)));
        assert!(!err.is_gone());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected() {
        let client = WebPushClient::new(config()).unwrap();
        let sub = PushSubscriptionDbModel::new("https://push.example/x", "k", "a");
        let payload = vec![b'x'; MAX_PUSH_PAYLOAD_BYTES + 1];
        let err = client.deliver(&sub, &payload).await.unwrap_err();
        assert!(matches!(err, DeliveryError::PayloadTooLarge(_)));
    }
}
