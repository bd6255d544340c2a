//! Webhook origin verification.
//!
//! The sender signs `url + name1 + value1 + name2 + value2 ...` (names sorted, repeated
//! values concatenated in arrival order) with HMAC-SHA1 over the shared secret and sends
//! the base64 digest in a header. Verification fails closed: anything that prevents a
//! clean recomputation counts as a mismatch.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;

use crate::errors::AuthenticationError;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Transport-neutral view of an inbound webhook, before verification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundRequest {
    pub host: Option<String>,
    pub path_and_query: String,
    pub params: Vec<(String, String)>,
    pub signature: Option<String>,
}

/// An inbound request whose origin has been authenticated. Only `WebhookVerifier` builds one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedRequest {
    url: String,
    params: Vec<(String, String)>,
}

impl VerifiedRequest {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    secret: Option<SecretString>,
    public_url: Option<String>,
}

impl WebhookVerifier {
    pub fn new(secret: Option<SecretString>, public_url: Option<String>) -> Self {
        Self { secret, public_url }
    }

    /// The URL exactly as the sender would have requested it.
    pub fn reconstruct_url(
        &self,
        request: &InboundRequest,
    ) -> Result<String, AuthenticationError> {
        let path = match request.path_and_query.as_str() {
            "" => "/",
            path => path,
        };
        if !path.starts_with('/') {
            return Err(AuthenticationError::MalformedRequest(
                "path must be absolute".to_string(),
            ));
        }

        if let Some(base) = &self.public_url {
            return Ok(format!("{}{path}", base.trim_end_matches('/')));
        }

        let host = request
            .host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| AuthenticationError::MalformedRequest("missing host".to_string()))?;
        if host.contains('/') || host.contains(char::is_whitespace) {
            return Err(AuthenticationError::MalformedRequest("invalid host".to_string()));
        }

        let scheme = if is_local_host(host) { "http" } else { "https" };
        Ok(format!("{scheme}://{host}{path}"))
    }

    pub fn verify(&self, request: InboundRequest) -> Result<VerifiedRequest, AuthenticationError> {
        let secret = self
            .secret
            .as_ref()
            .map(|secret| secret.expose_secret())
            .filter(|secret| !secret.is_empty())
            .ok_or(AuthenticationError::MissingSecret)?;
        let provided = request
            .signature
            .as_deref()
            .map(str::trim)
            .filter(|signature| !signature.is_empty())
            .ok_or(AuthenticationError::MissingSignature)?;
        let provided =
            BASE64.decode(provided).map_err(|_| AuthenticationError::SignatureMismatch)?;

        let url = self.reconstruct_url(&request)?;
        let mut mac = keyed_mac(secret.as_bytes())?;
        mac.update(canonical_payload(&url, &request.params).as_bytes());
        mac.verify_slice(&provided).map_err(|_| AuthenticationError::SignatureMismatch)?;

        Ok(VerifiedRequest { url, params: request.params })
    }

    pub fn is_authentic(&self, request: &InboundRequest) -> bool {
        self.verify(request.clone()).is_ok()
    }
}

/// `url` followed by every parameter name and its concatenated values, names in byte order.
pub fn canonical_payload(url: &str, params: &[(String, String)]) -> String {
    let mut names: Vec<&str> = params.iter().map(|(name, _)| name.as_str()).collect();
    names.sort_unstable();
    names.dedup();

    let mut payload = url.to_string();
    for name in names {
        payload.push_str(name);
        for (_, value) in params.iter().filter(|(candidate, _)| candidate == name) {
            payload.push_str(value);
        }
    }
    payload
}

/// Base64 HMAC-SHA1 signature the sender would attach for `url` and `params`.
pub fn compute_signature(
    secret: &[u8],
    url: &str,
    params: &[(String, String)],
) -> Result<String, AuthenticationError> {
    let mut mac = keyed_mac(secret)?;
    mac.update(canonical_payload(url, params).as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn keyed_mac(secret: &[u8]) -> Result<HmacSha1, AuthenticationError> {
    if secret.is_empty() {
        return Err(AuthenticationError::MissingSecret);
    }
    HmacSha1::new_from_slice(secret).map_err(|_| AuthenticationError::MissingSecret)
}

fn is_local_host(host: &str) -> bool {
    let bare = if let Some(rest) = host.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.rsplit_once(':').map(|(name, _)| name).unwrap_or(host)
    };
    LOCAL_HOSTS.iter().any(|local| bare.eq_ignore_ascii_case(local))
}
