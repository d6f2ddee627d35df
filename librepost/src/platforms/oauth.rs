//! OAuth 1.0a request signing (HMAC-SHA1)
//!
//! X accepts OAuth 1.0a user-context requests signed with the app's consumer
//! keys and the bot account's access token. Unlike OAuth 2.0 user tokens these
//! credentials do not expire, so a scheduled job can keep using them.
//!
//! Query parameters take part in the signature; JSON bodies do not.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;

use crate::error::{PlatformError, Result};

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

/// Consumer keys of the X app plus the access token pair of the bot account
#[derive(Debug)]
pub struct OAuth1Credentials {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub access_token: SecretString,
    pub access_secret: SecretString,
}

impl OAuth1Credentials {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: SecretString::from(consumer_key.into()),
            consumer_secret: SecretString::from(consumer_secret.into()),
            access_token: SecretString::from(access_token.into()),
            access_secret: SecretString::from(access_secret.into()),
        }
    }

    /// True when none of the four values is blank
    pub fn is_complete(&self) -> bool {
        [
            &self.consumer_key,
            &self.consumer_secret,
            &self.access_token,
            &self.access_secret,
        ]
        .iter()
        .all(|s| !s.expose_secret().trim().is_empty())
    }

    /// Build the `Authorization` header value for one request.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method of the request
    /// * `url` - request URL without its query string
    /// * `params` - query parameters sent with the request
    pub fn authorization(&self, method: &Method, url: &str, params: &[(&str, String)]) -> Result<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp();
        self.authorization_with(method, url, params, &nonce, timestamp)
    }

    /// Same as [`authorization`](Self::authorization) with a fixed nonce and timestamp
    pub fn authorization_with(
        &self,
        method: &Method,
        url: &str,
        params: &[(&str, String)],
        nonce: &str,
        timestamp: i64,
    ) -> Result<String> {
        let mut oauth_params: Vec<(&str, String)> = vec![
            ("oauth_consumer_key", self.consumer_key.expose_secret().to_string()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_token", self.access_token.expose_secret().to_string()),
            ("oauth_version", OAUTH_VERSION.to_string()),
        ];

        let signed: Vec<(&str, &str)> = oauth_params
            .iter()
            .chain(params.iter())
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        let base = signature_base_string(method, url, &signed);
        let signature = sign(
            &base,
            self.consumer_secret.expose_secret(),
            self.access_secret.expose_secret(),
        )?;
        oauth_params.push(("oauth_signature", signature));
        oauth_params.sort_by(|a, b| a.0.cmp(b.0));

        let fields = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {}", fields))
    }
}

/// `METHOD&url&params`, each part percent-encoded, parameters sorted after encoding
pub fn signature_base_string(method: &Method, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.as_str(),
        percent_encode(url),
        percent_encode(&normalized)
    )
}

/// HMAC-SHA1 over the base string, base64 encoded
pub fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String> {
    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| PlatformError::Authentication(format!("Could not create request signer: {}", e)))?;
    mac.update(base.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// RFC 3986 encoding: everything but `A-Z a-z 0-9 - . _ ~`
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
