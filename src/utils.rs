use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::error::Error;

pub fn generate_code_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(128)
        .map(char::from)
        .collect()
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Extracts the authorization code from the redirect URL the user lands on
/// after granting consent.
pub fn code_from_redirect(redirect: &str) -> crate::Result<String> {
    let url = Url::parse(redirect.trim())
        .map_err(|e| Error::Authentication(format!("unable to parse redirect url: {e}")))?;

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| Error::Authentication("redirect url is missing the code parameter".into()))
}
