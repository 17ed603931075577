use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TokenResponse;

/// An access credential together with the metadata needed to authorize a
/// request and know when it expires.
///
/// A `Credential` is created from a token-endpoint response and is never
/// mutated afterwards: every refresh produces a new value that supersedes
/// the old one, so concurrent readers can never observe a half-updated
/// token.
///
/// `created_at` and `expires_at` are computed at creation from the
/// server-reported lifetime and are serialized as ISO-8601 timestamps, which
/// makes the serde round-trip of this struct double as the on-disk storage
/// format used by [`EasyAuthCodeFlow`](crate::EasyAuthCodeFlow).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Builds a credential from a freshly received token response, stamping
    /// it with the current time.
    pub(crate) fn from_response(response: TokenResponse) -> Self {
        let created_at = Utc::now();
        let expires_at = created_at + Duration::seconds(response.expires_in as i64);

        Credential {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            scope: response.scope,
            refresh_token: response.refresh_token,
            created_at,
            expires_at,
        }
    }

    /// The value of the `Authorization` header this credential grants,
    /// e.g. `Bearer BQC4...`.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Seconds until this credential expires; negative once it already has.
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds()
    }
}
