use serde::Deserialize;
use serde_json::Value;

fn bearer() -> String {
    "Bearer".to_string()
}

/// Raw body of a token-endpoint response.
///
/// `refresh_token` may legitimately be absent: the client-credentials grant
/// never issues one, and refresh responses are allowed to omit it.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// One window of a paginated listing as the API returns it.
///
/// Offset-based listings carry `total`, `limit` and `offset`; cursor-based
/// ones replace `offset` with an opaque `cursors` object. `next` is present
/// iff more items may exist beyond this window.
#[derive(Debug, Clone, Deserialize)]
pub struct PageObject {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub cursors: Option<Cursors>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub after: Option<String>,
}
