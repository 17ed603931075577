//! OAuth 2.0 support: grant flows, the credential value they produce and the
//! session that keeps it fresh.

pub mod flows;
pub mod response;
pub mod session;

pub use flows::{AuthorizationCodeFlow, ClientCredentialsFlow, EasyAuthCodeFlow, GrantFlow};
pub use response::Credential;
pub use session::AuthSession;
