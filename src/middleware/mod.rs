//! Pipeline stages. Global ones wrap every route; the API and admin groups
//! add their own authentication.

mod admin_session;
mod api_key;
mod client_auth;
mod cors;
mod payload_crypto;
mod rate_limit;
mod security_headers;

pub use admin_session::{AdminSession, AdminTokenValidator, SessionValidator};
pub use api_key::ApiKeyAuth;
pub use client_auth::{
    AcceptAnySignature, ClientAuth, HmacSignature, REPLAY_WINDOW_SECS, SignaturePolicy,
};
pub use cors::Cors;
pub use payload_crypto::PayloadCrypto;
pub use rate_limit::RateLimit;
pub use security_headers::SecurityHeaders;
