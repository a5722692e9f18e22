//! Bearer token verification for chat connections.

pub mod token;

pub use token::{AuthError, Claims, TokenIssuer, TokenVerifier, MAX_TOKEN_SIZE_BYTES};
