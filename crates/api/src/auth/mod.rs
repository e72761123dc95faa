//! Bearer token validation.
//!
//! Tokens are issued by the external auth provider; the server only verifies
//! them and reads the participant identity from the claims.

pub mod jwt;
