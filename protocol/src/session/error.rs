//! Validation failures reported by the [`CredentialStore`](super::CredentialStore).

use thiserror::Error;

/// Why a presented token was rejected.
///
/// Callers outside the session layer collapse all of these into a single
/// "invalid session" outcome; the variants exist so the reason can be
/// logged and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No live session carries this token.
    #[error("token not found")]
    TokenNotFound,

    /// The session reached its expiration instant.
    #[error("token expired")]
    TokenExpired,

    /// The token was issued to a different username than the one claimed.
    #[error("token presented for a different identity")]
    IdentityMismatch,

    /// The token was issued to a different client address.
    #[error("token presented from a different address")]
    AddressMismatch,
}

impl SessionError {
    /// Short label used for log fields and metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TokenNotFound => "not_found",
            Self::TokenExpired => "expired",
            Self::IdentityMismatch => "identity_mismatch",
            Self::AddressMismatch => "address_mismatch",
        }
    }

    /// `true` for the mismatch outcomes that are treated as a possible
    /// token compromise.
    pub fn is_compromise(&self) -> bool {
        matches!(self, Self::IdentityMismatch | Self::AddressMismatch)
    }
}
