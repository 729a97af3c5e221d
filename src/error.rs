//! Unified error handling for relayd.
//!
//! One enum maps collaborator failures (storage, bus, queue, decoding) onto
//! the protocol-visible error taxonomy, with a single place to decide
//! whether an error closes the connection or gets reported in-band.

use relay_proto::{Envelope, ProtoError};
use thiserror::Error;

use crate::bus::BusError;
use crate::db::StoreError;
use crate::history::HistoryError;

/// Errors that can occur while handling a single request.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("authentication failed")]
    AuthFailed,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("not attending a channel")]
    NotAttending,

    #[error("invalid channel")]
    InvalidChannel,

    #[error("channel is not a group chat")]
    NotGroupChat,

    #[error("not a member of this channel")]
    NotMember,

    #[error("Blank message is not accepted")]
    BlankMessage,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("bus disconnected: {0}")]
    BusDisconnected(String),

    #[error("unrecognized method: {0}")]
    UnknownMethod(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => RelayError::InvalidChannel,
            other => RelayError::StorageError(other.to_string()),
        }
    }
}

impl From<HistoryError> for RelayError {
    fn from(err: HistoryError) -> Self {
        RelayError::StorageError(err.to_string())
    }
}

impl From<BusError> for RelayError {
    fn from(err: BusError) -> Self {
        RelayError::BusDisconnected(err.to_string())
    }
}

impl RelayError {
    /// Static label used for metrics, mirroring the error-code convention
    /// used elsewhere for IRC-style error classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthFailed => "auth_failed",
            Self::Unauthenticated => "unauthenticated",
            Self::NotAttending => "not_attending",
            Self::InvalidChannel => "invalid_channel",
            Self::NotGroupChat => "not_group_chat",
            Self::NotMember => "not_member",
            Self::BlankMessage => "blank_message",
            Self::StorageError(_) => "storage_error",
            Self::BusDisconnected(_) => "bus_disconnected",
            Self::UnknownMethod(_) => "unknown_method",
            Self::Protocol(_) => "protocol_error",
        }
    }

    /// Whether this error is protocol-fatal and the caller must close the
    /// connection rather than reply in-band.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            Self::AuthFailed
                | Self::Unauthenticated
                | Self::NotAttending
                | Self::UnknownMethod(_)
                | Self::Protocol(_)
        )
    }

    /// Build the `{method, status:"ERROR", reason}` reply for errors that
    /// don't close the connection. Returns `None` for fatal errors, which
    /// have no client-visible reply — the caller just drops the socket.
    pub fn to_error_reply(&self, method: &str) -> Option<Envelope> {
        if self.closes_connection() {
            return None;
        }
        Some(Envelope::error(method, self.to_string()))
    }
}
