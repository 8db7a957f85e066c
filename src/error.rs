//! Error conditions raised by [`ResumableReader`](crate::ResumableReader).
//!
//! The reader speaks `std::io`, so every [`RemoteError`] travels inside an
//! [`io::Error`] with a matching [`io::ErrorKind`]. Generic stream code sees the
//! kind; callers that care about the exact condition recover it with
//! [`RemoteError::from_io`].

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// The reader was closed, or the operation needs a size that is unknown.
    #[error("{op}: {reason}")]
    Unavailable { op: &'static str, reason: &'static str },

    /// Negative position or otherwise unusable argument.
    #[error("{op}: {reason}")]
    InvalidArgument { op: &'static str, reason: String },

    /// No connection opener was configured.
    #[error("{op}: cannot open: no connection opener configured")]
    NotImplemented { op: &'static str },

    /// The opener itself failed.
    #[error("{op}: failed to open at offset {offset}: {source}")]
    Open {
        op: &'static str,
        offset: u64,
        source: io::Error,
    },

    /// The connection ended mid-body and reconnecting did not help.
    #[error("read: connection closed unexpectedly at offset {offset}: {source}")]
    Truncated { offset: u64, source: io::Error },
}

impl RemoteError {
    /// Look through an [`io::Error`] for the condition that produced it.
    pub fn from_io(err: &io::Error) -> Option<&RemoteError> {
        err.get_ref()?.downcast_ref::<RemoteError>()
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            RemoteError::Unavailable { .. } => io::ErrorKind::Other,
            RemoteError::InvalidArgument { .. } => io::ErrorKind::InvalidInput,
            RemoteError::NotImplemented { .. } => io::ErrorKind::Unsupported,
            RemoteError::Open { source, .. } => source.kind(),
            RemoteError::Truncated { .. } => io::ErrorKind::UnexpectedEof,
        }
    }
}

impl From<RemoteError> for io::Error {
    fn from(err: RemoteError) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_condition() {
        let err: io::Error = RemoteError::NotImplemented { op: "read_at" }.into();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(matches!(
            RemoteError::from_io(&err),
            Some(RemoteError::NotImplemented { op: "read_at" })
        ));

        let err: io::Error = RemoteError::Open {
            op: "read",
            offset: 7,
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(
            err.to_string(),
            "read: failed to open at offset 7: refused"
        );
    }

    #[test]
    fn plain_io_errors_are_not_remote_errors() {
        let err = io::Error::new(io::ErrorKind::Other, "boom");
        assert!(RemoteError::from_io(&err).is_none());
        assert!(RemoteError::from_io(&io::Error::from(io::ErrorKind::Other)).is_none());
    }
}
