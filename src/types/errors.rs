//! Library error codes.
//!
//! Every failure surfaced by the library is one of a fixed set of negative
//! codes. The `Display` text of each variant is the central, stable string
//! for that code; tools should show it rather than the raw number.

use std::borrow::Cow;
use thiserror::Error;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

const ERR_BASE: i32 = 12345;

/// Main error enum for metric source access.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// Catch-all for conditions with no more specific code.
    #[error("Generic error, already reported above")]
    Generic,

    /// One-line or help text unavailable for the ident (value error).
    #[error("One-line or help text is not available")]
    Text,

    /// No response within the connection's receive timeout (transport error).
    #[error("Timeout waiting for a response from PMCD")]
    Timeout,

    /// Unknown or unusable metric identifier.
    #[error("Unknown or illegal metric identifier")]
    Pmid,

    /// Malformed or unexpected frame (transport error).
    #[error("IPC protocol failure")]
    Ipc,

    /// Operation requires a host context (context error).
    #[error("Operation requires context with host source of metrics")]
    NotHost,

    /// Archive source could not be opened.
    #[error("Missing archive file")]
    LogFile,

    /// Unknown or destroyed context handle (context error).
    #[error("Missing context")]
    NoContext,

    /// No local agent registered for the metric domain (agent error).
    #[error("No PMCD agent for domain of request")]
    NoAgent,

    /// Single-thread constraint violated for a local agent scope.
    #[error("Operation not supported for multi-threaded applications")]
    Thread,

    /// Connection to the collector could not be established.
    #[error("No connection to host")]
    NotConn,

    /// Lock primitive misuse (relock by owner, unlock by non-owner).
    #[error("Lock operation failed")]
    Lock,

    /// Frame exceeds the configured size limit.
    #[error("Result size exceeded")]
    TooBig,
}

impl Error {
    /// Every code the library can surface.
    pub const ALL: [Error; 13] = [
        Error::Generic,
        Error::Text,
        Error::Timeout,
        Error::Pmid,
        Error::Ipc,
        Error::NotHost,
        Error::LogFile,
        Error::NoContext,
        Error::NoAgent,
        Error::Thread,
        Error::NotConn,
        Error::Lock,
        Error::TooBig,
    ];

    /// Stable negative code for this error.
    pub const fn code(self) -> i32 {
        let offset = match self {
            Error::Generic => 0,
            Error::Text => 4,
            Error::Timeout => 8,
            Error::Pmid => 13,
            Error::Ipc => 21,
            Error::NotHost => 24,
            Error::LogFile => 30,
            Error::NoContext => 31,
            Error::NoAgent => 41,
            Error::Thread => 53,
            Error::NotConn => 46,
            Error::Lock => 54,
            Error::TooBig => 99,
        };
        -(ERR_BASE + offset)
    }

    /// Reverse of [`Error::code`].
    pub fn from_code(code: i32) -> Option<Error> {
        Error::ALL.iter().copied().find(|e| e.code() == code)
    }

    /// Short symbolic name, e.g. `PM_ERR_IPC`.
    pub const fn symbol(self) -> &'static str {
        match self {
            Error::Generic => "PM_ERR_GENERIC",
            Error::Text => "PM_ERR_TEXT",
            Error::Timeout => "PM_ERR_TIMEOUT",
            Error::Pmid => "PM_ERR_PMID",
            Error::Ipc => "PM_ERR_IPC",
            Error::NotHost => "PM_ERR_NOTHOST",
            Error::LogFile => "PM_ERR_LOGFILE",
            Error::NoContext => "PM_ERR_NOCONTEXT",
            Error::NoAgent => "PM_ERR_NOAGENT",
            Error::Thread => "PM_ERR_THREAD",
            Error::NotConn => "PM_ERR_NOTCONN",
            Error::Lock => "PM_ERR_LOCK",
            Error::TooBig => "PM_ERR_TOOBIG",
        }
    }
}

/// Central code-to-string lookup.
///
/// Always returns a non-empty string, including for codes outside the
/// library's set.
pub fn err_str(code: i32) -> Cow<'static, str> {
    match Error::from_code(code) {
        Some(e) => Cow::Owned(e.to_string()),
        None if code == 0 => Cow::Borrowed("No error"),
        None => Cow::Owned(format!("Unknown error code {}", code)),
    }
}

impl From<Error> for i32 {
    fn from(err: Error) -> Self {
        err.code()
    }
}

/// Collapse an I/O failure on a collector connection into the fixed set.
pub(crate) fn from_io(err: &std::io::Error) -> Error {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::AddrNotAvailable => Error::NotConn,
        _ => Error::Ipc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_negative_and_unique() {
        let codes: HashSet<i32> = Error::ALL.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), Error::ALL.len());
        assert!(codes.iter().all(|c| *c < 0));
    }

    #[test]
    fn every_code_maps_back() {
        for e in Error::ALL {
            assert_eq!(Error::from_code(e.code()), Some(e));
            assert!(!err_str(e.code()).is_empty());
        }
    }

    #[test]
    fn well_known_codes() {
        assert_eq!(Error::NoContext.code(), -12376);
        assert_eq!(Error::Ipc.code(), -12366);
        assert_eq!(Error::Timeout.code(), -12353);
        assert_eq!(Error::Text.code(), -12349);
    }

    #[test]
    fn unknown_code_still_has_text() {
        assert_eq!(err_str(-1), "Unknown error code -1");
        assert_eq!(err_str(0), "No error");
    }

    #[test]
    fn io_errors_collapse_into_set() {
        let timeout = std::io::Error::new(std::io::ErrorKind::WouldBlock, "slow");
        assert_eq!(from_io(&timeout), Error::Timeout);
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no");
        assert_eq!(from_io(&refused), Error::NotConn);
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(from_io(&eof), Error::Ipc);
    }

    proptest::proptest! {
        #[test]
        fn err_str_never_empty(code in proptest::prelude::any::<i32>()) {
            proptest::prop_assert!(!err_str(code).is_empty());
        }
    }
}
