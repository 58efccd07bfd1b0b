//! Error taxonomy for Chime
//!
//! Every failing engine operation reports one of these kinds, never a raw
//! backend-specific code. Each kind keeps the numeric code libcanberra uses so a
//! binding layer can translate without a lookup table of its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for Chime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds, independent of the diagnostic payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NotSupported,
    InvalidArgument,
    State,
    OutOfMemory,
    NoDriver,
    System,
    Corrupt,
    TooBig,
    NotFound,
    Destroyed,
    Canceled,
    NotAvailable,
    Access,
    Io,
    Internal,
    Disabled,
    Disconnected,
}

impl ErrorKind {
    /// Numeric code as defined by libcanberra's `CA_ERROR_*` constants
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::NotSupported => -1,
            ErrorKind::InvalidArgument => -2,
            ErrorKind::State => -3,
            ErrorKind::OutOfMemory => -4,
            ErrorKind::NoDriver => -5,
            ErrorKind::System => -6,
            ErrorKind::Corrupt => -7,
            ErrorKind::TooBig => -8,
            ErrorKind::NotFound => -9,
            ErrorKind::Destroyed => -10,
            ErrorKind::Canceled => -11,
            ErrorKind::NotAvailable => -12,
            ErrorKind::Access => -13,
            ErrorKind::Io => -14,
            ErrorKind::Internal => -15,
            ErrorKind::Disabled => -16,
            ErrorKind::Disconnected => -18,
        }
    }

    /// Inverse of [`ErrorKind::code`]
    pub fn from_code(code: i32) -> Option<Self> {
        let kind = match code {
            -1 => ErrorKind::NotSupported,
            -2 => ErrorKind::InvalidArgument,
            -3 => ErrorKind::State,
            -4 => ErrorKind::OutOfMemory,
            -5 => ErrorKind::NoDriver,
            -6 => ErrorKind::System,
            -7 => ErrorKind::Corrupt,
            -8 => ErrorKind::TooBig,
            -9 => ErrorKind::NotFound,
            -10 => ErrorKind::Destroyed,
            -11 => ErrorKind::Canceled,
            -12 => ErrorKind::NotAvailable,
            -13 => ErrorKind::Access,
            -14 => ErrorKind::Io,
            -15 => ErrorKind::Internal,
            -16 => ErrorKind::Disabled,
            -18 => ErrorKind::Disconnected,
            _ => return None,
        };
        Some(kind)
    }

    /// Short human-readable description, matching `ca_strerror()` wording
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::NotSupported => "Operation not supported",
            ErrorKind::InvalidArgument => "Invalid argument",
            ErrorKind::State => "Invalid state",
            ErrorKind::OutOfMemory => "Out of memory",
            ErrorKind::NoDriver => "No such driver",
            ErrorKind::System => "System error",
            ErrorKind::Corrupt => "File or data corrupt",
            ErrorKind::TooBig => "File or data too large",
            ErrorKind::NotFound => "File or data not found",
            ErrorKind::Destroyed => "Destroyed",
            ErrorKind::Canceled => "Canceled",
            ErrorKind::NotAvailable => "Not available",
            ErrorKind::Access => "Access forbidden",
            ErrorKind::Io => "IO error",
            ErrorKind::Internal => "Internal error",
            ErrorKind::Disabled => "Sound disabled",
            ErrorKind::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Engine error with diagnostic detail
///
/// Cloneable so that a failed playback can hand the same error to every
/// observer of its handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or missing properties
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No matching theme file or sound source
    #[error("Not found: {0}")]
    NotFound(String),

    /// No backend available or connectable
    #[error("No driver: {0}")]
    NoDriver(String),

    /// OS or audio-subsystem failure
    #[error("System error: {0}")]
    System(String),

    /// Decode failure or cyclic theme inheritance
    #[error("Corrupt: {0}")]
    Corrupt(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Caller opted out of sound
    #[error("Sound disabled: {0}")]
    Disabled(String),

    /// Playback was canceled before it finished
    #[error("Canceled")]
    Canceled,

    /// Invariant violation inside the engine
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    State(String),

    #[error("Too big: {0}")]
    TooBig(String),

    /// Context already destroyed
    #[error("Context destroyed")]
    Destroyed,

    #[error("Not available: {0}")]
    NotAvailable(String),

    #[error("Access forbidden: {0}")]
    Access(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Disconnected: {0}")]
    Disconnected(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NoDriver(_) => ErrorKind::NoDriver,
            Error::System(_) => ErrorKind::System,
            Error::Corrupt(_) => ErrorKind::Corrupt,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Error::Disabled(_) => ErrorKind::Disabled,
            Error::Canceled => ErrorKind::Canceled,
            Error::Internal(_) => ErrorKind::Internal,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::State(_) => ErrorKind::State,
            Error::TooBig(_) => ErrorKind::TooBig,
            Error::Destroyed => ErrorKind::Destroyed,
            Error::NotAvailable(_) => ErrorKind::NotAvailable,
            Error::Access(_) => ErrorKind::Access,
            Error::Io(_) => ErrorKind::Io,
            Error::Disconnected(_) => ErrorKind::Disconnected,
        }
    }

    /// libcanberra numeric code for this error
    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    /// Diagnostic string, if the variant carries one
    pub fn detail(&self) -> Option<&str> {
        match self {
            Error::Canceled | Error::Destroyed => None,
            Error::InvalidArgument(s)
            | Error::NotFound(s)
            | Error::NoDriver(s)
            | Error::System(s)
            | Error::Corrupt(s)
            | Error::OutOfMemory(s)
            | Error::Disabled(s)
            | Error::Internal(s)
            | Error::NotSupported(s)
            | Error::State(s)
            | Error::TooBig(s)
            | Error::NotAvailable(s)
            | Error::Access(s)
            | Error::Io(s)
            | Error::Disconnected(s) => Some(s.as_str()),
        }
    }

    /// True for failures a backend fallback should recover from locally
    pub fn is_driver_unavailable(&self) -> bool {
        matches!(self, Error::NoDriver(_) | Error::System(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        match err.kind() {
            IoKind::NotFound => Error::NotFound(err.to_string()),
            IoKind::PermissionDenied => Error::Access(err.to_string()),
            IoKind::OutOfMemory => Error::OutOfMemory(err.to_string()),
            _ => Error::Io(err.to_string()),
        }
    }
}
