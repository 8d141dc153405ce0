//! Defines error types.

use std::fmt::Debug;

/// The error type for scan and GATT operations.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub(crate) fn new<S: ToString>(kind: ErrorKind, message: S) -> Self {
        Error {
            kind,
            message: message.to_string(),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the platform status carried by this error, if any.
    pub fn status(&self) -> Option<GattStatus> {
        match self.kind {
            ErrorKind::ConnectFailure(st)
            | ErrorKind::DiscoveryFailure(st)
            | ErrorKind::OperationFailure(st)
            | ErrorKind::LinkLost(st) => Some(st),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", &self.kind)
        } else {
            write!(f, "{}: {}", &self.kind, &self.message)
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            message: String::new(),
        }
    }
}

/// A list of general categories of errors produced by this crate.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// the platform refused to start scanning
    StartFailure,
    /// the connection attempt failed
    ConnectFailure(GattStatus),
    /// service discovery failed
    DiscoveryFailure(GattStatus),
    /// a characteristic or descriptor operation failed
    OperationFailure(GattStatus),
    /// the link was lost without being requested
    LinkLost(GattStatus),
    /// the device isn't connected
    NotConnected,
    /// the connection is not in a state that allows the operation
    NotReady,
    /// the requested attribute was not found
    NotFound,
    /// the operation is unsupported by the attribute
    NotSupported,
    /// invalid parameter
    InvalidParameter,
    /// timed out
    Timeout,
    /// an internal error has occured
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::StartFailure => f.write_str("failed to start scanning"),
            ErrorKind::ConnectFailure(st) => write!(f, "connection attempt failed ({st})"),
            ErrorKind::DiscoveryFailure(st) => write!(f, "service discovery failed ({st})"),
            ErrorKind::OperationFailure(st) => write!(f, "GATT operation failed ({st})"),
            ErrorKind::LinkLost(st) => write!(f, "link lost ({st})"),
            ErrorKind::NotConnected => f.write_str("the device isn't connected"),
            ErrorKind::NotReady => f.write_str("not ready"),
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::NotSupported => f.write_str("the operation is unsupported"),
            ErrorKind::InvalidParameter => f.write_str("invalid parameter"),
            ErrorKind::Timeout => f.write_str("timed out"),
            ErrorKind::Internal => f.write_str("an internal error has occured"),
        }
    }
}

/// Status code reported by the platform's GATT callback.
///
/// The values follow `android.bluetooth.BluetoothGatt`; link-layer disconnect reasons
/// (e.g. `8` for supervision timeout) are passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GattStatus(i32);

impl GattStatus {
    /// The operation completed successfully.
    pub const SUCCESS: GattStatus = GattStatus(0);
    /// The attribute cannot be read.
    pub const READ_NOT_PERMITTED: GattStatus = GattStatus(0x02);
    /// The attribute cannot be written.
    pub const WRITE_NOT_PERMITTED: GattStatus = GattStatus(0x03);
    /// Insufficient authentication for the operation.
    pub const INSUFFICIENT_AUTHENTICATION: GattStatus = GattStatus(0x05);
    /// The request is not supported by the peripheral.
    pub const REQUEST_NOT_SUPPORTED: GattStatus = GattStatus(0x06);
    /// Offset specified was past the end of the attribute.
    pub const INVALID_OFFSET: GattStatus = GattStatus(0x07);
    /// Insufficient authorization for the operation.
    pub const INSUFFICIENT_AUTHORIZATION: GattStatus = GattStatus(0x08);
    /// The attribute value length is invalid for the operation.
    pub const INVALID_ATTRIBUTE_LENGTH: GattStatus = GattStatus(0x0d);
    /// Insufficient encryption for the operation.
    pub const INSUFFICIENT_ENCRYPTION: GattStatus = GattStatus(0x0f);
    /// Generic stack error, commonly seen on connection attempts.
    pub const ERROR: GattStatus = GattStatus(0x85);
    /// The remote device's link is congested.
    pub const CONNECTION_CONGESTED: GattStatus = GattStatus(0x8f);
    /// A GATT operation failed, or the platform refused to start it.
    pub const FAILURE: GattStatus = GattStatus(0x101);

    /// Converts a raw platform code.
    pub const fn from_raw(code: i32) -> Self {
        GattStatus(code)
    }

    /// Returns the raw platform code.
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// Whether the status indicates success.
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Turns a non-success status into an error of the kind chosen by `kind`.
    pub(crate) fn check(self, kind: impl FnOnce(GattStatus) -> ErrorKind) -> Result<(), Error> {
        if self.is_success() {
            Ok(())
        } else {
            Err(kind(self).into())
        }
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            GattStatus::SUCCESS => "success",
            GattStatus::READ_NOT_PERMITTED => "read not permitted",
            GattStatus::WRITE_NOT_PERMITTED => "write not permitted",
            GattStatus::INSUFFICIENT_AUTHENTICATION => "insufficient authentication",
            GattStatus::REQUEST_NOT_SUPPORTED => "request not supported",
            GattStatus::INVALID_OFFSET => "invalid offset",
            GattStatus::INSUFFICIENT_AUTHORIZATION => "insufficient authorization",
            GattStatus::INVALID_ATTRIBUTE_LENGTH => "invalid attribute length",
            GattStatus::INSUFFICIENT_ENCRYPTION => "insufficient encryption",
            GattStatus::ERROR => "GATT error",
            GattStatus::CONNECTION_CONGESTED => "connection congested",
            GattStatus::FAILURE => "GATT failure",
            _ => return write!(f, "status {}", self.0),
        };
        write!(f, "{name}, status {}", self.0)
    }
}

impl From<i32> for GattStatus {
    fn from(code: i32) -> Self {
        GattStatus(code)
    }
}

impl From<GattStatus> for i32 {
    fn from(val: GattStatus) -> Self {
        val.0
    }
}
