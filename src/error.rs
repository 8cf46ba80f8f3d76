//! Stable error taxonomy surfaced to RPC callers and, selectively, to
//! clients.

use std::error::Error;
use std::fmt::{self, Display};

/// Numeric codes drawn from the closed taxonomy. Stored as `i32` on the
/// wire (the `Response` message's error flag carries one of these), kept
/// as an exhaustive enum in Rust so a missing `match` arm is a compile
/// error rather than a silent fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    SessionUidNotBind = 10,
    DiscoveryNotFoundNode = 11,
    AppIsStop = 12,
    NetError = 20,
    UnmarshalError = 21,
    MarshalError = 22,
    RemoteExecuteError = 23,
    ReplyParamsError = 24,
    RouteDecodeError = 25,
    RouteHashError = 26,
    NotImplement = 27,
    HandlerError = 28,
    MemberConflict = 29,
    HandlerNotFound = 30,
    BusUnavailable = 31,
    BusTimeout = 32,
    HandlerAlreadyRegistered = 33,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Ok => "success",
            ErrorCode::SessionUidNotBind => "operation requires an authenticated session",
            ErrorCode::DiscoveryNotFoundNode => "target node id not in registry",
            ErrorCode::AppIsStop => "facade is shutting down",
            ErrorCode::NetError => "bus request failed or timed out",
            ErrorCode::UnmarshalError => "response bytes could not be deserialized",
            ErrorCode::MarshalError => "request could not be serialized",
            ErrorCode::RemoteExecuteError => "remote handler returned an error",
            ErrorCode::ReplyParamsError => "response did not match the expected shape",
            ErrorCode::RouteDecodeError => "actor path could not be parsed",
            ErrorCode::RouteHashError => "routing policy produced no target",
            ErrorCode::NotImplement => "handler registered but not implemented",
            ErrorCode::HandlerError => "handler lookup failed",
            ErrorCode::MemberConflict => "conflicting member registration",
            ErrorCode::HandlerNotFound => "no actor registered under that id",
            ErrorCode::BusUnavailable => "bus client is not currently connected",
            ErrorCode::BusTimeout => "bus request timed out",
            ErrorCode::HandlerAlreadyRegistered => "an actor is already registered under that id",
        }
    }

    /// Recovers a code from its wire representation. Used to decode the
    /// error code carried back across a remote `callWait` reply.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ErrorCode::Ok),
            10 => Some(ErrorCode::SessionUidNotBind),
            11 => Some(ErrorCode::DiscoveryNotFoundNode),
            12 => Some(ErrorCode::AppIsStop),
            20 => Some(ErrorCode::NetError),
            21 => Some(ErrorCode::UnmarshalError),
            22 => Some(ErrorCode::MarshalError),
            23 => Some(ErrorCode::RemoteExecuteError),
            24 => Some(ErrorCode::ReplyParamsError),
            25 => Some(ErrorCode::RouteDecodeError),
            26 => Some(ErrorCode::RouteHashError),
            27 => Some(ErrorCode::NotImplement),
            28 => Some(ErrorCode::HandlerError),
            29 => Some(ErrorCode::MemberConflict),
            30 => Some(ErrorCode::HandlerNotFound),
            31 => Some(ErrorCode::BusUnavailable),
            32 => Some(ErrorCode::BusTimeout),
            33 => Some(ErrorCode::HandlerAlreadyRegistered),
            _ => None,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.as_i32())
    }
}

/// Propagating error type pairing a stable [`ErrorCode`] with an optional
/// source. Hand-written rather than derive-macro generated so the code
/// stays the primary, always-present identity of the error.
#[derive(Debug)]
pub struct CherryError {
    code: ErrorCode,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl CherryError {
    pub fn new(code: ErrorCode) -> Self {
        Self { code, source: None }
    }

    pub fn with_source(code: ErrorCode, source: impl Error + Send + Sync + 'static) -> Self {
        Self {
            code,
            source: Some(Box::new(source)),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl Display for CherryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl Error for CherryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<ErrorCode> for CherryError {
    fn from(code: ErrorCode) -> Self {
        CherryError::new(code)
    }
}

pub type CherryResult<T> = Result<T, CherryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_round_trips_through_i32() {
        assert_eq!(ErrorCode::DiscoveryNotFoundNode.as_i32(), 11);
        assert_eq!(ErrorCode::HandlerNotFound.as_i32(), 30);
    }

    #[test]
    fn cherry_error_displays_its_code() {
        let err = CherryError::new(ErrorCode::NetError);
        assert!(err.to_string().contains("20"));
    }

    #[test]
    fn from_i32_round_trips_every_code() {
        let codes = [
            ErrorCode::Ok,
            ErrorCode::SessionUidNotBind,
            ErrorCode::DiscoveryNotFoundNode,
            ErrorCode::AppIsStop,
            ErrorCode::NetError,
            ErrorCode::UnmarshalError,
            ErrorCode::MarshalError,
            ErrorCode::RemoteExecuteError,
            ErrorCode::ReplyParamsError,
            ErrorCode::RouteDecodeError,
            ErrorCode::RouteHashError,
            ErrorCode::NotImplement,
            ErrorCode::HandlerError,
            ErrorCode::MemberConflict,
            ErrorCode::HandlerNotFound,
            ErrorCode::BusUnavailable,
            ErrorCode::BusTimeout,
            ErrorCode::HandlerAlreadyRegistered,
        ];
        for code in codes {
            assert_eq!(ErrorCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ErrorCode::from_i32(9999), None);
    }
}
