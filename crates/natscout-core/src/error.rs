use std::fmt::{Display, Formatter};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// A probe error result.
pub type Result<T> = std::result::Result<T, Error>;

/// A probe error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid packet: {0}")]
    PacketError(#[from] natscout_packet::error::Error),
    #[error("failed to create probe socket (has_privileges={has_privileges}): {source}")]
    SocketCreate {
        source: IoError,
        has_privileges: bool,
    },
    #[error("failed to configure probe socket: {0}")]
    SocketOption(IoError),
    #[error("probe send incomplete: sent {sent} of {expected} bytes")]
    SendIncomplete { sent: usize, expected: usize },
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    #[error("missing address from socket call")]
    MissingAddr,
    #[error("privilege error: {0}")]
    PrivilegeError(#[from] natscout_privilege::Error),
}

/// Custom IO error result.
pub type IoResult<T> = std::result::Result<T, IoError>;

/// Custom IO error.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Connect error for {1}: {0}")]
    Connect(io::Error, SocketAddr),
    #[error("Sendmsg error for {1}: {0}")]
    SendMsg(io::Error, SocketAddr),
    #[error("Failed to {1}: {0}")]
    Other(io::Error, IoOperation),
}

impl IoError {
    /// Get the custom error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(e, _) | Self::SendMsg(e, _) | Self::Other(e, _) => ErrorKind::from(e),
        }
    }
}

/// Custom error kind.
///
/// This includes additional error kinds that are not part of the standard [`io::ErrorKind`].
#[derive(Debug, Eq, PartialEq)]
pub enum ErrorKind {
    HostUnreachable,
    Std(io::ErrorKind),
}

/// Io operation.
#[derive(Debug)]
pub enum IoOperation {
    NewSocket,
    SetRecvErr,
    SetRecvTtl,
    SetTtl,
    Select,
    RecvFrom,
    RecvErrQueue,
    LocalAddr,
}

impl Display for IoOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewSocket => write!(f, "create new socket"),
            Self::SetRecvErr => write!(f, "set receive error"),
            Self::SetRecvTtl => write!(f, "set receive TTL"),
            Self::SetTtl => write!(f, "set TTL"),
            Self::Select => write!(f, "select"),
            Self::RecvFrom => write!(f, "recv from"),
            Self::RecvErrQueue => write!(f, "recv from error queue"),
            Self::LocalAddr => write!(f, "local addr"),
        }
    }
}
