/// IPv4 gateway probe implementation.
pub mod ipv4;

/// Platform specific network code.
mod platform;

/// A network socket.
pub mod socket;

/// Determine the local source address.
pub mod source;

/// The platform specific socket type.
pub use platform::SocketImpl;
