//! Network Module
//!
//! TCP session handling on the client side.
//!
//! ## Architecture
//! - `Transport`: owns the socket, whole-buffer send/receive
//! - `handshake`: one-shot activation negotiation
//! - `Session`: serialized command dispatch and async event routing

mod transport;
mod handshake;
mod session;

pub use transport::Transport;
pub use handshake::handshake;
pub use session::{ConnectionState, Session};
