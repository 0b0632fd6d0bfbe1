//! imlink-client: client-side bridge driving a remote messaging account.
//!
//! The embedding application supplies an authenticated duplex stream and
//! the raw network transports (long link, short link, socket sessions);
//! this crate multiplexes request/reply correlation over the stream,
//! forwards peer-initiated network work to the right transport, and runs
//! the file-transfer crypto pipeline.
//!
//! The upload primitives are pure and usable on their own:
//!
//! ```
//! use imlink_client::file::{decrypt_asset, encrypt_asset};
//!
//! let asset = encrypt_asset(b"hello", None);
//! assert_eq!(decrypt_asset(&asset.key, &asset.ciphertext).unwrap(), b"hello");
//! assert_eq!(asset.plain.len, 5);
//! ```

pub mod dispatch;
pub mod file;
pub mod mux;

// Re-export primary public types.
pub use dispatch::ForwardDispatch;
pub use mux::{
    ActionMultiplexer, Inbound, InboundReply, MuxConfig, MuxHandle, ProxyForwarder, StreamMeta,
};

// Re-export imlink-core error types for convenience.
pub use imlink_core::{ConnectionStatus, LinkError, LinkResult};
