//! imlink-core: Shared protocol library for the imlink bridge.
//!
//! Provides the action-stream frame model, the error taxonomy, the
//! length-prefixed CBOR codec for file-response streams, and the
//! object-safe seams behind which the embedding application supplies its
//! network transports.

pub mod codec;
pub mod error;
pub mod frames;
pub mod transport;

// Re-export commonly used items at crate root.
pub use codec::{cbor_decode, frame_encode, FileResponse, FileResponseDecoder};
pub use error::{ConnectionStatus, DownloadError, LinkError, LinkResult};
pub use frames::{ActionPayload, EventBody, Frame, FrameHeader, ProxyRequest, ReplyBody, RequestBody};
pub use transport::{ActionTransport, LongLink, ReplyWriter, ResponseDecoder, ResponseFrame, ShortLink, SocketConnector, SocketHandler, SocketSession};
