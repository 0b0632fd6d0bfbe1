//! Action-stream frame model.
//!
//! One [`Frame`] is the unit exchanged over the authenticated duplex stream.
//! Correlation works by number, not position: `seq` tags a frame whose sender
//! expects a reply, `ack` tags a frame that *is* the reply and echoes the
//! peer's `seq`. The two are independent: a frame may carry both (a reply
//! that itself demands a reply) or neither (fire-and-forget).

use serde::{Deserialize, Serialize};

/// Correlation header carried by every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Present iff the sender expects a reply.
    pub seq: Option<u32>,
    /// Present iff this frame is a reply; equals the peer's `seq`.
    pub ack: Option<u32>,
}

/// One frame on the action stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: ActionPayload,
}

impl Frame {
    /// A locally-initiated request that expects a correlated reply.
    pub fn request(seq: u32, body: RequestBody) -> Self {
        Self {
            header: FrameHeader {
                seq: Some(seq),
                ack: None,
            },
            payload: ActionPayload::Request(body),
        }
    }

    /// A fire-and-forget frame: no reply expected, none given.
    pub fn fire_and_forget(body: RequestBody) -> Self {
        Self {
            header: FrameHeader::default(),
            payload: ActionPayload::Request(body),
        }
    }

    /// A reply closing out the peer's correlation `ack`.
    pub fn reply(ack: u32, body: ReplyBody) -> Self {
        Self {
            header: FrameHeader {
                seq: None,
                ack: Some(ack),
            },
            payload: ActionPayload::Reply(body),
        }
    }

    /// A reply that simultaneously opens a new correlation of its own.
    pub fn reply_and_request(ack: u32, seq: u32, body: ReplyBody) -> Self {
        Self {
            header: FrameHeader {
                seq: Some(seq),
                ack: Some(ack),
            },
            payload: ActionPayload::Reply(body),
        }
    }

    /// The empty acknowledgement written for an inbound system event.
    pub fn event_ack(ack: u32) -> Self {
        Self {
            header: FrameHeader {
                seq: None,
                ack: Some(ack),
            },
            payload: ActionPayload::EventAck,
        }
    }
}

/// The closed set of payloads a frame can carry. Every frame carries exactly
/// one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionPayload {
    /// A request originated by either side.
    Request(RequestBody),
    /// A reply to either side's request.
    Reply(ReplyBody),
    /// Proxied network work the peer expects the local side to execute.
    Proxy(ProxyRequest),
    /// An unsolicited notification from the peer.
    Event(EventBody),
    /// The empty reply acknowledging a system event.
    EventAck,
}

/// Opaque request content. The control plane's own serialization of `body`
/// is a prior layer; the multiplexer never looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub method: String,
    pub body: Vec<u8>,
}

impl RequestBody {
    pub fn new(method: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            body,
        }
    }
}

/// Reply content, shaped by what it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplyBody {
    /// Reply to an opaque control-plane request.
    Action(Vec<u8>),
    /// Wrapped response from the persistent long-link transport.
    LongLink { seq: u32, payload: Vec<u8> },
    /// Wrapped response from a one-shot short-link round trip.
    ShortLink { payload: Vec<u8> },
    /// One chunk streamed back from a proxied socket session.
    Socket { payload: Vec<u8> },
}

/// An unsolicited notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    pub kind: String,
    pub body: Vec<u8>,
}

/// Proxied network work, decoded from an inbound frame and consumed
/// synchronously by the dispatch. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProxyRequest {
    /// Raw connection whose replies may stream as multiple frames.
    Socket(SocketRequest),
    /// Session-scoped persistent connection to the provider edge.
    LongLink(LongLinkRequest),
    /// One-shot connection, single request/response.
    ShortLink(ShortLinkRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketRequest {
    pub host: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongLinkRequest {
    /// Sequence number scoped to the long-link session itself, not to the
    /// action stream.
    pub seq: u32,
    pub init: bool,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortLinkRequest {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub payload: Vec<u8>,
}
