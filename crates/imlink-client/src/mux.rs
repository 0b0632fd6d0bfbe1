//! The action-stream multiplexer.
//!
//! `ActionMultiplexer` is the single point of ownership for the
//! authenticated duplex stream. It assigns correlation identifiers, writes
//! frames in call order, and routes each inbound frame either to the waiter
//! registered under its `ack` or, when it is new work, to the proxy
//! forwarder, the event sink, or the message sink.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

use imlink_core::error::{ConnectionStatus, LinkError, LinkResult};
use imlink_core::frames::{ActionPayload, EventBody, Frame, ProxyRequest, ReplyBody, RequestBody};
use imlink_core::transport::{ActionTransport, BoxFuture, ReplyWriter};

/// Configuration recognized by the multiplexer.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Window within which a correlated reply must arrive.
    pub request_timeout: Duration,
    /// Idempotency identifier attached at stream open, when the control
    /// plane supports replay-safe retries.
    pub idempotent_id: Option<String>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            idempotent_id: None,
        }
    }
}

/// Metadata attached once when the stream was opened.
#[derive(Debug, Clone)]
pub struct StreamMeta {
    pub trace_id: String,
    pub client_type: String,
    pub client_version: String,
    pub long_link_id: Option<String>,
}

/// A reply delivered to a waiting `request` caller.
#[derive(Debug)]
pub struct InboundReply {
    pub payload: ActionPayload,
    /// Present when the reply itself expects a reply.
    pub seq: Option<u32>,
}

/// Inbound work surfaced to the embedding application.
#[derive(Debug)]
pub enum Inbound {
    /// An unsolicited system event. Already acknowledged on the wire.
    Event(EventBody),
    /// A frame that is neither a reply, a proxied request, nor an event.
    Message(Frame),
    /// A proxied request the dispatch could not execute. The stream stays
    /// up; the peer's correlation times out on its own side.
    ForwardingFailure(LinkError),
}

/// Executes inbound proxied requests. Implemented by the request-forwarding
/// dispatch; injectable for tests.
pub trait ProxyForwarder: Send + Sync {
    fn forward(&self, request: ProxyRequest, ack: u32) -> BoxFuture<'_, LinkResult<()>>;
}

struct MuxInner {
    status: ConnectionStatus,
    pending: HashMap<u32, oneshot::Sender<LinkResult<InboundReply>>>,
}

struct MuxShared {
    meta: StreamMeta,
    config: MuxConfig,
    /// Next correlation identifier. Monotonic from 1, never reused.
    next_seq: AtomicU32,
    /// Status and pending table mutate under one critical section; no
    /// awaits happen while it is held.
    inner: Mutex<MuxInner>,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl MuxShared {
    fn allocate_seq(&self) -> u32 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, MuxInner> {
        // Poisoning only follows a panic inside the critical section, and
        // nothing in there can panic.
        self.inner.lock().expect("mux state poisoned")
    }

    /// Guarded write: enqueues the frame while the status still allows it.
    fn write_frame(&self, frame: Frame) -> LinkResult<()> {
        let inner = self.lock_inner();
        if !inner.status.writable() {
            return Err(LinkError::ChannelClosed(inner.status));
        }
        self.outgoing
            .send(frame)
            .map_err(|_| LinkError::Transport("action stream writer is gone".into()))
    }

    /// Registers a waiter under `seq` and writes the frame atomically with
    /// the status check.
    fn register(
        &self,
        seq: u32,
        frame: Frame,
    ) -> LinkResult<oneshot::Receiver<LinkResult<InboundReply>>> {
        let mut inner = self.lock_inner();
        if !inner.status.writable() {
            return Err(LinkError::ChannelClosed(inner.status));
        }
        let (tx, rx) = oneshot::channel();
        inner.pending.insert(seq, tx);
        if self.outgoing.send(frame).is_err() {
            inner.pending.remove(&seq);
            return Err(LinkError::Transport("action stream writer is gone".into()));
        }
        Ok(rx)
    }

    fn take_waiter(&self, ack: u32) -> Option<oneshot::Sender<LinkResult<InboundReply>>> {
        self.lock_inner().pending.remove(&ack)
    }

    fn discard_waiter(&self, seq: u32) {
        self.lock_inner().pending.remove(&seq);
    }

    fn status(&self) -> ConnectionStatus {
        self.lock_inner().status
    }

    fn pending_count(&self) -> usize {
        self.lock_inner().pending.len()
    }

    /// First terminal transition wins; later calls return `false` and do
    /// nothing. Every pending request is failed exactly once.
    fn teardown(&self, reason: ConnectionStatus, cause: Option<String>) -> bool {
        let drained: Vec<_> = {
            let mut inner = self.lock_inner();
            if inner.status != ConnectionStatus::Ok {
                return false;
            }
            inner.status = reason;
            inner.pending.drain().map(|(_, tx)| tx).collect()
        };
        let failed = drained.len();
        for tx in drained {
            let _ = tx.send(Err(LinkError::Cancelled {
                reason,
                cause: cause.clone(),
            }));
        }
        tracing::info!(
            trace = %self.meta.trace_id,
            status = %reason,
            failed,
            "action stream reached terminal status"
        );
        true
    }
}

/// Cheap-clone handle letting transports write correlated reply frames
/// without owning the multiplexer.
#[derive(Clone)]
pub struct MuxHandle {
    shared: Arc<MuxShared>,
}

impl MuxHandle {
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }
}

impl ReplyWriter for MuxHandle {
    fn reply(&self, ack: u32, body: ReplyBody) -> LinkResult<()> {
        self.shared.write_frame(Frame::reply(ack, body))
    }
}

enum LinkControl {
    Cancel,
    Finish,
}

/// Owns the duplex stream and the read loop spawned over it.
pub struct ActionMultiplexer {
    shared: Arc<MuxShared>,
    control: mpsc::UnboundedSender<LinkControl>,
    reader: JoinHandle<()>,
}

impl ActionMultiplexer {
    /// Spawn the multiplexer over an already-authenticated stream.
    ///
    /// `make_forwarder` receives the reply handle and builds the proxy
    /// forwarder the read loop routes inbound proxied requests to. Inbound
    /// events, unmatched messages, and forwarding failures surface on the
    /// returned receiver.
    pub fn spawn<T, F>(
        transport: T,
        meta: StreamMeta,
        config: MuxConfig,
        make_forwarder: F,
    ) -> (Self, mpsc::UnboundedReceiver<Inbound>)
    where
        T: ActionTransport,
        F: FnOnce(MuxHandle) -> Arc<dyn ProxyForwarder>,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(MuxShared {
            meta,
            config,
            next_seq: AtomicU32::new(1),
            inner: Mutex::new(MuxInner {
                status: ConnectionStatus::Ok,
                pending: HashMap::new(),
            }),
            outgoing: outgoing_tx,
        });

        tracing::debug!(
            trace = %shared.meta.trace_id,
            client = %shared.meta.client_type,
            version = %shared.meta.client_version,
            timeout_ms = shared.config.request_timeout.as_millis() as u64,
            "action stream opened"
        );

        let forwarder = make_forwarder(MuxHandle {
            shared: shared.clone(),
        });
        let reader = tokio::spawn(run_stream(
            transport,
            shared.clone(),
            outgoing_rx,
            control_rx,
            inbound_tx,
            forwarder,
        ));

        (
            Self {
                shared,
                control: control_tx,
                reader,
            },
            inbound_rx,
        )
    }

    /// Issue a correlated request and suspend until its reply, its private
    /// timeout, or bulk teardown, whichever resolves it first.
    pub async fn request(&self, body: RequestBody) -> LinkResult<InboundReply> {
        let seq = self.shared.allocate_seq();
        let rx = self.shared.register(seq, Frame::request(seq, body))?;
        self.await_reply(seq, rx).await
    }

    /// Close out the inbound correlation `ack` while opening a fresh one of
    /// our own; waits like [`request`](Self::request).
    pub async fn reply_and_request(&self, ack: u32, body: ReplyBody) -> LinkResult<InboundReply> {
        let seq = self.shared.allocate_seq();
        let rx = self
            .shared
            .register(seq, Frame::reply_and_request(ack, seq, body))?;
        self.await_reply(seq, rx).await
    }

    /// Fire-and-forget: no correlation, no completion awaited.
    pub fn send_only(&self, body: RequestBody) -> LinkResult<()> {
        self.shared.write_frame(Frame::fire_and_forget(body))
    }

    /// Answer an inbound request or event without expecting anything back.
    pub fn reply(&self, ack: u32, body: ReplyBody) -> LinkResult<()> {
        self.shared.write_frame(Frame::reply(ack, body))
    }

    /// Tear the channel down with a local error: fails every pending
    /// request with `ClientError`, then aborts the underlying stream.
    /// A no-op once any terminal status is set.
    pub fn error(&self, cause: LinkError) {
        if self
            .shared
            .teardown(ConnectionStatus::ClientError, Some(cause.to_string()))
        {
            let _ = self.control.send(LinkControl::Cancel);
        }
    }

    /// Gracefully close the channel: fails every pending request with
    /// `ClientComplete`, then ends the stream for writes. A no-op once any
    /// terminal status is set.
    pub fn complete(&self) {
        if self.shared.teardown(ConnectionStatus::ClientComplete, None) {
            let _ = self.control.send(LinkControl::Finish);
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending_count()
    }

    /// Reply handle for transports that emit their own correlated frames.
    pub fn handle(&self) -> MuxHandle {
        MuxHandle {
            shared: self.shared.clone(),
        }
    }

    async fn await_reply(
        &self,
        seq: u32,
        rx: oneshot::Receiver<LinkResult<InboundReply>>,
    ) -> LinkResult<InboundReply> {
        match time::timeout(self.shared.config.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Waiter dropped without a resolution; the reader task is gone.
            Ok(Err(_)) => Err(LinkError::Cancelled {
                reason: self.shared.status(),
                cause: None,
            }),
            Err(_) => {
                self.shared.discard_waiter(seq);
                tracing::debug!(
                    trace = %self.shared.meta.trace_id,
                    seq,
                    "request timed out"
                );
                Err(LinkError::RequestTimeout)
            }
        }
    }
}

impl Drop for ActionMultiplexer {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

enum LoopEvent {
    Inbound(Option<LinkResult<Frame>>),
    Outgoing(Option<Frame>),
    Control(Option<LinkControl>),
}

/// The read/write loop. Owns the transport; frames are written in the order
/// their senders enqueued them, inbound frames are classified in arrival
/// order.
async fn run_stream<T: ActionTransport>(
    mut transport: T,
    shared: Arc<MuxShared>,
    mut outgoing: mpsc::UnboundedReceiver<Frame>,
    mut control: mpsc::UnboundedReceiver<LinkControl>,
    inbound: mpsc::UnboundedSender<Inbound>,
    forwarder: Arc<dyn ProxyForwarder>,
) {
    // Stays true until the peer ends its side; the write half keeps
    // draining afterwards.
    let mut reading = true;
    loop {
        let event = tokio::select! {
            signal = transport.next(), if reading => LoopEvent::Inbound(signal),
            frame = outgoing.recv() => LoopEvent::Outgoing(frame),
            cmd = control.recv() => LoopEvent::Control(cmd),
        };

        match event {
            LoopEvent::Inbound(Some(Ok(frame))) => {
                handle_frame(frame, &shared, &inbound, &forwarder);
            }
            LoopEvent::Inbound(Some(Err(e))) => {
                shared.teardown(ConnectionStatus::ServerError, Some(e.to_string()));
                break;
            }
            LoopEvent::Inbound(None) => {
                shared.teardown(ConnectionStatus::ServerComplete, None);
                reading = false;
            }
            LoopEvent::Outgoing(Some(frame)) => {
                if let Err(e) = transport.write(frame).await {
                    tracing::warn!(
                        trace = %shared.meta.trace_id,
                        error = %e,
                        "action stream write failed"
                    );
                    shared.teardown(ConnectionStatus::ServerError, Some(e.to_string()));
                    break;
                }
            }
            // Multiplexer dropped.
            LoopEvent::Outgoing(None) | LoopEvent::Control(None) => break,
            LoopEvent::Control(Some(LinkControl::Cancel)) => {
                transport.cancel().await;
                break;
            }
            LoopEvent::Control(Some(LinkControl::Finish)) => {
                transport.finish().await;
                break;
            }
        }
    }
    tracing::debug!(trace = %shared.meta.trace_id, "action stream loop ended");
}

/// Classify one inbound frame. A present `ack` resolves the waiter
/// registered under it; otherwise the payload decides where the frame goes.
fn handle_frame(
    frame: Frame,
    shared: &Arc<MuxShared>,
    inbound: &mpsc::UnboundedSender<Inbound>,
    forwarder: &Arc<dyn ProxyForwarder>,
) {
    let Frame { header, payload } = frame;

    if let Some(ack) = header.ack {
        match shared.take_waiter(ack) {
            Some(tx) => {
                let _ = tx.send(Ok(InboundReply {
                    payload,
                    seq: header.seq,
                }));
            }
            // Already resolved by timeout or teardown; duplicates land here
            // too.
            None => tracing::trace!(trace = %shared.meta.trace_id, ack, "no waiter for ack"),
        }
        return;
    }

    match payload {
        ActionPayload::Proxy(request) => {
            let Some(seq) = header.seq else {
                let _ = inbound.send(Inbound::ForwardingFailure(LinkError::Forwarding(
                    "proxied request carried no correlation identifier".into(),
                )));
                return;
            };
            // Forwarding may await network I/O of its own, so it runs off
            // the read loop; its reply correlates by ack, not position.
            let forwarder = forwarder.clone();
            let inbound = inbound.clone();
            let trace = shared.meta.trace_id.clone();
            tokio::spawn(async move {
                if let Err(e) = forwarder.forward(request, seq).await {
                    tracing::warn!(trace = %trace, ack = seq, error = %e, "request forwarding failed");
                    let _ = inbound.send(Inbound::ForwardingFailure(e));
                }
            });
        }
        ActionPayload::Event(event) => {
            if let Some(seq) = header.seq {
                if let Err(e) = shared.write_frame(Frame::event_ack(seq)) {
                    tracing::debug!(trace = %shared.meta.trace_id, seq, error = %e, "event ack dropped");
                }
            }
            let _ = inbound.send(Inbound::Event(event));
        }
        other => {
            let _ = inbound.send(Inbound::Message(Frame {
                header,
                payload: other,
            }));
        }
    }
}
