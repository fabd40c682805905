//! The framed session: one task per TCP connection, dispatching decoded
//! JSON-RPC messages to method handlers and correlating responses to the
//! calls that are waiting on them.
//!
//! Modeled on the accept-loop/`tokio::select!` shape the broker's teacher
//! uses for its websocket forwarder sessions: a single task owns the
//! socket, reads frames off it, and drains an mpsc queue of outbound bytes
//! so writers never touch the socket directly.

mod frame;

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rpc_protocol::{decode, error, notification, request, Id, IdGenerator, Message, RpcError};
use serde_json::Value;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};

use frame::{FrameReader, TERMINATOR};

/// A boxed, pinned future, the return type of handler closures.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Invoked for an inbound request or notification whose method matches.
/// Given the decoded message and a handle back to the session it arrived
/// on, so the handler can `respond`, `notify`, or reach into shared state.
pub type MethodHandler = Arc<dyn Fn(Message, SessionHandle) -> HandlerFuture + Send + Sync>;

/// Invoked once, after the session's read loop has ended.
pub type CloseHook = Arc<dyn Fn(SessionHandle) -> HandlerFuture + Send + Sync>;

/// Lifecycle hooks a caller can install on a session. All optional.
#[derive(Default, Clone)]
pub struct SessionHooks {
    pub on_close: Option<CloseHook>,
}

/// Why a `call` did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("session closed before a response arrived")]
    Disconnected,
    #[error("remote error: {0}")]
    Remote(#[from] RpcError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

enum PendingOutcome {
    Result(Vec<Value>),
    Error(RpcError),
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    id: u64,
    peer_addr: SocketAddr,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    pending: Mutex<HashMap<Id, oneshot::Sender<PendingOutcome>>>,
    id_gen: IdGenerator,
    closed: AtomicBool,
    close_notify: Notify,
}

/// A cheap, cloneable reference to a live (or just-closed) framed session.
/// Equality and hashing are by session identity, so a `SessionHandle` can
/// live in a `HashSet` (e.g. a topic's subscriber set) without needing the
/// underlying connection to implement either.
#[derive(Clone)]
pub struct SessionHandle(Arc<Inner>);

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for SessionHandle {}

impl std::hash::Hash for SessionHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.0.id)
            .field("peer_addr", &self.0.peer_addr)
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.0.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    /// Queue a notification (no reply expected).
    pub fn notify(&self, method: &str, params: &[Value]) {
        self.enqueue(notification(method, params));
    }

    /// Queue a successful response to a prior request.
    pub fn respond(&self, id: &Id, result: &[Value]) {
        self.enqueue(rpc_protocol::response(id, result));
    }

    /// Queue an error response to a prior request.
    pub fn respond_error(&self, id: &Id, err: &RpcError) {
        self.enqueue(error(id, err));
    }

    /// Send a request and await its correlated response. There is no
    /// built-in timeout: a caller that needs one wraps this in
    /// `tokio::time::timeout` itself.
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Vec<Value>, CallError> {
        let id = self.0.id_gen.next_id();
        let (tx, rx) = oneshot::channel();
        self.0.pending.lock().unwrap().insert(id.clone(), tx);

        let bytes = request(&id, method, params);
        if self.0.writer_tx.send(bytes).is_err() {
            self.0.pending.lock().unwrap().remove(&id);
            return Err(CallError::Disconnected);
        }

        match rx.await {
            Ok(PendingOutcome::Result(result)) => Ok(result),
            Ok(PendingOutcome::Error(err)) => Err(CallError::Remote(err)),
            Err(_) => Err(CallError::Disconnected),
        }
    }

    /// Tear the session down: wakes the session task out of its
    /// read/write select loop so the underlying socket is actually
    /// dropped, rather than waiting on the peer to hang up first.
    pub fn close(&self) {
        self.0.closed.store(true, Ordering::Release);
        self.0.close_notify.notify_one();
    }

    fn enqueue(&self, bytes: Vec<u8>) {
        // A closed peer means the writer task is gone; dropping the frame
        // is correct, there is nobody left to deliver it to.
        let _ = self.0.writer_tx.send(bytes);
    }

    fn resolve_pending(&self, id: &Id, outcome: PendingOutcome) -> bool {
        let sender = self.0.pending.lock().unwrap().remove(id);
        match sender {
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop every still-pending call's sender, so each waiting `call()`
    /// observes `CallError::Disconnected` instead of hanging forever.
    /// Spec §5: "all pending handlers for that session are discarded" on
    /// close.
    fn discard_pending(&self) {
        self.0.pending.lock().unwrap().clear();
    }
}

/// Owns the accept-side plumbing for one TCP connection: splits the
/// socket, spawns the read/write task, and hands back a `SessionHandle`.
pub struct FramedSession;

impl FramedSession {
    /// Take ownership of an already-connected socket and spawn its session
    /// task. Used both for the broker's accepted connections and for a
    /// peer's outbound connection to the broker.
    pub fn spawn(
        stream: TcpStream,
        peer_addr: SocketAddr,
        method_handlers: HashMap<String, MethodHandler>,
        hooks: SessionHooks,
    ) -> SessionHandle {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let inner = Arc::new(Inner {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            peer_addr,
            writer_tx,
            pending: Mutex::new(HashMap::new()),
            id_gen: IdGenerator::new(),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        });
        let handle = SessionHandle(inner);

        tokio::spawn(run_session(
            handle.clone(),
            read_half,
            write_half,
            writer_rx,
            method_handlers,
            hooks,
        ));

        handle
    }

    /// Connect to `addr` and spawn its session task, for peer-initiated
    /// connections (the long-lived peer session, or a short-lived
    /// ephemeral call to a located service).
    pub async fn connect(
        addr: SocketAddr,
        method_handlers: HashMap<String, MethodHandler>,
        hooks: SessionHooks,
    ) -> std::io::Result<SessionHandle> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr().unwrap_or(addr);
        Ok(FramedSession::spawn(stream, peer_addr, method_handlers, hooks))
    }
}

async fn run_session(
    handle: SessionHandle,
    read_half: ReadHalf<TcpStream>,
    mut write_half: WriteHalf<TcpStream>,
    mut writer_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    method_handlers: HashMap<String, MethodHandler>,
    hooks: SessionHooks,
) {
    let mut reader = FrameReader::new(read_half);

    loop {
        tokio::select! {
            frame = reader.next_frame() => {
                match frame {
                    Ok(Some(bytes)) => {
                        dispatch(&handle, &bytes, &method_handlers).await;
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(peer = %handle.peer_addr(), %err, "session read error");
                        break;
                    }
                }
            }
            outgoing = writer_rx.recv() => {
                match outgoing {
                    Some(mut bytes) => {
                        bytes.push(TERMINATOR);
                        if let Err(err) = write_half.write_all(&bytes).await {
                            tracing::warn!(peer = %handle.peer_addr(), %err, "session write error");
                            break;
                        }
                    }
                    None => break,
                }
            }
            () = handle.0.close_notify.notified() => {
                break;
            }
        }
    }

    let _ = write_half.shutdown().await;
    handle.close();
    handle.discard_pending();
    if let Some(on_close) = hooks.on_close {
        on_close(handle).await;
    }
}

/// Decode one frame and route it: requests/notifications go to a method
/// handler, responses/errors resolve a pending call. Awaited inline rather
/// than spawned, so messages from one session are processed in the order
/// they arrive.
async fn dispatch(handle: &SessionHandle, bytes: &[u8], method_handlers: &HashMap<String, MethodHandler>) {
    let message = match decode(bytes) {
        Ok(message) => message,
        Err(err) => {
            if let Some(id) = err.id() {
                handle.respond_error(id, &err.as_rpc_error());
            } else {
                tracing::warn!(peer = %handle.peer_addr(), ?err, "discarding undecodable frame");
            }
            return;
        }
    };

    match &message {
        Message::Request { id, method, .. } => match method_handlers.get(method) {
            Some(method_handler) => method_handler(message.clone(), handle.clone()).await,
            None => handle.respond_error(id, &RpcError::method_not_found()),
        },
        Message::Notification { method, .. } => {
            if let Some(method_handler) = method_handlers.get(method) {
                method_handler(message.clone(), handle.clone()).await;
            } else {
                tracing::debug!(peer = %handle.peer_addr(), %method, "no handler for notification");
            }
        }
        Message::Response { id, result } => {
            if !handle.resolve_pending(id, PendingOutcome::Result(result.clone())) {
                tracing::warn!(peer = %handle.peer_addr(), %id, "response with no matching pending call");
            }
        }
        Message::ErrorResponse { id, error } => {
            if !handle.resolve_pending(id, PendingOutcome::Error(error.clone())) {
                tracing::warn!(peer = %handle.peer_addr(), %id, "error response with no matching pending call");
            }
        }
    }
}
