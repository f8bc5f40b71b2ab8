//! Single-client JSON-over-TCP server.
//!
//! One actor polls the listener. When a client connects, that actor
//! becomes the session's writer: it drains the outbound mailbox and writes
//! each value as a frame. A second, per-session actor reads frames and hands
//! each decoded body to the `on_message` callback. Either side failing tears
//! the session down and the acceptor goes back to waiting for a client.

use super::codec::{FrameReader, FrameWriter, ProtocolError, decode_body};
use camctl_common::consts::OUTBOUND_CAPACITY;
use camctl_runtime::actor::ActiveObject;
use camctl_runtime::error::RuntimeError;
use camctl_runtime::mailbox::Mailbox;
use serde_json::Value;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(25);
const SEND_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

enum Outbound {
    Frame(Value),
    /// Ends the current session's writer loop.
    Close,
}

type MessageHandler = Arc<dyn Fn(Value) + Send + Sync + 'static>;

/// Cheap handle for queueing messages to the connected client.
#[derive(Clone)]
pub struct ServerHandle {
    outbound: Arc<Mailbox<Outbound, OUTBOUND_CAPACITY>>,
    connected: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queue `value` for the client. Returns `false` when nobody is
    /// connected and the value was discarded.
    pub fn send(&self, value: Value) -> bool {
        if !self.is_connected() {
            return false;
        }
        if self.outbound.put(Outbound::Frame(value)) {
            warn!("outbound queue full, oldest message dropped");
        }
        true
    }
}

pub struct JsonTcpServer {
    local_addr: SocketAddr,
    handle: ServerHandle,
    acceptor: ActiveObject,
}

impl JsonTcpServer {
    /// Bind the listening socket. Nothing is accepted until [`start`].
    ///
    /// [`start`]: JsonTcpServer::start
    pub fn bind<F>(addr: SocketAddr, max_frame_len: u32, on_message: F) -> Result<Self, TransportError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let bind_err = |source| TransportError::Bind { addr, source };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;

        let handle = ServerHandle {
            outbound: Arc::new(Mailbox::new()),
            connected: Arc::new(AtomicBool::new(false)),
        };
        let on_message: MessageHandler = Arc::new(on_message);

        let session_handle = handle.clone();
        let waker = Arc::clone(&handle.outbound);
        let acceptor = ActiveObject::new(
            "comm-accept",
            move |running| {
                info!(%local_addr, "remote server listening");
                while running.load(Ordering::Acquire) {
                    match listener.accept() {
                        Ok((stream, peer)) => {
                            serve(stream, peer, running, &session_handle, &on_message, max_frame_len);
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                        Err(e) => {
                            warn!("accept failed: {e}");
                            thread::sleep(ACCEPT_POLL);
                        }
                    }
                }
                info!("remote server stopped");
            },
            move || {
                waker.put(Outbound::Close);
            },
        );

        Ok(Self {
            local_addr,
            handle,
            acceptor,
        })
    }

    pub fn start(&mut self) -> Result<(), TransportError> {
        self.acceptor.start()?;
        Ok(())
    }

    /// Close any session and stop accepting. Idempotent.
    pub fn stop(&mut self) {
        self.acceptor.stop();
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }
}

/// Run one client session to completion on the acceptor's thread.
fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    running: &AtomicBool,
    handle: &ServerHandle,
    on_message: &MessageHandler,
    max_frame_len: u32,
) {
    if let Err(e) = stream.set_nonblocking(false).and_then(|()| stream.set_nodelay(true)) {
        warn!(%peer, "cannot configure client socket: {e}");
        return;
    }
    let (reader_stream, shutdown_stream) = match (stream.try_clone(), stream.try_clone()) {
        (Ok(r), Ok(s)) => (r, s),
        (Err(e), _) | (_, Err(e)) => {
            warn!(%peer, "cannot clone client socket: {e}");
            return;
        }
    };

    handle.outbound.clear();
    let session_open = Arc::new(AtomicBool::new(true));
    let mut receiver = {
        let on_message = Arc::clone(on_message);
        let outbound = Arc::clone(&handle.outbound);
        let open = Arc::clone(&session_open);
        ActiveObject::new(
            "comm-rx",
            move |running| {
                receive(reader_stream, running, &on_message, max_frame_len, peer);
                open.store(false, Ordering::Release);
                outbound.put(Outbound::Close);
            },
            move || {
                let _ = shutdown_stream.shutdown(Shutdown::Both);
            },
        )
    };
    handle.connected.store(true, Ordering::Release);
    if let Err(e) = receiver.start() {
        handle.connected.store(false, Ordering::Release);
        error!(%peer, "cannot start receiver: {e}");
        return;
    }
    info!(%peer, "client connected");

    let mut writer = FrameWriter::new(stream, max_frame_len);
    while running.load(Ordering::Acquire) && session_open.load(Ordering::Acquire) {
        match handle.outbound.pop_timeout(SEND_POLL) {
            Some(Outbound::Frame(value)) => {
                if let Err(e) = writer.write_value(&value) {
                    match e {
                        ProtocolError::Oversized { len, max } => {
                            warn!(len, max, "outgoing message over frame limit, dropped");
                        }
                        e => {
                            warn!(%peer, "write failed: {e}");
                            break;
                        }
                    }
                }
            }
            Some(Outbound::Close) | None => {}
        }
    }

    handle.connected.store(false, Ordering::Release);
    receiver.stop();
    info!(%peer, "client disconnected");
}

/// Read frames until EOF, an unrecoverable framing error or stop.
fn receive(
    stream: TcpStream,
    running: &AtomicBool,
    on_message: &MessageHandler,
    max_frame_len: u32,
    peer: SocketAddr,
) {
    let mut reader = FrameReader::new(stream, max_frame_len);
    while running.load(Ordering::Acquire) {
        match reader.read_next() {
            Ok(Some(body)) => match decode_body(&body) {
                Ok(value) => on_message(value),
                Err(e) => warn!(%peer, "dropping frame: {e}"),
            },
            Ok(None) => {
                debug!(%peer, "peer closed the connection");
                return;
            }
            Err(e) => {
                if running.load(Ordering::Acquire) {
                    warn!(%peer, "closing connection: {e}");
                }
                return;
            }
        }
    }
}
