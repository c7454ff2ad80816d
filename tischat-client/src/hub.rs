//! The dispatch hub: one connection, its lifecycle, and everything that
//! flows over it
//!
//! A [`DispatchHub`] owns a small tokio runtime for socket I/O and a
//! delivery thread that owns the UI delegate and roster. Public operations
//! are synchronous and may be called from any thread outside the runtime.

mod dispatch;
mod link;
mod mailbox;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tischat_protocol::{ProtocolError, Transmission, Vocabulary};
use tischat_utils::{Result, TischatError};

use crate::config::HubConfig;
use crate::handler::{Roster, UiDelegate};
use crate::state::{ConnectionState, ConnectionStateMachine, IllegalTransition, LifecycleEvent, Transition};

use dispatch::{DeliveryEvent, Dispatcher};
use link::{LinkTask, WriterCommand};
use mailbox::{Delivery, ReadRequest, Want};

/// Identifies the live socket of a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketHandle {
    id: u64,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl SocketHandle {
    /// Changes with every connect; never reused
    pub fn connection_id(&self) -> u64 {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// Caller-side handles to a running connection
struct Link {
    id: u64,
    outbound: mpsc::UnboundedSender<WriterCommand>,
    read_requests: mpsc::UnboundedSender<ReadRequest>,
    cancel: CancellationToken,
    socket: Option<SocketHandle>,
}

impl Link {
    fn stop(self) {
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct Inner {
    machine: ConnectionStateMachine,
    link: Option<Link>,
    /// Applied changes the delegate has not heard about yet, oldest first
    notices: VecDeque<Transition>,
}

impl Inner {
    fn apply(&mut self, event: LifecycleEvent) -> std::result::Result<Transition, IllegalTransition> {
        let result = self.machine.apply(event);
        match &result {
            Ok(transition) if transition.is_change() => {
                tracing::info!(%transition, "Connection state changed");
                self.notices.push_back(*transition);
            }
            Ok(_) => {}
            Err(illegal) => tracing::debug!(%illegal, "Transition rejected"),
        }
        result
    }
}

/// State shared by caller threads, socket tasks and the delivery thread
#[derive(Default)]
pub(crate) struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.inner.lock().machine.state()
    }

    fn is_current(&self, id: u64) -> bool {
        self.inner.lock().link.as_ref().is_some_and(|link| link.id == id)
    }

    fn attach_socket(&self, id: u64, handle: SocketHandle) {
        let mut inner = self.inner.lock();
        if let Some(link) = inner.link.as_mut().filter(|link| link.id == id) {
            link.socket = Some(handle);
        }
    }

    /// Apply `event` if `id` is still the live connection
    fn apply_if_current(
        &self,
        id: u64,
        event: LifecycleEvent,
    ) -> Option<std::result::Result<Transition, IllegalTransition>> {
        let mut inner = self.inner.lock();
        if inner.link.as_ref().map(|link| link.id) != Some(id) {
            return None;
        }
        Some(inner.apply(event))
    }

    /// Take the state changes not yet delivered, in the order applied
    pub(crate) fn take_notices(&self) -> Vec<Transition> {
        self.inner.lock().notices.drain(..).collect()
    }

    /// Stop and forget connection `id`
    fn release_link(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.link.as_ref().is_some_and(|link| link.id == id) {
            if let Some(link) = inner.link.take() {
                link.stop();
            }
        }
    }

    /// Connection `id` is gone; settle the state it leaves behind
    fn finish_link(&self, id: u64, lost: bool) -> Option<Transition> {
        let mut inner = self.inner.lock();
        if inner.link.as_ref().map(|link| link.id) != Some(id) {
            return None;
        }
        if let Some(link) = inner.link.take() {
            link.stop();
        }

        let event = match (inner.machine.state(), lost) {
            (ConnectionState::LoggedOut, _) => return None,
            (ConnectionState::LoggingOut, false) => LifecycleEvent::CloseCompleted,
            _ => LifecycleEvent::SocketLost,
        };
        inner.apply(event).ok()
    }
}

/// Owns one chat connection and routes everything that arrives on it.
///
/// Server transmissions are delivered to the [`UiDelegate`] and [`Roster`]
/// exactly once each, in arrival order, on a single delivery thread.
/// Dropping the hub kills the connection and stops that thread.
pub struct DispatchHub {
    runtime: Option<Runtime>,
    config: HubConfig,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<DeliveryEvent>,
    delivery: Option<thread::JoinHandle<()>>,
    next_id: AtomicU64,
}

impl DispatchHub {
    /// Start the I/O runtime and delivery thread. No connection is made.
    pub fn new<D, R>(config: HubConfig, delegate: D, roster: R) -> Result<Self>
    where
        D: UiDelegate + 'static,
        R: Roster + 'static,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.io_threads.max(1))
            .thread_name("tischat-io")
            .enable_all()
            .build()?;

        let shared = Arc::new(Shared::default());
        let (events, delivery_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(Arc::clone(&shared), Box::new(delegate), Box::new(roster));
        let delivery = thread::Builder::new()
            .name("tischat-delivery".into())
            .spawn(move || dispatcher.run(delivery_rx))
            .map_err(|e| TischatError::internal(format!("failed to start delivery thread: {}", e)))?;

        tracing::debug!(io_threads = config.io_threads, "Dispatch hub started");

        Ok(Self {
            runtime: Some(runtime),
            config,
            shared,
            events,
            delivery: Some(delivery),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.config.vocabulary
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Start connecting in the background.
    ///
    /// Returns `false` if a connection is already in progress or the host
    /// is empty. Sends nothing; log in once the delegate hears `connected`.
    pub fn connect(&self, host: &str, port: u16) -> bool {
        if host.is_empty() {
            tracing::warn!("Refusing to connect to an empty host");
            return false;
        }
        let Some(runtime) = self.runtime.as_ref() else {
            return false;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        {
            let mut inner = self.shared.inner.lock();
            if inner.apply(LifecycleEvent::ConnectRequested).is_err() {
                return false;
            }
            let replaced = inner.link.replace(Link {
                id,
                outbound: outbound_tx,
                read_requests: read_tx,
                cancel: cancel.clone(),
                socket: None,
            });
            if let Some(old) = replaced {
                old.stop();
            }
        }
        self.notify();

        tracing::info!(host, port, id, "Connecting");
        runtime.spawn(link::run(LinkTask {
            id,
            host: host.to_string(),
            port,
            vocab: Arc::clone(&self.config.vocabulary),
            max_line_length: self.config.max_line_length,
            connect_timeout: self.config.connect_timeout,
            outbound: outbound_rx,
            read_requests: read_rx,
            cancel,
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
        }));
        true
    }

    /// Queue a transmission for the writer.
    ///
    /// Concurrent callers are written in the order their calls took the
    /// queue. Returns `false` when there is no open connection to write to.
    pub fn send(&self, transmission: Transmission) -> bool {
        let inner = self.shared.inner.lock();
        let open = matches!(
            inner.machine.state(),
            ConnectionState::Connecting | ConnectionState::Welcomed
        );
        match inner.link.as_ref() {
            Some(link) if open => link
                .outbound
                .send(WriterCommand::Send(transmission))
                .is_ok(),
            _ => {
                tracing::debug!(verb = transmission.verb(), "Not connected, dropping transmission");
                false
            }
        }
    }

    /// Block until the socket yields bytes up to and including `delimiter`.
    ///
    /// `None` if the connection closes first, if there is no connection, or
    /// if called from inside an async runtime. Concurrent callers are
    /// answered one at a time in the order they called, each with the bytes
    /// that follow the previous answer. Gives up on the connection if more
    /// than `max_line_length` bytes arrive without the delimiter.
    pub fn read_to(&self, delimiter: &[u8]) -> Option<Bytes> {
        if delimiter.is_empty() {
            return None;
        }
        match self.blocking_read(Want::Through(Bytes::copy_from_slice(delimiter)))? {
            Delivery::Chunk(chunk) => Some(chunk),
            _ => None,
        }
    }

    /// Block until one whole transmission has been read, bypassing routing.
    ///
    /// `None` under the same conditions as [`read_to`](Self::read_to). A
    /// transmission cut off by the connection closing comes back as
    /// [`ProtocolError::Truncated`].
    pub fn read_transmission(&self) -> Option<std::result::Result<Transmission, ProtocolError>> {
        match self.blocking_read(Want::Transmission)? {
            Delivery::Frame(frame) => Some(frame.parse(&self.config.vocabulary)),
            _ => None,
        }
    }

    /// Finish queued writes, send the close handshake, then disconnect
    pub fn graceful(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if !matches!(
                inner.machine.state(),
                ConnectionState::Connecting | ConnectionState::Welcomed
            ) {
                return;
            }
            if inner.apply(LifecycleEvent::CloseRequested).is_err() {
                return;
            }

            match inner.link.as_ref() {
                Some(link) => {
                    match self.config.vocabulary.close() {
                        Ok(close) => {
                            let _ = link.outbound.send(WriterCommand::Send(close));
                        }
                        Err(e) => tracing::debug!("No close handshake: {}", e),
                    }
                    let _ = link.outbound.send(WriterCommand::Shutdown);
                }
                None => {
                    let _ = inner.apply(LifecycleEvent::CloseCompleted);
                }
            }
        }
        self.notify();
    }

    /// Drop the connection now, discarding unsent writes and releasing any
    /// blocked reader
    pub fn kill(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if let Some(link) = inner.link.take() {
                tracing::info!(id = link.id, "Killing connection");
                link.stop();
            }
            let _ = inner.apply(LifecycleEvent::Killed);
        }
        self.notify();
    }

    /// The live socket, if connected
    pub fn current_socket_handle(&self) -> Option<SocketHandle> {
        self.shared.inner.lock().link.as_ref().and_then(|link| link.socket)
    }

    fn blocking_read(&self, want: Want) -> Option<Delivery> {
        if tokio::runtime::Handle::try_current().is_ok() {
            tracing::error!("Blocking read called from inside an async runtime, refusing");
            return None;
        }
        let (request, mailbox) = mailbox::arm(want);
        {
            let inner = self.shared.inner.lock();
            let link = inner.link.as_ref()?;
            link.read_requests.send(request).ok()?;
        }
        Some(mailbox.wait())
    }

    /// Wake the delivery thread to pass on queued state changes
    fn notify(&self) {
        let _ = self.events.send(DeliveryEvent::StateChanged);
    }
}

impl Drop for DispatchHub {
    fn drop(&mut self) {
        self.kill();
        let _ = self.events.send(DeliveryEvent::Shutdown);

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        if let Some(delivery) = self.delivery.take() {
            if delivery.thread().id() == thread::current().id() {
                return;
            }
            if delivery.join().is_err() {
                tracing::error!("Delivery thread panicked");
            }
        }
        tracing::debug!("Dispatch hub stopped");
    }
}
