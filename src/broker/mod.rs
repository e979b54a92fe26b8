//! The broker (C4): concurrent pumps, listener registry, writer
//! serialisation, and lifecycle.

mod pumps;
mod registry;
mod transaction;

pub use registry::CancelHandle;
pub use transaction::Subscription;

use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::library::MessageLibrary;

use pumps::SendJob;
use registry::ListenerRegistry;

/// Bounded outbound queue depth. The 51st concurrent sender blocks until the
/// send pump drains one (§4.3).
pub const PERMITTED_QUEUED_REQUESTS: usize = 50;

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

struct PumpHandles {
    send: JoinHandle<()>,
    receive: JoinHandle<()>,
}

pub(crate) struct Inner {
    pub(crate) library: MessageLibrary,
    pub(crate) registry: ListenerRegistry,
    pub(crate) send_tx: mpsc::Sender<SendJob>,
    send_rx: StdMutex<Option<mpsc::Receiver<SendJob>>>,
    transport: StdMutex<Option<(BoxedReader, BoxedWriter)>>,
    /// Held for the full duration of any SREQ transaction, enforcing UNPI's
    /// half-duplex SREQ/SRSP rule (§4.3 "Synchronous gate").
    pub(crate) sync_gate: AsyncMutex<()>,
    shutdown: CancellationToken,
    pumps: StdMutex<Option<PumpHandles>>,
}

/// A running UNPI transaction broker.
///
/// Created bound to a reader and a writer ([`Broker::new`]); [`Broker::start`]
/// spawns the send and receive pumps. Any number of transactions
/// ([`Broker::request`], [`Broker::request_response`], [`Broker::await_message`],
/// [`Broker::subscribe`]) may run concurrently; [`Broker::stop`] tears both
/// pumps down.
#[derive(Clone)]
pub struct Broker {
    pub(crate) inner: Arc<Inner>,
}

impl Broker {
    /// Bind a broker to `reader`/`writer` and populate it with `library`.
    /// Does not start the pumps — call [`Broker::start`] for that.
    pub fn new<R, W>(reader: R, writer: W, library: MessageLibrary) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (send_tx, send_rx) = mpsc::channel(PERMITTED_QUEUED_REQUESTS);

        Self {
            inner: Arc::new(Inner {
                library,
                registry: ListenerRegistry::new(),
                send_tx,
                send_rx: StdMutex::new(Some(send_rx)),
                transport: StdMutex::new(Some((Box::new(reader), Box::new(writer)))),
                sync_gate: AsyncMutex::new(()),
                shutdown: CancellationToken::new(),
                pumps: StdMutex::new(None),
            }),
        }
    }

    /// Spawn the send and receive pumps. At most one pair of pumps exists per
    /// broker; calling `start` a second time is a no-op.
    pub fn start(&self) {
        let mut pumps = self.inner.pumps.lock().unwrap();
        if pumps.is_some() {
            return;
        }

        let (reader, writer) = match self.inner.transport.lock().unwrap().take() {
            Some(t) => t,
            None => return, // already started and transport consumed
        };
        let send_rx = match self.inner.send_rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => return,
        };

        let send_shutdown = self.inner.shutdown.clone();
        let receive_shutdown = self.inner.shutdown.clone();
        let registry = self.inner.registry.clone();

        let send = tokio::spawn(pumps::send_pump(writer, send_rx, send_shutdown));
        let receive = tokio::spawn(pumps::receive_pump(reader, registry, receive_shutdown));

        *pumps = Some(PumpHandles { send, receive });
    }

    /// Signal both pumps to stop. The send pump drains no further requests;
    /// the receive pump exits after its current blocked read returns or the
    /// stream closes — see Design Note "shutdown races" for why this may not
    /// be immediate.
    pub fn stop(&self) {
        self.inner.shutdown.cancel();
    }

    /// The message library this broker was constructed with.
    pub fn library(&self) -> &MessageLibrary {
        &self.inner.library
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handles) = self.pumps.lock().unwrap().take() {
            handles.send.abort();
            handles.receive.abort();
        }
    }
}
