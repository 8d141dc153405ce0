use std::future::Future;
use std::sync::{Arc, Weak};

use async_lock::Mutex;
use log::{debug, info, warn};

use crate::btuuid::{descriptors, nordic_uart};
use crate::connection::{Connection, ConnectionObserver};
use crate::error::{Error, ErrorKind};
use crate::util::ObserverList;
use crate::{Characteristic, ConnectionState, Result};

/// Value of the Client Characteristic Configuration descriptor enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Events of a [`UartSession`], called on the platform's callback thread.
pub trait UartCallback: Send + Sync {
    /// RX notifications are enabled and TX may be written.
    fn connected(&self, _uart: &UartSession) {}

    /// The link went down.
    fn disconnected(&self, _uart: &UartSession) {}

    /// New data has been appended to the receive buffer.
    fn available(&self, _uart: &UartSession) {}
}

/// Text exchange over the Nordic UART service of a connected peripheral.
///
/// Data written by the client goes to the TX characteristic; RX notifications are
/// collected in a receive buffer drained by [`UartSession::read_all`].
#[derive(Clone)]
pub struct UartSession {
    inner: Arc<UartInner>,
}

struct UartInner {
    me: Weak<UartInner>,
    conn: Connection,
    rx_buffer: Mutex<Vec<u8>>,
    tx: Mutex<Option<Characteristic>>,
    rx: Mutex<Option<Characteristic>>,
    callbacks: ObserverList<dyn UartCallback>,
}

impl std::fmt::Debug for UartSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UartSession")
            .field("device", self.inner.conn.device())
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl UartSession {
    pub fn new(conn: Connection) -> Self {
        let inner = Arc::new_cyclic(|me| UartInner {
            me: me.clone(),
            conn,
            rx_buffer: Mutex::new(Vec::new()),
            tx: Mutex::new(None),
            rx: Mutex::new(None),
            callbacks: ObserverList::new(),
        });
        inner.conn.register(&inner);
        Self { inner }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.inner.conn
    }

    /// Whether the session is set up for data exchange.
    pub fn is_ready(&self) -> bool {
        self.inner.tx.lock_blocking().is_some()
    }

    /// Connects and discovers services as needed, then enables RX notifications by writing
    /// the configuration descriptor and subscribing locally.
    ///
    /// The registered callbacks get `connected` only after both steps succeeded.
    pub fn connect(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let inner = self.inner.clone();
        async move { inner.establish().await }
    }

    /// Sends `text` as UTF-8 in a single write to TX.
    pub fn write(&self, text: &str) -> impl Future<Output = Result<()>> + Send + 'static {
        self.write_bytes(text.as_bytes())
    }

    pub fn write_bytes(&self, data: &[u8]) -> impl Future<Output = Result<()>> + Send + 'static {
        let tx = self.inner.tx.lock_blocking().clone();
        let pending = tx
            .ok_or_else(|| Error::new(ErrorKind::NotReady, "the UART session is not connected"))
            .map(|tx| self.inner.conn.write_characteristic(&tx, data));
        async move { pending?.await }
    }

    /// Drains the receive buffer.
    pub fn read_all(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inner.rx_buffer.lock_blocking())
    }

    /// Drains the receive buffer, decoding it as UTF-8. Invalid sequences are replaced
    /// with `U+FFFD`.
    pub fn read_all_string(&self) -> String {
        String::from_utf8_lossy(&self.read_all()).into_owned()
    }

    /// Number of received bytes not yet read.
    pub fn available_len(&self) -> usize {
        self.inner.rx_buffer.lock_blocking().len()
    }

    pub fn disconnect(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.inner.tx.lock_blocking().take();
        self.inner.conn.disconnect()
    }

    /// Registers a callback; it stays registered until unregistered or dropped.
    pub fn register<C: UartCallback + 'static>(&self, callback: &Arc<C>) {
        let weak = Arc::downgrade(callback) as Weak<dyn UartCallback>;
        self.inner.callbacks.register(weak);
    }

    pub fn unregister<C: UartCallback + 'static>(&self, callback: &Arc<C>) {
        self.inner.callbacks.unregister(Arc::as_ptr(callback).cast());
    }
}

impl UartInner {
    fn session(&self) -> Option<UartSession> {
        self.me.upgrade().map(|inner| UartSession { inner })
    }

    async fn establish(self: Arc<Self>) -> Result<()> {
        let conn = &self.conn;
        if conn.state() == ConnectionState::Disconnected {
            conn.connect().await?;
        }
        let services = conn.discover_services().await?;
        let service = services
            .iter()
            .find(|s| s.uuid() == nordic_uart::SERVICE)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no UART service"))?;
        let tx = service
            .characteristic(nordic_uart::TX)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no UART TX characteristic"))?;
        let rx = service
            .characteristic(nordic_uart::RX)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no UART RX characteristic"))?;
        let cccd = rx
            .descriptor(descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    "UART RX has no client characteristic configuration",
                )
            })?;

        // RX is known before subscribing so that no early notification is missed
        self.rx.lock().await.replace(rx.clone());
        let subscribed = async {
            conn.write_descriptor(&cccd, &ENABLE_NOTIFICATION_VALUE).await?;
            conn.set_notification(&rx, true).await
        };
        if let Err(e) = subscribed.await {
            warn!("{}: enabling UART notifications failed: {e}", conn.device());
            self.rx.lock().await.take();
            return Err(e);
        }
        self.tx.lock().await.replace(tx);
        info!("{}: UART ready", conn.device());

        if let Some(session) = self.session() {
            for callback in self.callbacks.snapshot() {
                callback.connected(&session);
            }
        }
        Ok(())
    }
}

impl ConnectionObserver for UartInner {
    fn on_notification(&self, characteristic: &Characteristic, value: &[u8]) {
        let is_rx = self.rx.lock_blocking().as_ref() == Some(characteristic);
        if !is_rx {
            return;
        }
        self.rx_buffer.lock_blocking().extend_from_slice(value);
        debug!("{}: {} byte(s) received", self.conn.device(), value.len());
        if let Some(session) = self.session() {
            for callback in self.callbacks.snapshot() {
                callback.available(&session);
            }
        }
    }

    fn on_disconnected(&self, _reason: Option<&Error>) {
        self.tx.lock_blocking().take();
        self.rx.lock_blocking().take();
        if let Some(session) = self.session() {
            for callback in self.callbacks.snapshot() {
                callback.disconnected(&session);
            }
        }
    }
}
