use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_lock::{Mutex, OnceCell};
use futures_lite::FutureExt;
use futures_timer::Delay;
use log::{debug, info, trace, warn};
use uuid::Uuid;

use crate::async_util::{Excluder, Notifier, NotifierReceiver, ResultWaiter};
use crate::error::{Error, ErrorKind, GattStatus};
use crate::gatt_queue::{GattQueue, GattReply, GattRequest, Issue, Ticket};
use crate::gatt_tree::GattTree;
use crate::platform::{GattEvent, GattLink};
use crate::util::{BoolExt, ObserverList, OptionExt};
use crate::{Characteristic, ConnectionState, Descriptor, DeviceId, Result, Service};

/// Timeouts and buffer sizes of a [`Connection`].
///
/// No timeout is set by default: a request the platform never completes stays pending
/// until the link goes down.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    connect_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    notification_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            operation_timeout: None,
            notification_capacity: 32,
        }
    }
}

impl ConnectionConfig {
    /// Fails `connect()` with [`ErrorKind::Timeout`] and drops the link when the platform
    /// doesn't report the connection in time.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Bounds service discovery, each characteristic/descriptor request and solicited
    /// disconnects.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Number of notifications a lagging stream subscriber may fall behind before the
    /// oldest are dropped.
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }
}

/// Receives connection events synchronously on the platform's callback thread.
///
/// Implementations must hand UI work over to their own thread.
pub trait ConnectionObserver: Send + Sync {
    /// A characteristic with notifications enabled changed its value.
    fn on_notification(&self, _characteristic: &Characteristic, _value: &[u8]) {}

    /// The link went down; `reason` is `None` for a requested disconnect.
    fn on_disconnected(&self, _reason: Option<&Error>) {}
}

/// Stream of value changes of one characteristic.
pub type Notifications = NotifierReceiver<Vec<u8>>;

/// The GATT client state machine of one peripheral.
///
/// Every operation issues its platform request when called and returns a future for its
/// single completion. Characteristic and descriptor requests go through one queue and
/// reach the link strictly one at a time, in call order.
///
/// `Connection` is cheap to clone; clones share the same link.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    device: DeviceId,
    link: Arc<dyn GattLink>,
    config: ConnectionConfig,
    state: Mutex<LinkState>,
    connect: Excluder<Result<()>>,
    discover: Excluder<Result<Vec<Service>>>,
    queue: GattQueue,
    notifiers: Mutex<HashMap<Characteristic, Notifier<Vec<u8>>>>,
    observers: ObserverList<dyn ConnectionObserver>,
}

struct LinkState {
    state: ConnectionState,
    tree: GattTree,
    subscriptions: HashSet<Characteristic>,
    disconnected: Arc<OnceCell<Option<Error>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut f = f.debug_struct("Connection");
        f.field("device", &self.inner.device);
        f.field("state", &self.state());
        f.finish()
    }
}

impl Connection {
    pub fn new(device: DeviceId, link: Arc<dyn GattLink>) -> Self {
        Self::with_config(device, link, ConnectionConfig::default())
    }

    pub fn with_config(device: DeviceId, link: Arc<dyn GattLink>, config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                device,
                link,
                config,
                state: Mutex::new(LinkState {
                    state: ConnectionState::Disconnected,
                    tree: GattTree::default(),
                    subscriptions: HashSet::new(),
                    disconnected: Arc::new(OnceCell::new()),
                }),
                connect: Excluder::new(),
                discover: Excluder::new(),
                queue: GattQueue::default(),
                notifiers: Mutex::new(HashMap::new()),
                observers: ObserverList::new(),
            }),
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.inner.device
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock_blocking().state
    }

    /// Characteristic and descriptor requests not yet completed, including the one in flight.
    pub fn pending_operations(&self) -> usize {
        self.inner.queue.len()
    }

    /// Previously discovered services; empty until discovery succeeded.
    pub fn services(&self) -> Vec<Service> {
        self.inner.state.lock_blocking().tree.services()
    }

    /// The discovered service with the given [Uuid].
    pub fn service(&self, uuid: Uuid) -> Option<Service> {
        self.inner.state.lock_blocking().tree.find_service(uuid).cloned()
    }

    /// Brings the link up.
    ///
    /// Only valid while disconnected. Fails with [`ErrorKind::ConnectFailure`] carrying the
    /// platform status; a failed attempt leaves the connection disconnected.
    pub fn connect(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let inner = self.inner.clone();
        let waiter = inner.begin_connect();
        async move {
            let waiter = waiter?;
            match waiter.wait_unlock(inner.config.connect_timeout).await {
                Some(result) => result,
                None => {
                    warn!("{}: connection attempt timed out", inner.device);
                    inner.abort_connect();
                    Err(ErrorKind::Timeout.into())
                }
            }
        }
    }

    /// Discovers the peripheral's services, moving from `Connected` to `Ready`.
    ///
    /// A failure ends the connection attempt: the link is dropped and a fresh
    /// [`Connection::connect`] is required. When already `Ready`, the known services are
    /// returned.
    pub fn discover_services(&self) -> impl Future<Output = Result<Vec<Service>>> + Send + 'static {
        let inner = self.inner.clone();
        let waiter = inner.begin_discovery();
        async move {
            let waiter = match waiter? {
                Discovery::Known(services) => return Ok(services),
                Discovery::Started(waiter) => waiter,
            };
            match waiter.wait_unlock(inner.config.operation_timeout).await {
                Some(result) => result,
                None => {
                    warn!("{}: service discovery timed out", inner.device);
                    inner.discover.cancel();
                    inner.drop_link();
                    Err(ErrorKind::Timeout.into())
                }
            }
        }
    }

    /// Reads the value of `characteristic` from the peripheral.
    pub fn read_characteristic(
        &self,
        characteristic: &Characteristic,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send + 'static {
        let reply = self
            .inner
            .submit(GattRequest::ReadCharacteristic(characteristic.clone()));
        async move { reply.await.map(GattReply::into_value) }
    }

    /// Writes `value` to `characteristic`, with response.
    pub fn write_characteristic(
        &self,
        characteristic: &Characteristic,
        value: &[u8],
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let reply = self.inner.submit(GattRequest::WriteCharacteristic(
            characteristic.clone(),
            value.to_vec(),
        ));
        async move { reply.await.map(|_| ()) }
    }

    /// Reads the value of `descriptor` from the peripheral.
    pub fn read_descriptor(
        &self,
        descriptor: &Descriptor,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send + 'static {
        let reply = self
            .inner
            .submit(GattRequest::ReadDescriptor(descriptor.clone()));
        async move { reply.await.map(GattReply::into_value) }
    }

    /// Writes `value` to `descriptor`.
    pub fn write_descriptor(
        &self,
        descriptor: &Descriptor,
        value: &[u8],
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let reply = self.inner.submit(GattRequest::WriteDescriptor(
            descriptor.clone(),
            value.to_vec(),
        ));
        async move { reply.await.map(|_| ()) }
    }

    /// Switches local delivery of value changes for `characteristic` on or off.
    ///
    /// While enabled, every value change reaches the [`Connection::notifications`] streams
    /// and the registered observers. Disabling ends the streams. This doesn't write the
    /// peripheral's Client Characteristic Configuration descriptor.
    pub fn set_notification(
        &self,
        characteristic: &Characteristic,
        enabled: bool,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let reply = self
            .inner
            .submit(GattRequest::SetNotification(characteristic.clone(), enabled));
        async move { reply.await.map(|_| ()) }
    }

    /// Subscribes to value changes of `characteristic`.
    ///
    /// The stream may be created before notifications are enabled; it ends when they are
    /// disabled or the link goes down.
    pub fn notifications(&self, characteristic: &Characteristic) -> Result<Notifications> {
        let st = self.inner.state.lock_blocking();
        st.tree
            .find_characteristic(characteristic)
            .ok_or_check_conn(st.state)?;
        let mut notifiers = self.inner.notifiers.lock_blocking();
        let notifier = notifiers
            .entry(characteristic.clone())
            .or_insert_with(|| Notifier::new(self.inner.config.notification_capacity));
        Ok(notifier.subscribe())
    }

    /// Drops the link. Always succeeds, also when already disconnected.
    ///
    /// Operations it supersedes do not resolve normally: a pending `connect()`, a running
    /// service discovery and every queued characteristic or descriptor request fail with
    /// [`ErrorKind::NotConnected`], since none of them can produce its value.
    pub fn disconnect(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let inner = self.inner.clone();
        let signal = inner.begin_disconnect();
        async move {
            let Some(signal) = signal else {
                return Ok(());
            };
            let done = async {
                signal.wait().await;
                true
            };
            let finished = match inner.config.operation_timeout {
                Some(dur) => {
                    done.or(async {
                        Delay::new(dur).await;
                        false
                    })
                    .await
                }
                None => done.await,
            };
            if !finished {
                warn!("{}: no disconnect callback, dropping link state", inner.device);
                inner.on_link_down(GattStatus::SUCCESS);
            }
            Ok(())
        }
    }

    /// Resolves once, when the current (or next) link goes down. Carries the error for an
    /// unrequested disconnect or a failed connection attempt, `None` otherwise.
    pub fn disconnected(&self) -> impl Future<Output = Option<Error>> + Send + 'static {
        let signal = self.inner.state.lock_blocking().disconnected.clone();
        async move { signal.wait().await.clone() }
    }

    /// Registers an observer; it stays registered until unregistered or dropped.
    pub fn register<O: ConnectionObserver + 'static>(&self, observer: &Arc<O>) {
        let weak = Arc::downgrade(observer) as std::sync::Weak<dyn ConnectionObserver>;
        self.inner.observers.register(weak);
    }

    pub fn unregister<O: ConnectionObserver + 'static>(&self, observer: &Arc<O>) {
        self.inner.observers.unregister(Arc::as_ptr(observer).cast());
    }

    /// Platform callback: dispatches one GATT event to the request waiting for it.
    ///
    /// Events nothing is waiting for (repeated callbacks, completions after a timeout)
    /// are dropped.
    pub fn handle_event(&self, event: GattEvent) {
        trace!("{}: {:?}", self.inner.device, event);
        let inner = &self.inner;
        match event {
            GattEvent::ConnectionStateChanged {
                status,
                connected: true,
            } => inner.on_link_up(status),
            GattEvent::ConnectionStateChanged {
                status,
                connected: false,
            } => inner.on_link_down(status),
            GattEvent::ServicesDiscovered { status, services } => {
                inner.on_services_discovered(status, services)
            }
            GattEvent::CharacteristicRead {
                characteristic,
                status,
                value,
            } => inner.on_request_complete(
                |req| matches!(req, GattRequest::ReadCharacteristic(c) if *c == characteristic),
                status
                    .check(ErrorKind::OperationFailure)
                    .map(|()| GattReply::Value(value)),
            ),
            GattEvent::CharacteristicWrite {
                characteristic,
                status,
            } => inner.on_request_complete(
                |req| matches!(req, GattRequest::WriteCharacteristic(c, _) if *c == characteristic),
                status
                    .check(ErrorKind::OperationFailure)
                    .map(|()| GattReply::Done),
            ),
            GattEvent::DescriptorRead {
                descriptor,
                status,
                value,
            } => inner.on_request_complete(
                |req| matches!(req, GattRequest::ReadDescriptor(d) if *d == descriptor),
                status
                    .check(ErrorKind::OperationFailure)
                    .map(|()| GattReply::Value(value)),
            ),
            GattEvent::DescriptorWrite { descriptor, status } => inner.on_request_complete(
                |req| matches!(req, GattRequest::WriteDescriptor(d, _) if *d == descriptor),
                status
                    .check(ErrorKind::OperationFailure)
                    .map(|()| GattReply::Done),
            ),
            GattEvent::CharacteristicChanged {
                characteristic,
                value,
            } => inner.on_value_changed(&characteristic, &value),
        }
    }
}

enum Discovery {
    Known(Vec<Service>),
    Started(ResultWaiter<Result<Vec<Service>>>),
}

impl GattReply {
    fn into_value(self) -> Vec<u8> {
        match self {
            GattReply::Value(value) => value,
            GattReply::Done => Vec::new(),
        }
    }
}

// NOTE: the state lock is never held while calling into the link or into observers,
// since a platform may fire callbacks synchronously from inside a command.
impl ConnectionInner {
    fn begin_connect(&self) -> Result<ResultWaiter<Result<()>>> {
        let waiter = {
            let mut st = self.state.lock_blocking();
            if st.state != ConnectionState::Disconnected {
                return Err(Error::new(
                    ErrorKind::NotReady,
                    format!("cannot connect while {}", st.state),
                ));
            }
            let waiter = self.connect.try_lock().ok_or_else(|| {
                Error::new(ErrorKind::Internal, "a connection attempt is already pending")
            })?;
            st.state = ConnectionState::Connecting;
            st.tree.clear();
            st.subscriptions.clear();
            if st.disconnected.is_initialized() {
                st.disconnected = Arc::new(OnceCell::new());
            }
            waiter
        };
        info!("{}: connecting", self.device);
        if let Err(e) = self.link.connect().non_false(ErrorKind::ConnectFailure) {
            self.connect.cancel();
            let mut st = self.state.lock_blocking();
            if st.state == ConnectionState::Connecting {
                st.state = ConnectionState::Disconnected;
            }
            return Err(e);
        }
        Ok(waiter)
    }

    fn abort_connect(&self) {
        self.connect.cancel();
        self.drop_link();
    }

    fn begin_discovery(&self) -> Result<Discovery> {
        let waiter = {
            let mut st = self.state.lock_blocking();
            match st.state {
                ConnectionState::Connected => (),
                ConnectionState::Ready => return Ok(Discovery::Known(st.tree.services())),
                ConnectionState::DiscoveringServices => {
                    return Err(Error::new(
                        ErrorKind::NotReady,
                        "service discovery is already running",
                    ))
                }
                _ => return Err(ErrorKind::NotConnected.into()),
            }
            let waiter = self.discover.try_lock().ok_or_else(|| {
                Error::new(ErrorKind::Internal, "service discovery is already pending")
            })?;
            st.state = ConnectionState::DiscoveringServices;
            waiter
        };
        debug!("{}: discovering services", self.device);
        if let Err(e) = self
            .link
            .discover_services()
            .non_false(ErrorKind::DiscoveryFailure)
        {
            self.discover.cancel();
            self.tear_down();
            return Err(e);
        }
        Ok(Discovery::Started(waiter))
    }

    /// Moves to `Disconnecting` and asks the link to go down. Returns the signal to wait
    /// for, or `None` if already disconnected.
    fn begin_disconnect(&self) -> Option<Arc<OnceCell<Option<Error>>>> {
        let (signal, prev) = {
            let mut st = self.state.lock_blocking();
            let prev = st.state;
            match prev {
                ConnectionState::Disconnected => return None,
                ConnectionState::Disconnecting => return Some(st.disconnected.clone()),
                _ => st.state = ConnectionState::Disconnecting,
            }
            (st.disconnected.clone(), prev)
        };
        info!("{}: disconnecting (was {prev})", self.device);
        self.link.disconnect();
        Some(signal)
    }

    /// Ends a failed attempt: the link is asked to go down without waiting for it.
    fn tear_down(&self) {
        let _ = self.begin_disconnect();
    }

    /// Ends an attempt the platform stopped answering: the link is asked to go down and
    /// the connection is reset locally, since the disconnect callback may never come.
    fn drop_link(&self) {
        self.tear_down();
        self.on_link_down(GattStatus::SUCCESS);
    }

    fn on_link_up(&self, status: GattStatus) {
        {
            let mut st = self.state.lock_blocking();
            if st.state != ConnectionState::Connecting {
                warn!(
                    "{}: unexpected connected event while {}",
                    self.device, st.state
                );
                return;
            }
            if status.is_success() {
                st.state = ConnectionState::Connected;
            }
        }
        if status.is_success() {
            info!("{}: connected", self.device);
            self.connect.unlock(Ok(()));
        } else {
            self.on_link_down(status);
        }
    }

    fn on_link_down(&self, status: GattStatus) {
        let (prev, signal) = {
            let mut st = self.state.lock_blocking();
            let prev = st.state;
            if prev == ConnectionState::Disconnected {
                debug!("{}: repeated disconnect event dropped", self.device);
                return;
            }
            st.state = ConnectionState::Disconnected;
            st.tree.clear();
            st.subscriptions.clear();
            (prev, st.disconnected.clone())
        };
        let reason = match prev {
            ConnectionState::Disconnecting => None,
            ConnectionState::Connecting => Some(Error::new(
                ErrorKind::ConnectFailure(status),
                "the link went down while connecting",
            )),
            _ => Some(Error::from(ErrorKind::LinkLost(status))),
        };
        match &reason {
            None => info!("{}: disconnected", self.device),
            Some(e) => warn!("{}: disconnected while {prev}: {e}", self.device),
        }
        let cancelled = reason
            .clone()
            .unwrap_or_else(|| Error::new(ErrorKind::NotConnected, "cancelled by disconnect"));

        self.connect.unlock(Err(cancelled.clone()));
        self.discover.unlock(Err(cancelled.clone()));
        self.queue.fail_all(&cancelled);
        let notifiers: Vec<_> = self.notifiers.lock_blocking().drain().collect();
        for (_, notifier) in notifiers {
            notifier.close();
        }
        let _ = signal.set_blocking(reason.clone());
        for observer in self.observers.snapshot() {
            observer.on_disconnected(reason.as_ref());
        }
    }

    fn on_services_discovered(&self, status: GattStatus, services: Vec<Service>) {
        let discovered = {
            let mut st = self.state.lock_blocking();
            if st.state != ConnectionState::DiscoveringServices {
                warn!(
                    "{}: unexpected discovery result while {}",
                    self.device, st.state
                );
                return;
            }
            if status.is_success() {
                st.tree.replace(services);
                st.state = ConnectionState::Ready;
                Some(st.tree.services())
            } else {
                None
            }
        };
        match discovered {
            Some(services) => {
                info!(
                    "{}: ready, {} service(s) discovered",
                    self.device,
                    services.len()
                );
                self.discover.unlock(Ok(services));
            }
            None => {
                warn!("{}: service discovery failed ({status})", self.device);
                self.discover
                    .unlock(Err(ErrorKind::DiscoveryFailure(status).into()));
                self.tear_down();
            }
        }
    }

    /// Queues `request` and issues it if the link is idle. The request is rejected right
    /// away when its target is unknown or the connection is not ready.
    fn submit(
        self: &Arc<Self>,
        request: GattRequest,
    ) -> impl Future<Output = Result<GattReply>> + Send + 'static {
        let submitted = self.admit(request);
        let this = self.clone();
        async move {
            let ticket = submitted?;
            let id = ticket.id;
            match ticket.wait(this.config.operation_timeout).await {
                Some(result) => result,
                None => {
                    warn!("{}: request #{id} timed out", this.device);
                    let next = this.queue.abandon(id);
                    this.pump(next);
                    Err(ErrorKind::Timeout.into())
                }
            }
        }
    }

    fn admit(&self, request: GattRequest) -> Result<Ticket> {
        let (ticket, issue) = {
            let st = self.state.lock_blocking();
            if st.state != ConnectionState::Ready {
                None::<()>.ok_or_check_conn(st.state)?;
            }
            match &request {
                GattRequest::ReadCharacteristic(c) | GattRequest::WriteCharacteristic(c, _) => {
                    st.tree.find_characteristic(c).ok_or_check_conn(st.state)?;
                }
                GattRequest::SetNotification(c, enabled) => {
                    let found = st.tree.find_characteristic(c).ok_or_check_conn(st.state)?;
                    if *enabled && !found.properties().can_notify() {
                        return Err(Error::new(
                            ErrorKind::NotSupported,
                            format!("characteristic {} cannot notify", c.uuid()),
                        ));
                    }
                }
                GattRequest::ReadDescriptor(d) | GattRequest::WriteDescriptor(d, _) => {
                    st.tree.find_descriptor(d).ok_or_check_conn(st.state)?;
                }
            }
            self.queue.push(request)
        };
        self.pump(issue);
        Ok(ticket)
    }

    /// Hands requests to the link until one is left waiting for its callback.
    fn pump(&self, mut next: Option<Issue>) {
        while let Some(issue) = next.take() {
            trace!("{}: issuing #{} {:?}", self.device, issue.id, issue.request);
            let link = &self.link;
            let accepted = match &issue.request {
                GattRequest::ReadCharacteristic(c) => link.read_characteristic(c),
                GattRequest::WriteCharacteristic(c, value) => link.write_characteristic(c, value),
                GattRequest::ReadDescriptor(d) => link.read_descriptor(d),
                GattRequest::WriteDescriptor(d, value) => link.write_descriptor(d, value),
                GattRequest::SetNotification(c, enabled) => {
                    let accepted = link.set_characteristic_notification(c, *enabled);
                    if accepted {
                        self.apply_subscription(c, *enabled);
                    }
                    let result = accepted
                        .non_false(ErrorKind::OperationFailure)
                        .map(|()| GattReply::Done);
                    next = self.queue.finish(issue.id, result);
                    continue;
                }
            };
            if let Err(e) = accepted.non_false(ErrorKind::OperationFailure) {
                next = self.queue.finish(issue.id, Err(e));
            }
        }
    }

    fn apply_subscription(&self, characteristic: &Characteristic, enabled: bool) {
        {
            let mut st = self.state.lock_blocking();
            if st.state != ConnectionState::Ready {
                return;
            }
            if enabled {
                st.subscriptions.insert(characteristic.clone());
            } else {
                st.subscriptions.remove(characteristic);
            }
        }
        debug!(
            "{}: notifications {} for {}",
            self.device,
            if enabled { "enabled" } else { "disabled" },
            characteristic.uuid()
        );
        if !enabled {
            let notifier = self.notifiers.lock_blocking().remove(characteristic);
            if let Some(notifier) = notifier {
                notifier.close();
            }
        }
    }

    fn on_request_complete(
        &self,
        matches: impl FnOnce(&GattRequest) -> bool,
        result: Result<GattReply>,
    ) {
        match self.queue.complete_current(matches, result) {
            Ok(next) => self.pump(next),
            Err(_) => debug!(
                "{}: completion dropped, no matching request in flight",
                self.device
            ),
        }
    }

    fn on_value_changed(&self, characteristic: &Characteristic, value: &[u8]) {
        let subscribed = self
            .state
            .lock_blocking()
            .subscriptions
            .contains(characteristic);
        if !subscribed {
            debug!(
                "{}: value change of {} dropped, notifications are off",
                self.device,
                characteristic.uuid()
            );
            return;
        }
        if let Some(notifier) = self.notifiers.lock_blocking().get(characteristic) {
            notifier.notify(value.to_vec());
        }
        for observer in self.observers.snapshot() {
            observer.on_notification(characteristic, value);
        }
    }
}
