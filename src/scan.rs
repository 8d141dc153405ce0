use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task;

use async_lock::Mutex;
use futures_core::Stream;
use log::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{Error, ErrorKind};
use crate::platform::AdapterBackend;
use crate::{DeviceId, DiscoveredPeripheral, Result};

/// Which advertisements a scan reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    services: Option<Vec<Uuid>>,
    report_duplicates: bool,
}

impl ScanFilter {
    /// Reports every peripheral.
    pub fn any() -> Self {
        Self::default()
    }

    /// Reports peripherals advertising `service`.
    pub fn service(service: Uuid) -> Self {
        Self::services([service])
    }

    /// Reports peripherals advertising at least one of `services`.
    pub fn services(services: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            services: Some(services.into_iter().collect()),
            report_duplicates: false,
        }
    }

    /// By default a device is reported once per scan; with `true` every matching
    /// advertisement is reported.
    pub fn report_duplicates(mut self, report_duplicates: bool) -> Self {
        self.report_duplicates = report_duplicates;
        self
    }

    /// The service identifiers this filter requires, if any.
    pub fn service_uuids(&self) -> Option<&[Uuid]> {
        self.services.as_deref()
    }

    /// Checks the peripheral's decoded advertising data against the filter.
    pub fn matches(&self, peripheral: &DiscoveredPeripheral) -> bool {
        match &self.services {
            None => true,
            Some(wanted) => {
                let advertised = peripheral.service_uuids();
                wanted.iter().any(|uuid| advertised.contains(uuid))
            }
        }
    }
}

/// Lifecycle of a [`Scanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanState {
    Idle,
    Scanning,
    Stopped,
}

/// Turns the adapter's start/stop scan primitive into one cancelable scan at a time.
///
/// The platform binding forwards every advertisement to [`Scanner::on_advertisement`].
pub struct Scanner {
    adapter: Arc<dyn AdapterBackend>,
    inner: Mutex<ScannerInner>,
}

struct ScannerInner {
    state: ScanState,
    next_id: u64,
    active: Option<ActiveScan>,
}

struct ActiveScan {
    id: u64,
    filter: ScanFilter,
    seen: HashSet<DeviceId>,
    sender: async_channel::Sender<DiscoveredPeripheral>,
}

/// Discovered peripherals of one scan.
///
/// The stream ends, without error, once the scan is stopped or superseded by a newer one.
pub struct ScanHandle {
    receiver: Pin<Box<async_channel::Receiver<DiscoveredPeripheral>>>,
}

impl Scanner {
    pub fn new(adapter: Arc<dyn AdapterBackend>) -> Self {
        Self {
            adapter,
            inner: Mutex::new(ScannerInner {
                state: ScanState::Idle,
                next_id: 0,
                active: None,
            }),
        }
    }

    pub fn state(&self) -> ScanState {
        self.inner.lock_blocking().state
    }

    /// Starts a scan, resolving the previous one if it is still running.
    ///
    /// Fails with [`ErrorKind::StartFailure`] if the adapter cannot begin scanning.
    pub fn start(&self, filter: ScanFilter) -> Result<ScanHandle> {
        let (sender, receiver) = async_channel::unbounded();
        let native_filter = filter.services.clone();
        let (id, superseded) = {
            let mut inner = self.inner.lock_blocking();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.state = ScanState::Scanning;
            let prev = inner.active.replace(ActiveScan {
                id,
                filter,
                seen: HashSet::new(),
                sender,
            });
            (id, prev)
        };
        if let Some(prev) = superseded {
            info!("scan #{} superseded by scan #{id}", prev.id);
            self.adapter.stop_scan();
            drop(prev);
        }

        if !self.adapter.start_scan(native_filter.as_deref()) {
            let mut inner = self.inner.lock_blocking();
            if inner.active.as_ref().is_some_and(|a| a.id == id) {
                inner.active = None;
                inner.state = ScanState::Stopped;
            }
            warn!("scan #{id} could not be started");
            return Err(Error::new(
                ErrorKind::StartFailure,
                "the adapter refused to scan",
            ));
        }
        info!("scan #{id} started");
        Ok(ScanHandle {
            receiver: Box::pin(receiver),
        })
    }

    /// Stops scanning and resolves the pending scan, if any. Safe to call at any time.
    pub fn stop(&self) {
        let stopped = {
            let mut inner = self.inner.lock_blocking();
            if inner.active.is_some() {
                inner.state = ScanState::Stopped;
            }
            inner.active.take()
        };
        self.adapter.stop_scan();
        if let Some(scan) = stopped {
            info!("scan #{} stopped", scan.id);
        }
    }

    /// Platform callback for one received advertisement.
    pub fn on_advertisement(&self, device: DeviceId, rssi: i16, adv_data: &[u8]) {
        let mut inner = self.inner.lock_blocking();
        let Some(scan) = inner.active.as_mut() else {
            trace!("advertisement from {device} dropped: no scan in progress");
            return;
        };
        if !scan.filter.report_duplicates && scan.seen.contains(&device) {
            return;
        }
        let peripheral = DiscoveredPeripheral {
            device,
            rssi,
            adv_data: adv_data.to_vec(),
        };
        if !scan.filter.matches(&peripheral) {
            return;
        }
        if !scan.filter.report_duplicates {
            scan.seen.insert(peripheral.device.clone());
        }
        debug!(
            "scan #{} found {} ({} dBm)",
            scan.id, peripheral.device, peripheral.rssi
        );
        let _ = scan.sender.try_send(peripheral);
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        if self.inner.get_mut().active.take().is_some() {
            self.adapter.stop_scan();
        }
    }
}

impl Stream for ScanHandle {
    type Item = DiscoveredPeripheral;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<DiscoveredPeripheral>> {
        self.receiver.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.receiver.size_hint()
    }
}

impl std::fmt::Debug for ScanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanHandle")
            .field("pending", &self.receiver.len())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl ScanHandle {
    /// Whether the scan has been stopped or superseded. Already reported peripherals may
    /// still be waiting in the stream.
    pub fn is_finished(&self) -> bool {
        self.receiver.is_closed()
    }
}
