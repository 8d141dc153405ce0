//! The narrow boundary between this crate and the operating system's Bluetooth stack.
//!
//! A platform binding implements [`AdapterBackend`] and [`GattLink`] as thin command
//! forwarders, and pushes every callback it receives into the crate: advertisements go
//! to [`crate::Scanner::on_advertisement`], GATT callbacks go to
//! [`crate::Connection::handle_event`] as [`GattEvent`] values. Both entry points may be
//! called from any thread, including from inside one of the command methods below.

use uuid::Uuid;

use crate::{Characteristic, Descriptor, GattStatus, Service};

/// Scanning commands of a Bluetooth adapter.
pub trait AdapterBackend: Send + Sync {
    /// Starts delivering advertisements. `services` is a hint for platforms with a working
    /// native filter; results are filtered again by the crate. Returns `false` if scanning
    /// could not begin (e.g. the adapter is off).
    fn start_scan(&self, services: Option<&[Uuid]>) -> bool;

    /// Stops delivering advertisements. Must be harmless when not scanning.
    fn stop_scan(&self);
}

/// Commands of one peripheral's GATT link.
///
/// Every method returning `bool` reports whether the platform accepted the request; the
/// outcome of an accepted request arrives later as a [`GattEvent`], except for
/// [`GattLink::set_characteristic_notification`] which completes on return.
pub trait GattLink: Send + Sync {
    fn connect(&self) -> bool;
    fn disconnect(&self);
    fn discover_services(&self) -> bool;
    fn read_characteristic(&self, characteristic: &Characteristic) -> bool;
    fn write_characteristic(&self, characteristic: &Characteristic, value: &[u8]) -> bool;
    fn read_descriptor(&self, descriptor: &Descriptor) -> bool;
    fn write_descriptor(&self, descriptor: &Descriptor, value: &[u8]) -> bool;
    fn set_characteristic_notification(&self, characteristic: &Characteristic, enable: bool)
        -> bool;
}

/// One firing of the platform's multiplexed GATT callback.
#[derive(Debug, Clone)]
pub enum GattEvent {
    /// The link went up (`connected`) or down.
    ConnectionStateChanged { status: GattStatus, connected: bool },
    ServicesDiscovered {
        status: GattStatus,
        services: Vec<Service>,
    },
    CharacteristicRead {
        characteristic: Characteristic,
        status: GattStatus,
        value: Vec<u8>,
    },
    CharacteristicWrite {
        characteristic: Characteristic,
        status: GattStatus,
    },
    DescriptorRead {
        descriptor: Descriptor,
        status: GattStatus,
        value: Vec<u8>,
    },
    DescriptorWrite {
        descriptor: Descriptor,
        status: GattStatus,
    },
    /// Unsolicited value change of a characteristic with notifications enabled.
    CharacteristicChanged {
        characteristic: Characteristic,
        value: Vec<u8>,
    },
}
