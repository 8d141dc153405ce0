//! Asynchronous BLE client core for talking to Nordic UART peripherals.
//!
//! The crate turns a platform's callback-driven Bluetooth API into awaitable operations:
//! a [`Scanner`] yielding discovered peripherals, a [`Connection`] state machine issuing
//! GATT requests one at a time, and a [`UartSession`] exchanging text over the Nordic UART
//! service.
//!
//! The platform binding is not part of this crate. It implements [`AdapterBackend`] and
//! [`GattLink`], and forwards the platform callbacks to [`Scanner::on_advertisement`] and
//! [`Connection::handle_event`]. No executor is required; every future can be driven by
//! any runtime.

pub use advertisement::parse_service_uuids;
pub use btuuid::BluetoothUuidExt;
pub use characteristic::Characteristic;
pub use connection::{Connection, ConnectionConfig, ConnectionObserver, Notifications};
pub use descriptor::Descriptor;
pub use error::{Error, ErrorKind, GattStatus};
pub use platform::{AdapterBackend, GattEvent, GattLink};
pub use scan::{ScanFilter, ScanHandle, ScanState, Scanner};
pub use service::Service;
pub use uart::{UartCallback, UartSession};

/// Convenience alias for a result with [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use uuid::Uuid;
pub mod advertisement;
pub mod btuuid;
pub mod error;
mod types;
pub use types::*;

mod async_util;
mod characteristic;
mod connection;
mod descriptor;
mod gatt_queue;
mod gatt_tree;
mod platform;
mod scan;
mod service;
mod uart;
mod util;
