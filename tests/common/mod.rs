#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ble_uart::btuuid::{descriptors, nordic_uart};
use ble_uart::{
    AdapterBackend, Characteristic, CharacteristicProperties, Connection, Descriptor, GattEvent,
    GattLink, GattStatus, Service, Uuid,
};

/// A command the crate sent to the fake link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Disconnect,
    DiscoverServices,
    ReadCharacteristic(Uuid),
    WriteCharacteristic(Uuid, Vec<u8>),
    ReadDescriptor(Uuid),
    WriteDescriptor(Uuid, Vec<u8>),
    SetNotification(Uuid, bool),
}

/// In-memory GATT link. With `auto_respond` set it answers every accepted command
/// synchronously with a successful event, as a fast platform would.
pub struct FakeLink {
    calls: Mutex<Vec<Call>>,
    accept: AtomicBool,
    auto_respond: AtomicBool,
    services: Mutex<Vec<Service>>,
    conn: Mutex<Option<Connection>>,
}

impl FakeLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
            auto_respond: AtomicBool::new(false),
            services: Mutex::new(vec![nus_service()]),
            conn: Mutex::new(None),
        })
    }

    /// Creates a connection over this link and remembers it for automatic responses.
    pub fn connection(self: &Arc<Self>) -> Connection {
        let conn = Connection::new("C8:2B:96:00:00:01".into(), self.clone());
        self.attach(&conn);
        conn
    }

    pub fn attach(&self, conn: &Connection) {
        *self.conn.lock().unwrap() = Some(conn.clone());
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn set_auto_respond(&self, auto_respond: bool) {
        self.auto_respond.store(auto_respond, Ordering::SeqCst);
    }

    pub fn set_services(&self, services: Vec<Service>) {
        *self.services.lock().unwrap() = services;
    }

    pub fn services(&self) -> Vec<Service> {
        self.services.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: Call) -> bool {
        self.calls.lock().unwrap().push(call);
        self.accept.load(Ordering::SeqCst)
    }

    fn respond(&self, event: GattEvent) {
        if !self.auto_respond.load(Ordering::SeqCst) {
            return;
        }
        let conn = self.conn.lock().unwrap().clone();
        if let Some(conn) = conn {
            conn.handle_event(event);
        }
    }
}

impl GattLink for FakeLink {
    fn connect(&self) -> bool {
        let accepted = self.record(Call::Connect);
        if accepted {
            self.respond(GattEvent::ConnectionStateChanged {
                status: GattStatus::SUCCESS,
                connected: true,
            });
        }
        accepted
    }

    fn disconnect(&self) {
        self.record(Call::Disconnect);
        self.respond(GattEvent::ConnectionStateChanged {
            status: GattStatus::SUCCESS,
            connected: false,
        });
    }

    fn discover_services(&self) -> bool {
        let accepted = self.record(Call::DiscoverServices);
        if accepted {
            self.respond(GattEvent::ServicesDiscovered {
                status: GattStatus::SUCCESS,
                services: self.services(),
            });
        }
        accepted
    }

    fn read_characteristic(&self, characteristic: &Characteristic) -> bool {
        let accepted = self.record(Call::ReadCharacteristic(characteristic.uuid()));
        if accepted {
            self.respond(GattEvent::CharacteristicRead {
                characteristic: characteristic.clone(),
                status: GattStatus::SUCCESS,
                value: Vec::new(),
            });
        }
        accepted
    }

    fn write_characteristic(&self, characteristic: &Characteristic, value: &[u8]) -> bool {
        let accepted = self.record(Call::WriteCharacteristic(
            characteristic.uuid(),
            value.to_vec(),
        ));
        if accepted {
            self.respond(GattEvent::CharacteristicWrite {
                characteristic: characteristic.clone(),
                status: GattStatus::SUCCESS,
            });
        }
        accepted
    }

    fn read_descriptor(&self, descriptor: &Descriptor) -> bool {
        let accepted = self.record(Call::ReadDescriptor(descriptor.uuid()));
        if accepted {
            self.respond(GattEvent::DescriptorRead {
                descriptor: descriptor.clone(),
                status: GattStatus::SUCCESS,
                value: Vec::new(),
            });
        }
        accepted
    }

    fn write_descriptor(&self, descriptor: &Descriptor, value: &[u8]) -> bool {
        let accepted = self.record(Call::WriteDescriptor(descriptor.uuid(), value.to_vec()));
        if accepted {
            self.respond(GattEvent::DescriptorWrite {
                descriptor: descriptor.clone(),
                status: GattStatus::SUCCESS,
            });
        }
        accepted
    }

    fn set_characteristic_notification(&self, characteristic: &Characteristic, enable: bool) -> bool {
        self.record(Call::SetNotification(characteristic.uuid(), enable))
    }
}

/// In-memory adapter recording scan commands.
pub struct FakeAdapter {
    accept: AtomicBool,
    starts: Mutex<Vec<Option<Vec<Uuid>>>>,
    stops: AtomicUsize,
}

impl FakeAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accept: AtomicBool::new(true),
            starts: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn starts(&self) -> Vec<Option<Vec<Uuid>>> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AdapterBackend for FakeAdapter {
    fn start_scan(&self, services: Option<&[Uuid]>) -> bool {
        self.starts.lock().unwrap().push(services.map(<[Uuid]>::to_vec));
        self.accept.load(Ordering::SeqCst)
    }

    fn stop_scan(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn tx() -> Characteristic {
    Characteristic::new(
        nordic_uart::SERVICE,
        nordic_uart::TX,
        CharacteristicProperties::from_bits(0x0c),
        [],
    )
}

pub fn rx() -> Characteristic {
    Characteristic::new(
        nordic_uart::SERVICE,
        nordic_uart::RX,
        CharacteristicProperties::from_bits(0x10),
        [descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION],
    )
}

pub fn cccd() -> Descriptor {
    Descriptor::new(
        nordic_uart::SERVICE,
        nordic_uart::RX,
        descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION,
    )
}

pub fn nus_service() -> Service {
    Service::new(nordic_uart::SERVICE, [tx(), rx()])
}

/// Advertising data carrying one complete list of 128-bit service identifiers.
pub fn adv_with_uuid128(uuid: Uuid) -> Vec<u8> {
    let mut data = vec![0x02, 0x01, 0x06, 0x11, 0x07];
    data.extend_from_slice(&uuid.as_u128().to_le_bytes());
    data
}

/// Advertising data carrying one complete list of 16-bit service identifiers.
pub fn adv_with_uuid16(uuid: u16) -> Vec<u8> {
    let mut data = vec![0x03, 0x03];
    data.extend_from_slice(&uuid.to_le_bytes());
    data
}
