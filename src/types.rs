use uuid::Uuid;

use crate::advertisement::parse_service_uuids;

/// Platform identifier of a peripheral, usually its Bluetooth address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates an identifier from the platform's textual device handle.
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    /// The textual form of the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        DeviceId(id.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        DeviceId(id)
    }
}

/// A peripheral reported by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveredPeripheral {
    /// The peripheral that sent the advertisement.
    pub device: DeviceId,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Raw advertising data as delivered by the platform.
    pub adv_data: Vec<u8>,
}

impl DiscoveredPeripheral {
    /// Service identifiers found in the advertising data, in encounter order.
    pub fn service_uuids(&self) -> Vec<Uuid> {
        parse_service_uuids(&self.adv_data)
    }

    /// Whether the advertising data lists `service`.
    pub fn advertises(&self, service: Uuid) -> bool {
        self.service_uuids().contains(&service)
    }
}

/// State of a [`crate::Connection`].
///
/// The ordering follows the connection lifecycle up to [`ConnectionState::Ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    DiscoveringServices,
    Ready,
    Disconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::DiscoveringServices => "discovering services",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnecting => "disconnecting",
        })
    }
}

/// GATT characteristic properties as defined in the Bluetooth Core Specification, Vol 3, Part G, §3.3.1.1.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicProperties {
    pub broadcast: bool,
    pub read: bool,
    pub write_without_response: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
    pub authenticated_signed_writes: bool,
    pub extended_properties: bool,
}

impl CharacteristicProperties {
    /// Decodes the platform's property bitmask.
    pub fn from_bits(bits: u32) -> Self {
        CharacteristicProperties {
            broadcast: (bits & (1 << 0)) != 0,
            read: (bits & (1 << 1)) != 0,
            write_without_response: (bits & (1 << 2)) != 0,
            write: (bits & (1 << 3)) != 0,
            notify: (bits & (1 << 4)) != 0,
            indicate: (bits & (1 << 5)) != 0,
            authenticated_signed_writes: (bits & (1 << 6)) != 0,
            extended_properties: (bits & (1 << 7)) != 0,
        }
    }

    /// Encodes the properties back into a bitmask.
    pub fn to_bits(self) -> u32 {
        [
            self.broadcast,
            self.read,
            self.write_without_response,
            self.write,
            self.notify,
            self.indicate,
            self.authenticated_signed_writes,
            self.extended_properties,
        ]
        .into_iter()
        .enumerate()
        .fold(0, |bits, (i, set)| bits | (u32::from(set) << i))
    }

    /// Whether the peripheral can push value changes (notify or indicate).
    pub fn can_notify(self) -> bool {
        self.notify || self.indicate
    }
}
