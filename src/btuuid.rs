//! Bluetooth UUID extensions and well-known identifiers.

use uuid::Uuid;

/// The Bluetooth Base UUID, `00000000-0000-1000-8000-00805f9b34fb`.
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

const BASE_MASK_16: u128 = 0xffff0000_ffff_ffff_ffff_ffffffffffff;
const BASE_MASK_32: u128 = 0x00000000_ffff_ffff_ffff_ffffffffffff;

/// Expands a 16-bit short-form identifier into its 128-bit form.
pub const fn bluetooth_uuid_from_u16(uuid: u16) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Expands a 32-bit short-form identifier into its 128-bit form.
pub const fn bluetooth_uuid_from_u32(uuid: u32) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Extension trait for [`Uuid`] with helper methods for short-form Bluetooth identifiers.
pub trait BluetoothUuidExt: private::Sealed {
    /// Creates a UUID from a 16-bit short-form identifier.
    fn from_u16(uuid: u16) -> Self;

    /// Creates a UUID from a 32-bit short-form identifier.
    fn from_u32(uuid: u32) -> Self;

    /// Whether this UUID is a 16-bit identifier expanded over the Bluetooth Base UUID.
    fn is_u16_uuid(&self) -> bool;

    /// Whether this UUID is a 32-bit identifier expanded over the Bluetooth Base UUID.
    fn is_u32_uuid(&self) -> bool;

    /// Returns the 16-bit short form, if this UUID has one.
    fn try_to_u16(&self) -> Option<u16>;

    /// Returns the 32-bit short form, if this UUID has one.
    fn try_to_u32(&self) -> Option<u32>;
}

impl BluetoothUuidExt for Uuid {
    fn from_u16(uuid: u16) -> Self {
        bluetooth_uuid_from_u16(uuid)
    }

    fn from_u32(uuid: u32) -> Self {
        bluetooth_uuid_from_u32(uuid)
    }

    fn is_u16_uuid(&self) -> bool {
        self.as_u128() & BASE_MASK_16 == BLUETOOTH_BASE_UUID
    }

    fn is_u32_uuid(&self) -> bool {
        self.as_u128() & BASE_MASK_32 == BLUETOOTH_BASE_UUID
    }

    fn try_to_u16(&self) -> Option<u16> {
        self.is_u16_uuid().then(|| (self.as_u128() >> 96) as u16)
    }

    fn try_to_u32(&self) -> Option<u32> {
        self.is_u32_uuid().then(|| (self.as_u128() >> 96) as u32)
    }
}

mod private {
    pub trait Sealed {}

    impl Sealed for uuid::Uuid {}
}

/// Well-known descriptor identifiers.
pub mod descriptors {
    use super::bluetooth_uuid_from_u16;
    use uuid::Uuid;

    /// Client Characteristic Configuration, written to switch notifications/indications on.
    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = bluetooth_uuid_from_u16(0x2902);
}

/// Identifiers of the Nordic UART Service.
pub mod nordic_uart {
    use uuid::Uuid;

    /// The UART service.
    pub const SERVICE: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);
    /// TX characteristic, written by the client.
    pub const TX: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);
    /// RX characteristic, notified by the peripheral.
    pub const RX: Uuid = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);
}
