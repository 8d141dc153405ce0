use uuid::Uuid;

/// A Bluetooth GATT descriptor.
///
/// Identifies the descriptor within its characteristic and service; the value itself is
/// only available through [`crate::Connection::read_descriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    service_id: Uuid,
    char_id: Uuid,
    desc_id: Uuid,
}

impl Descriptor {
    /// Describes a descriptor reported by the platform during service discovery.
    pub fn new(service_id: Uuid, char_id: Uuid, desc_id: Uuid) -> Self {
        Self {
            service_id,
            char_id,
            desc_id,
        }
    }

    /// The [Uuid] identifying the type of this GATT descriptor.
    pub fn uuid(&self) -> Uuid {
        self.desc_id
    }

    /// The [Uuid] of the characteristic owning this descriptor.
    pub fn characteristic_uuid(&self) -> Uuid {
        self.char_id
    }

    /// The [Uuid] of the service owning this descriptor.
    pub fn service_uuid(&self) -> Uuid {
        self.service_id
    }
}
