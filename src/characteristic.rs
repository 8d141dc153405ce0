use uuid::Uuid;

use super::descriptor::Descriptor;
use super::CharacteristicProperties;

/// A Bluetooth GATT characteristic.
///
/// Two characteristics are equal when they have the same service and characteristic
/// identifiers; properties and descriptors are discovery metadata.
#[derive(Debug, Clone)]
pub struct Characteristic {
    service_id: Uuid,
    char_id: Uuid,
    properties: CharacteristicProperties,
    descs: Vec<Descriptor>,
}

impl PartialEq for Characteristic {
    fn eq(&self, other: &Self) -> bool {
        self.service_id == other.service_id && self.char_id == other.char_id
    }
}

impl Eq for Characteristic {}

impl std::hash::Hash for Characteristic {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.service_id.hash(state);
        self.char_id.hash(state);
    }
}

impl Characteristic {
    /// Describes a characteristic reported by the platform during service discovery.
    pub fn new(
        service_id: Uuid,
        char_id: Uuid,
        properties: CharacteristicProperties,
        descriptor_ids: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        Self {
            service_id,
            char_id,
            properties,
            descs: descriptor_ids
                .into_iter()
                .map(|id| Descriptor::new(service_id, char_id, id))
                .collect(),
        }
    }

    /// The [Uuid] identifying the type of this GATT characteristic.
    pub fn uuid(&self) -> Uuid {
        self.char_id
    }

    /// The [Uuid] of the service owning this characteristic.
    pub fn service_uuid(&self) -> Uuid {
        self.service_id
    }

    /// The properties of this this GATT characteristic.
    ///
    /// Characteristic properties indicate which operations (e.g. read, write, notify, etc)
    /// may be performed on this characteristic.
    pub fn properties(&self) -> CharacteristicProperties {
        self.properties
    }

    /// Get previously discovered descriptors.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descs
    }

    /// Returns the descriptor with the given [Uuid].
    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descs.iter().find(|desc| desc.uuid() == uuid)
    }
}
