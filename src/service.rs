use super::characteristic::Characteristic;

use crate::Uuid;

/// A Bluetooth GATT service, as found by service discovery.
#[derive(Debug, Clone)]
pub struct Service {
    service_id: Uuid,
    chars: Vec<Characteristic>,
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.service_id == other.service_id
    }
}

impl Eq for Service {}

impl std::hash::Hash for Service {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.service_id.hash(state);
    }
}

impl Service {
    /// Describes a service reported by the platform during service discovery.
    ///
    /// Characteristics belonging to a different service are dropped.
    pub fn new(service_id: Uuid, chars: impl IntoIterator<Item = Characteristic>) -> Self {
        Self {
            service_id,
            chars: chars
                .into_iter()
                .filter(|ch| ch.service_uuid() == service_id)
                .collect(),
        }
    }

    /// The [Uuid] identifying the type of this GATT service.
    pub fn uuid(&self) -> Uuid {
        self.service_id
    }

    /// Get previously discovered characteristics.
    pub fn characteristics(&self) -> &[Characteristic] {
        &self.chars
    }

    /// Returns the characteristic with the given [Uuid].
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.chars.iter().find(|ch| ch.uuid() == uuid)
    }
}
