use uuid::Uuid;

use crate::{Characteristic, Descriptor, Service};

/// Services discovered on one connection; emptied when the link goes down.
#[derive(Debug, Default)]
pub(crate) struct GattTree {
    services: Vec<Service>,
}

impl GattTree {
    pub fn replace(&mut self, services: Vec<Service>) {
        self.services = services;
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }

    pub fn services(&self) -> Vec<Service> {
        self.services.clone()
    }

    pub fn find_service(&self, service_id: Uuid) -> Option<&Service> {
        self.services.iter().find(|s| s.uuid() == service_id)
    }

    /// Looks up the discovered record matching `characteristic`.
    pub fn find_characteristic(&self, characteristic: &Characteristic) -> Option<&Characteristic> {
        self.find_service(characteristic.service_uuid())?
            .characteristic(characteristic.uuid())
    }

    pub fn find_descriptor(&self, descriptor: &Descriptor) -> Option<&Descriptor> {
        self.find_service(descriptor.service_uuid())?
            .characteristic(descriptor.characteristic_uuid())?
            .descriptor(descriptor.uuid())
    }
}
