// ── Accessory domain types ──
//
// Accessories are created and owned by the plugin layer. The bridge keeps
// its own copy of each registered accessory and only ever touches the
// `bridged` marker.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::category::{Category, ServiceKind};
use super::identifiers::AccessoryId;

/// Name of the characteristic that tells valve flavours apart.
pub const VALVE_TYPE: &str = "ValveType";

/// A single readable/writable attribute of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl Characteristic {
    pub fn new(kind: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// A service exposed by an accessory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub kind: ServiceKind,
    /// Distinguishes several services of the same kind on one accessory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default)]
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(kind: impl Into<ServiceKind>) -> Self {
        Self {
            kind: kind.into(),
            subtype: None,
            characteristics: Vec::new(),
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_characteristic(mut self, kind: impl Into<String>, value: impl Into<Value>) -> Self {
        self.characteristics.push(Characteristic::new(kind, value));
        self
    }

    pub fn characteristic(&self, kind: &str) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.kind == kind)
    }

    /// Value of the `ValveType` characteristic, if this service carries one.
    pub fn valve_type(&self) -> Option<u64> {
        self.characteristic(VALVE_TYPE)?.value.as_u64()
    }
}

/// A child device managed by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessory {
    pub uuid: AccessoryId,
    #[serde(alias = "name")]
    pub display_name: String,
    /// Explicit category; inferred from the services when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub services: Vec<Service>,
    /// Declared preference for a dedicated endpoint.
    #[serde(default)]
    pub external: bool,
    /// Co-location tags: accessories sharing a tag share placement.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub groups: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_bridge: bool,
    /// Set by the bridge when the accessory is admitted behind its endpoint.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bridged: bool,
}

impl Accessory {
    pub fn new(uuid: impl Into<AccessoryId>, display_name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            display_name: display_name.into(),
            category: None,
            services: Vec::new(),
            external: false,
            groups: BTreeSet::new(),
            is_bridge: false,
            bridged: false,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn prefer_external(mut self) -> Self {
        self.external = true;
        self
    }

    /// The capability set: service kinds in declaration order.
    pub fn capabilities(&self) -> impl Iterator<Item = &ServiceKind> {
        self.services.iter().map(|s| &s.kind)
    }

    pub fn service(&self, kind: &ServiceKind, subtype: Option<&str>) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| &s.kind == kind && s.subtype.as_deref() == subtype)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_declaration_order() {
        let accessory = Accessory::new("a1", "Porch")
            .with_service(Service::new(ServiceKind::MotionSensor))
            .with_service(Service::new(ServiceKind::Lightbulb));
        let kinds: Vec<_> = accessory.capabilities().cloned().collect();
        assert_eq!(kinds, vec![ServiceKind::MotionSensor, ServiceKind::Lightbulb]);
    }

    #[test]
    fn valve_type_reads_characteristic() {
        let valve = Service::new(ServiceKind::Valve).with_characteristic(VALVE_TYPE, 3);
        assert_eq!(valve.valve_type(), Some(3));
        assert_eq!(Service::new(ServiceKind::Valve).valve_type(), None);
    }

    #[test]
    fn service_lookup_honours_subtype() {
        let accessory = Accessory::new("a1", "Strip")
            .with_service(Service::new(ServiceKind::Outlet).with_subtype("left"))
            .with_service(Service::new(ServiceKind::Outlet).with_subtype("right"));
        assert!(accessory.service(&ServiceKind::Outlet, Some("right")).is_some());
        assert!(accessory.service(&ServiceKind::Outlet, None).is_none());
    }

    #[test]
    fn deserializes_with_defaults() {
        let accessory: Accessory =
            serde_json::from_str(r#"{"uuid":"u1","name":"Lamp","services":[{"kind":"Lightbulb"}]}"#)
                .unwrap();
        assert_eq!(accessory.display_name, "Lamp");
        assert!(!accessory.external);
        assert!(!accessory.bridged);
        assert_eq!(accessory.services[0].kind, ServiceKind::Lightbulb);
    }
}
