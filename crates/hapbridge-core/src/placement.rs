// ── Placement policy ──
//
// Pure decisions: whether an accessory is published behind the bridge or as
// its own endpoint, and which category an external endpoint advertises.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::CoreError;
use crate::model::{Accessory, AccessoryId, Category, Service, ServiceKind};

/// Where an admitted accessory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Placement {
    Bridged,
    External,
}

/// Bridge state the placement rules look at.
#[derive(Debug, Default)]
pub struct PlacementContext<'a> {
    /// Accessories published externally by a previous run of this bridge.
    pub persisted_external: Option<&'a BTreeSet<AccessoryId>>,
    /// Group tags of every externally placed accessory, live or cached.
    pub external_groups: BTreeSet<&'a str>,
}

/// Classify `accessory`. Bridges can never be admitted.
pub fn classify(accessory: &Accessory, ctx: &PlacementContext<'_>) -> Result<Placement, CoreError> {
    if accessory.is_bridge {
        return Err(CoreError::InvalidTopology {
            uuid: accessory.uuid.to_string(),
            reason: "a bridge cannot be added to another bridge".into(),
        });
    }

    if accessory.external
        || ctx
            .persisted_external
            .is_some_and(|set| set.contains(&accessory.uuid))
    {
        return Ok(Placement::External);
    }

    if accessory
        .groups
        .iter()
        .any(|group| ctx.external_groups.contains(group.as_str()))
    {
        return Ok(Placement::External);
    }

    Ok(Placement::Bridged)
}

// ── Category inference ──────────────────────────────────────────────

/// Capability → category table, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CategoryRule {
    Fan,
    GarageDoorOpener,
    Lightbulb,
    Lock,
    Outlet,
    Switch,
    Thermostat,
    Sensor,
    SecuritySystem,
    Door,
    Window,
    WindowCovering,
    ProgrammableSwitch,
    AirPurifier,
    Television,
    Speaker,
    Irrigation,
    Faucet,
    ShowerHead,
}

const CATEGORY_RULES: [CategoryRule; 19] = [
    CategoryRule::Fan,
    CategoryRule::GarageDoorOpener,
    CategoryRule::Lightbulb,
    CategoryRule::Lock,
    CategoryRule::Outlet,
    CategoryRule::Switch,
    CategoryRule::Thermostat,
    CategoryRule::Sensor,
    CategoryRule::SecuritySystem,
    CategoryRule::Door,
    CategoryRule::Window,
    CategoryRule::WindowCovering,
    CategoryRule::ProgrammableSwitch,
    CategoryRule::AirPurifier,
    CategoryRule::Television,
    CategoryRule::Speaker,
    CategoryRule::Irrigation,
    CategoryRule::Faucet,
    CategoryRule::ShowerHead,
];

/// `ValveType` values.
const VALVE_IRRIGATION: u64 = 1;
const VALVE_SHOWER_HEAD: u64 = 2;
const VALVE_FAUCET: u64 = 3;

impl CategoryRule {
    fn matches(self, service: &Service) -> bool {
        let kind = &service.kind;
        match self {
            Self::Fan => matches!(kind, ServiceKind::Fan | ServiceKind::Fanv2),
            Self::GarageDoorOpener => *kind == ServiceKind::GarageDoorOpener,
            Self::Lightbulb => *kind == ServiceKind::Lightbulb,
            Self::Lock => *kind == ServiceKind::LockMechanism,
            Self::Outlet => *kind == ServiceKind::Outlet,
            Self::Switch => *kind == ServiceKind::Switch,
            Self::Thermostat => *kind == ServiceKind::Thermostat,
            Self::Sensor => kind.is_sensor(),
            Self::SecuritySystem => *kind == ServiceKind::SecuritySystem,
            Self::Door => *kind == ServiceKind::Door,
            Self::Window => *kind == ServiceKind::Window,
            Self::WindowCovering => *kind == ServiceKind::WindowCovering,
            Self::ProgrammableSwitch => *kind == ServiceKind::StatelessProgrammableSwitch,
            Self::AirPurifier => *kind == ServiceKind::AirPurifier,
            Self::Television => *kind == ServiceKind::Television,
            Self::Speaker => matches!(kind, ServiceKind::Speaker | ServiceKind::SmartSpeaker),
            Self::Irrigation => is_valve(service, VALVE_IRRIGATION),
            Self::Faucet => is_valve(service, VALVE_FAUCET),
            Self::ShowerHead => is_valve(service, VALVE_SHOWER_HEAD),
        }
    }

    fn category(self) -> Category {
        match self {
            Self::Fan => Category::Fan,
            Self::GarageDoorOpener => Category::GarageDoorOpener,
            Self::Lightbulb => Category::Lightbulb,
            Self::Lock => Category::DoorLock,
            Self::Outlet => Category::Outlet,
            Self::Switch => Category::Switch,
            Self::Thermostat => Category::Thermostat,
            Self::Sensor => Category::Sensor,
            Self::SecuritySystem => Category::SecuritySystem,
            Self::Door => Category::Door,
            Self::Window => Category::Window,
            Self::WindowCovering => Category::WindowCovering,
            Self::ProgrammableSwitch => Category::ProgrammableSwitch,
            Self::AirPurifier => Category::AirPurifier,
            Self::Television => Category::Television,
            Self::Speaker => Category::Speaker,
            Self::Irrigation => Category::Sprinkler,
            Self::Faucet => Category::Faucet,
            Self::ShowerHead => Category::ShowerHead,
        }
    }
}

fn is_valve(service: &Service, valve_type: u64) -> bool {
    service.kind == ServiceKind::Valve && service.valve_type() == Some(valve_type)
}

/// Category from the capability set. The first rule matched by any
/// service wins; `Other` when nothing matches.
pub fn infer_category(accessory: &Accessory) -> Category {
    CATEGORY_RULES
        .iter()
        .find(|rule| accessory.services.iter().any(|s| rule.matches(s)))
        .map_or(Category::Other, |rule| rule.category())
}

/// Category an external endpoint advertises: explicit if set, else inferred.
pub fn external_category(accessory: &Accessory) -> Category {
    accessory.category.unwrap_or_else(|| infer_category(accessory))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::VALVE_TYPE;

    fn with(kinds: &[ServiceKind]) -> Accessory {
        kinds
            .iter()
            .fold(Accessory::new("a", "A"), |acc, k| acc.with_service(Service::new(k.clone())))
    }

    #[test]
    fn bridges_are_rejected() {
        let mut accessory = Accessory::new("b", "Nested");
        accessory.is_bridge = true;
        let err = classify(&accessory, &PlacementContext::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTopology { .. }));
    }

    #[test]
    fn explicit_flag_wins() {
        let accessory = Accessory::new("tv", "TV").prefer_external();
        assert_eq!(
            classify(&accessory, &PlacementContext::default()).unwrap(),
            Placement::External
        );
    }

    #[test]
    fn persisted_placement_counts_as_flag() {
        let persisted: BTreeSet<AccessoryId> = [AccessoryId::from("tv")].into();
        let ctx = PlacementContext {
            persisted_external: Some(&persisted),
            ..PlacementContext::default()
        };
        assert_eq!(
            classify(&Accessory::new("tv", "TV"), &ctx).unwrap(),
            Placement::External
        );
    }

    #[test]
    fn shared_group_with_external_peer_goes_external() {
        let ctx = PlacementContext {
            persisted_external: None,
            external_groups: ["living-room"].into(),
        };
        let remote = Accessory::new("remote", "Remote").with_group("living-room");
        let lamp = Accessory::new("lamp", "Lamp").with_group("kitchen");
        assert_eq!(classify(&remote, &ctx).unwrap(), Placement::External);
        assert_eq!(classify(&lamp, &ctx).unwrap(), Placement::Bridged);
    }

    #[test]
    fn default_is_bridged() {
        assert_eq!(
            classify(&Accessory::new("x", "X"), &PlacementContext::default()).unwrap(),
            Placement::Bridged
        );
    }

    #[test]
    fn rule_order_is_priority() {
        // Lightbulb outranks sensors regardless of declaration order
        let accessory = with(&[ServiceKind::MotionSensor, ServiceKind::Lightbulb]);
        assert_eq!(infer_category(&accessory), Category::Lightbulb);
        // Fan outranks television
        let accessory = with(&[ServiceKind::Television, ServiceKind::Fanv2]);
        assert_eq!(infer_category(&accessory), Category::Fan);
    }

    #[test]
    fn sensor_union() {
        assert_eq!(infer_category(&with(&[ServiceKind::LeakSensor])), Category::Sensor);
        assert_eq!(infer_category(&with(&[ServiceKind::TemperatureSensor])), Category::Sensor);
    }

    #[test]
    fn valves_disambiguate_by_type() {
        let valve = |t: u64| {
            Accessory::new("v", "Valve")
                .with_service(Service::new(ServiceKind::Valve).with_characteristic(VALVE_TYPE, t))
        };
        assert_eq!(infer_category(&valve(1)), Category::Sprinkler);
        assert_eq!(infer_category(&valve(2)), Category::ShowerHead);
        assert_eq!(infer_category(&valve(3)), Category::Faucet);
        assert_eq!(infer_category(&valve(0)), Category::Other);
    }

    #[test]
    fn fallback_is_other() {
        assert_eq!(infer_category(&with(&[ServiceKind::Doorbell])), Category::Other);
        assert_eq!(infer_category(&Accessory::new("x", "X")), Category::Other);
    }

    #[test]
    fn explicit_category_is_kept() {
        let accessory = with(&[ServiceKind::Lightbulb]).with_category(Category::Television);
        assert_eq!(external_category(&accessory), Category::Television);
    }
}
