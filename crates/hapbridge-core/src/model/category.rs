// ── Protocol categories and service kinds ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Category advertised by a published endpoint.
///
/// Clients use the category to pick an icon and, for some ecosystems, to
/// decide whether the endpoint is discoverable at all.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum Category {
    Other,
    Bridge,
    Fan,
    GarageDoorOpener,
    Lightbulb,
    DoorLock,
    Outlet,
    Switch,
    Thermostat,
    Sensor,
    SecuritySystem,
    Door,
    Window,
    WindowCovering,
    ProgrammableSwitch,
    IpCamera,
    VideoDoorbell,
    AirPurifier,
    Speaker,
    Sprinkler,
    Faucet,
    ShowerHead,
    Television,
}

impl Category {
    /// Numeric category code carried in advertisements and setup payloads.
    pub const fn code(self) -> u8 {
        match self {
            Self::Other => 1,
            Self::Bridge => 2,
            Self::Fan => 3,
            Self::GarageDoorOpener => 4,
            Self::Lightbulb => 5,
            Self::DoorLock => 6,
            Self::Outlet => 7,
            Self::Switch => 8,
            Self::Thermostat => 9,
            Self::Sensor => 10,
            Self::SecuritySystem => 11,
            Self::Door => 12,
            Self::Window => 13,
            Self::WindowCovering => 14,
            Self::ProgrammableSwitch => 15,
            Self::IpCamera => 17,
            Self::VideoDoorbell => 18,
            Self::AirPurifier => 19,
            Self::Speaker => 26,
            Self::Sprinkler => 28,
            Self::Faucet => 29,
            Self::ShowerHead => 30,
            Self::Television => 31,
        }
    }
}

macro_rules! service_kinds {
    ($(#[$meta:meta])* $($variant:ident),+ $(,)?) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum ServiceKind {
            $($variant,)+
            /// Any service type without special meaning to the bridge.
            Other(String),
        }

        impl ServiceKind {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                    Self::Other(name) => name,
                }
            }
        }

        impl From<String> for ServiceKind {
            fn from(raw: String) -> Self {
                match raw.as_str() {
                    $(stringify!($variant) => Self::$variant,)+
                    _ => Self::Other(raw),
                }
            }
        }
    };
}

service_kinds! {
    /// Service type exposed by an accessory. The ordered list of an
    /// accessory's service kinds is its capability set.
    AccessoryInformation,
    ProtocolInformation,
    Fan,
    Fanv2,
    GarageDoorOpener,
    Lightbulb,
    LockMechanism,
    Outlet,
    Switch,
    Thermostat,
    AirQualitySensor,
    CarbonDioxideSensor,
    CarbonMonoxideSensor,
    ContactSensor,
    HumiditySensor,
    LeakSensor,
    LightSensor,
    MotionSensor,
    OccupancySensor,
    SmokeSensor,
    TemperatureSensor,
    SecuritySystem,
    Door,
    Window,
    WindowCovering,
    StatelessProgrammableSwitch,
    AirPurifier,
    Television,
    Speaker,
    SmartSpeaker,
    Valve,
    CameraRtpStreamManagement,
    Doorbell,
}

impl ServiceKind {
    pub fn is_sensor(&self) -> bool {
        matches!(
            self,
            Self::AirQualitySensor
                | Self::CarbonDioxideSensor
                | Self::CarbonMonoxideSensor
                | Self::ContactSensor
                | Self::HumiditySensor
                | Self::LeakSensor
                | Self::LightSensor
                | Self::MotionSensor
                | Self::OccupancySensor
                | Self::SmokeSensor
                | Self::TemperatureSensor
        )
    }
}

impl From<&str> for ServiceKind {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_owned())
    }
}

impl From<ServiceKind> for String {
    fn from(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn category_codes_match_wire_numbers() {
        assert_eq!(Category::Bridge.code(), 2);
        assert_eq!(Category::Television.code(), 31);
        assert_eq!(Category::Sprinkler.code(), 28);
    }

    #[test]
    fn category_parses_snake_case() {
        let parsed: Category = "garage_door_opener".parse().unwrap();
        assert_eq!(parsed, Category::GarageDoorOpener);
        assert_eq!(Category::WindowCovering.to_string(), "window_covering");
    }

    #[test]
    fn service_kind_round_trips_known_names() {
        assert_eq!(ServiceKind::from("Lightbulb"), ServiceKind::Lightbulb);
        assert_eq!(ServiceKind::Lightbulb.as_str(), "Lightbulb");
    }

    #[test]
    fn service_kind_keeps_unknown_names() {
        let kind = ServiceKind::from("Humidifier");
        assert_eq!(kind, ServiceKind::Other("Humidifier".into()));
        assert_eq!(String::from(kind), "Humidifier");
    }

    #[test]
    fn service_kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&ServiceKind::MotionSensor).unwrap();
        assert_eq!(json, "\"MotionSensor\"");
    }
}
