//! Enumeration types shared by the engine and its consumers.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Weather-stress signal kinds
// ---------------------------------------------------------------------------

/// The kind of weather stress a rule watches for.
///
/// Each kind maps to one breach predicate and one forecast-trust limit.
/// Serialized with the rule-table names (`TMAX_STRESS`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum WeatherSignalKind {
    /// Heat stress: maximum temperature at or above threshold.
    #[serde(rename = "TMAX_STRESS")]
    TmaxStress,
    /// Cold stress: minimum temperature at or below threshold.
    #[serde(rename = "TMIN_STRESS")]
    TminStress,
    /// Excess rain: daily rainfall at or above threshold.
    #[serde(rename = "RAIN_STRESS")]
    RainStress,
    /// High humidity: mean relative humidity at or above threshold.
    #[serde(rename = "RHMAX_STRESS")]
    RhmaxStress,
    /// Fog: humid, calm and cold within the fog season.
    #[serde(rename = "FOG_STRESS")]
    FogStress,
}

impl WeatherSignalKind {
    /// All kinds, in rule-table order.
    pub const ALL: [Self; 5] = [
        Self::TmaxStress,
        Self::TminStress,
        Self::RainStress,
        Self::RhmaxStress,
        Self::FogStress,
    ];

    /// The canonical rule-table name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TmaxStress => "TMAX_STRESS",
            Self::TminStress => "TMIN_STRESS",
            Self::RainStress => "RAIN_STRESS",
            Self::RhmaxStress => "RHMAX_STRESS",
            Self::FogStress => "FOG_STRESS",
        }
    }

    /// Resolve a rule-table signal name.
    ///
    /// Accepts the canonical names plus the legacy `FOG` spelling used by
    /// older rule rows. Matching is exact; returns `None` for anything else.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "TMAX_STRESS" => Some(Self::TmaxStress),
            "TMIN_STRESS" => Some(Self::TminStress),
            "RAIN_STRESS" => Some(Self::RainStress),
            "RHMAX_STRESS" => Some(Self::RhmaxStress),
            "FOG_STRESS" | "FOG" => Some(Self::FogStress),
            _ => None,
        }
    }
}

impl core::fmt::Display for WeatherSignalKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Run termination
// ---------------------------------------------------------------------------

/// Why a simulation run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EndReason {
    /// The final growth stage was reached.
    CropMatured,
    /// The weather feed ran out before the crop matured.
    WeatherExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_for_every_kind() {
        for kind in WeatherSignalKind::ALL {
            assert_eq!(WeatherSignalKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn legacy_fog_alias_is_accepted() {
        assert_eq!(
            WeatherSignalKind::from_name("FOG"),
            Some(WeatherSignalKind::FogStress)
        );
    }

    #[test]
    fn unknown_and_lowercase_names_are_rejected() {
        assert_eq!(WeatherSignalKind::from_name("HAIL_STRESS"), None);
        assert_eq!(WeatherSignalKind::from_name("tmax_stress"), None);
    }

    #[test]
    fn end_reason_serializes_snake_case() {
        let json = serde_json::to_string(&EndReason::CropMatured).ok();
        assert_eq!(json.as_deref(), Some("\"crop_matured\""));
    }
}
