//! Record types that flow into and out of the simulation core.
//!
//! [`WeatherDrivers`] is the daily input record. [`AlertMessage`],
//! [`PhenologyRecord`] and [`SimulationOutput`] are the output. Field names
//! on the output side follow the JSON document served to the dashboard
//! (`day`, `msg_id`, `msg`, `bbch`, `t_sum`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::EndReason;
use crate::ids::{MessageId, RunId, StageCode};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Daily weather driving variables in the core's internal units.
///
/// Unit conversion from the source format (hPa, mm, 10 m wind) is the
/// feed's job; the core assumes these units throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WeatherDrivers {
    /// The calendar day this record describes.
    pub day: NaiveDate,
    /// Daily mean temperature (°C).
    pub temp: f64,
    /// Daily minimum temperature (°C).
    pub tmin: f64,
    /// Daily maximum temperature (°C).
    pub tmax: f64,
    /// Actual vapour pressure (kPa).
    pub vap: f64,
    /// Mean wind speed at 2 m (m/s).
    pub wind: f64,
    /// Rainfall (cm/day).
    pub rain: f64,
    /// Site latitude (decimal degrees, north positive).
    pub lat: f64,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A single alert raised during a run.
///
/// `day` is the reported date: the onset of the streak for weather alerts,
/// the trigger day plus offset for management alerts. Lists of alerts are
/// kept in the order they were computed, not sorted by `day`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AlertMessage {
    /// Reported date.
    pub day: NaiveDate,
    /// Rule-table message identifier.
    #[serde(rename = "msg_id")]
    pub message_id: MessageId,
    /// Message text shown to the grower.
    #[serde(rename = "msg")]
    pub message: String,
}

/// A growth-stage transition recorded by the phenology tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PhenologyRecord {
    /// Day the stage was entered.
    pub day: NaiveDate,
    /// The stage entered.
    #[serde(rename = "bbch")]
    pub stage: StageCode,
    /// Development index on that day, rounded to one decimal.
    #[serde(rename = "t_sum")]
    pub development_index: f64,
}

/// Everything a finished run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationOutput {
    /// Identifier of the run that produced this output.
    pub run_id: RunId,
    /// Stage transitions, starting with the initial stage.
    pub phenology: Vec<PhenologyRecord>,
    /// Weather-stress alerts in computation order.
    #[serde(rename = "weatheralerts")]
    pub weather_alerts: Vec<AlertMessage>,
    /// Management alerts in computation order.
    #[serde(rename = "managementalerts")]
    pub management_alerts: Vec<AlertMessage>,
    /// Maturity date: the day the last stage was reached, or the last
    /// simulated day when the weather feed ran out first.
    pub maturity_date: Option<NaiveDate>,
    /// Why the run stopped.
    pub end_reason: EndReason,
    /// Number of day-steps executed.
    pub days_simulated: u32,
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn alert_message_uses_dashboard_field_names() {
        let alert = AlertMessage {
            day: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap_or_default(),
            message_id: MessageId(4),
            message: "Heat stress expected".to_owned(),
        };
        let value = serde_json::to_value(&alert).unwrap_or_default();
        assert_eq!(value["day"], "2024-03-02");
        assert_eq!(value["msg_id"], 4);
        assert_eq!(value["msg"], "Heat stress expected");
    }

    #[test]
    fn phenology_record_uses_bbch_and_t_sum() {
        let record = PhenologyRecord {
            day: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap_or_default(),
            stage: StageCode::from("BBCH_10"),
            development_index: 54.7,
        };
        let value = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(value["bbch"], "BBCH_10");
        assert!(value.get("t_sum").is_some());
    }
}
