//! The JSON document written at the end of a run.

use std::io::Write;

use agrocast_types::{AlertMessage, EndReason, PhenologyRecord, RunId, SimulationOutput};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::EngineError;

/// Run result plus the remarks gathered while preparing the scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDocument {
    /// Identifier of the run.
    pub run_id: RunId,
    /// Stage transitions, starting with the initial stage.
    pub phenology: Vec<PhenologyRecord>,
    /// Weather alerts in the order they were raised.
    #[serde(rename = "weatheralerts")]
    pub weather_alerts: Vec<AlertMessage>,
    /// Management alerts in the order they were raised.
    #[serde(rename = "managementalerts")]
    pub management_alerts: Vec<AlertMessage>,
    /// Day the final stage was reached, or the last simulated day when
    /// the weather ran out first.
    pub maturity_date: Option<NaiveDate>,
    /// Why the run stopped.
    pub end_reason: EndReason,
    /// Free-text notes, such as rule-table fallbacks.
    pub remarks: Vec<String>,
}

impl OutputDocument {
    /// Combine a finished run with its remarks.
    pub fn new(output: SimulationOutput, remarks: Vec<String>) -> Self {
        Self {
            run_id: output.run_id,
            phenology: output.phenology,
            weather_alerts: output.weather_alerts,
            management_alerts: output.management_alerts,
            maturity_date: output.maturity_date,
            end_reason: output.end_reason,
            remarks,
        }
    }

    /// Write the document as pretty-printed JSON followed by a newline.
    pub fn write_to(&self, mut writer: impl Write) -> Result<(), EngineError> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer).map_err(|source| EngineError::Io {
            path: "<output>".into(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use agrocast_types::{MessageId, StageCode};

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn output() -> SimulationOutput {
        SimulationOutput {
            run_id: RunId::new(),
            phenology: vec![
                PhenologyRecord {
                    day: day(1),
                    stage: StageCode::from("BBCH_00"),
                    development_index: 0.0,
                },
                PhenologyRecord {
                    day: day(9),
                    stage: StageCode::from("BBCH_10"),
                    development_index: 101.3,
                },
            ],
            weather_alerts: vec![AlertMessage {
                day: day(4),
                message_id: MessageId(12),
                message: "Heat stress".to_owned(),
            }],
            management_alerts: Vec::new(),
            maturity_date: Some(day(9)),
            end_reason: EndReason::CropMatured,
            days_simulated: 8,
        }
    }

    #[test]
    fn document_uses_dashboard_field_names() {
        let document = OutputDocument::new(output(), vec!["generic rows".to_owned()]);
        let mut buffer = Vec::new();
        document.write_to(&mut buffer).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

        assert_eq!(value["phenology"][1]["bbch"], "BBCH_10");
        assert_eq!(value["phenology"][1]["t_sum"], 101.3);
        assert_eq!(value["weatheralerts"][0]["day"], "2024-06-04");
        assert_eq!(value["weatheralerts"][0]["msg_id"], 12);
        assert_eq!(value["weatheralerts"][0]["msg"], "Heat stress");
        assert_eq!(value["managementalerts"], serde_json::json!([]));
        assert_eq!(value["maturity_date"], "2024-06-09");
        assert_eq!(value["end_reason"], "crop_matured");
        assert_eq!(value["remarks"][0], "generic rows");
        assert!(value.get("days_simulated").is_none());
    }

    #[test]
    fn missing_maturity_serializes_as_null() {
        let mut unfinished = output();
        unfinished.maturity_date = None;
        unfinished.end_reason = EndReason::WeatherExhausted;
        let document = OutputDocument::new(unfinished, Vec::new());
        let value = serde_json::to_value(&document).unwrap();
        assert!(value["maturity_date"].is_null());
        assert_eq!(value["end_reason"], "weather_exhausted");
    }
}
