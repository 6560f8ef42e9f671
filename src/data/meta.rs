use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Provenance of a light curve
///
/// It is not used by any computation, but travels with the series through every transformation
/// and ends up in the header of the persisted output
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LightCurveMeta {
    /// Target identifier, e.g. a catalogue name
    pub target: Option<String>,
    /// Mission or instrument name
    pub mission: Option<String>,
    /// Mission segment: sector, quarter or campaign
    pub sector: Option<u32>,
    /// Pipeline or team which produced the data
    pub author: Option<String>,
    /// Exposure time of a single cadence, seconds
    pub exposure_time: Option<f64>,
    /// Free-form description of what was done with the data
    pub label: Option<String>,
}

impl LightCurveMeta {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn with_mission(mut self, mission: impl Into<String>, sector: Option<u32>) -> Self {
        self.mission = Some(mission.into());
        self.sector = sector;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_exposure_time(mut self, seconds: f64) -> Self {
        self.exposure_time = Some(seconds);
        self
    }

    /// Copy with a label appended to the existing one
    pub fn labeled(&self, step: &str) -> Self {
        let label = match &self.label {
            Some(label) => format!("{label}, {step}"),
            None => step.to_owned(),
        };
        Self {
            label: Some(label),
            ..self.clone()
        }
    }
}
