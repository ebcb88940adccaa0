use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// Request envelope POSTed to the collector for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub id: String,
    pub locations: Vec<LocationItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationItem {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    pub tracked_at: String,
}

impl From<&Sample> for LocationItem {
    fn from(sample: &Sample) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            speed: sample.speed,
            heading: sample.heading,
            altitude: sample.altitude,
            tracked_at: sample.tracked_at.clone(),
        }
    }
}
