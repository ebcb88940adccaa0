use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw fix as handed over by the capture source, before the relay stamps it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Fix {
    /// Capture-side identifier. Generated by the relay when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f32,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub heading: Option<f32>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

/// One location sample travelling through the delivery pipeline.
///
/// `id` is the only key the pending store uses for removal, so it must never
/// be reused across the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// ISO-8601 with offset, stamped when the sample is submitted.
    pub tracked_at: String,
    /// Local bookkeeping only, never sent to the collector.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_synced: bool,
}

impl Sample {
    /// Stamp a fix with an id (kept if the capture source supplied one) and
    /// the current time.
    pub fn from_fix(fix: Fix) -> Self {
        Self {
            id: fix.id.unwrap_or_else(new_id),
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            speed: fix.speed,
            heading: fix.heading,
            altitude: fix.altitude,
            tracked_at: now_iso8601(),
            is_synced: false,
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time as `2026-01-01T12:00:00.000+00:00`.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}
