//! Wire envelopes and positional record schemas
//!
//! Every raw observation is a flat JSON array whose element 0 is the epoch in
//! seconds. The remaining slots are interpreted through a fixed table per wire
//! shape; see [`WireShape::schema`].

use crate::types::{
    Observation, ObservationField, ObservationKind, Summary, Timestamp, TimestampMs,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::ObservationField::*;

/// Decoding failure for a single record or summary
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unrecognized record format: {0}")]
    UnrecognizedFormat(String),

    #[error("Malformed {shape} record: {reason}")]
    MalformedRecord { shape: &'static str, reason: String },

    #[error("Envelope is missing {0}")]
    MissingEnvelopeData(&'static str),

    #[error("Invalid summary payload: {0}")]
    InvalidSummary(#[from] serde_json::Error),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Raw record shapes carried by the push feed and the historical API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireShape {
    /// `obs_st`
    Full,
    /// `obs_st_reduced`, the sky layout under the composite device
    Reduced,
    /// `obs_air`
    LegacyPressure,
    /// `obs_sky`
    LegacyWind,
    /// `rapid_wind`
    RapidWind,
}

const FULL_SCHEMA: &[(usize, ObservationField)] = &[
    (1, WindLull),
    (2, WindAvg),
    (3, WindGust),
    (4, WindDirection),
    (5, WindSampleInterval),
    (6, Pressure),
    (7, AirTemperature),
    (8, RelativeHumidity),
    (9, Lux),
    (10, UvIndex),
    (11, SolarRadiation),
    (12, RainAccumulation),
    (13, PrecipitationType),
    (14, AvgStrikeDistance),
    (15, StrikeCount),
    (16, BatteryVolts),
    (17, ReportInterval),
    (18, LocalDayRainAccumulation),
    (19, NcRainAccumulation),
    (20, LocalDayNcRainAccumulation),
    (21, PrecipitationAnalysisType),
];

const SKY_SCHEMA: &[(usize, ObservationField)] = &[
    (1, Lux),
    (2, UvIndex),
    (3, RainAccumulation),
    (4, WindLull),
    (5, WindAvg),
    (6, WindGust),
    (7, WindDirection),
    (8, BatteryVolts),
    (9, ReportInterval),
    (10, SolarRadiation),
    (11, LocalDayRainAccumulation),
    (12, PrecipitationType),
    (13, WindSampleInterval),
    (14, NcRainAccumulation),
    (15, LocalDayNcRainAccumulation),
    (16, PrecipitationAnalysisType),
];

const AIR_SCHEMA: &[(usize, ObservationField)] = &[
    (1, Pressure),
    (2, AirTemperature),
    (3, RelativeHumidity),
    (4, StrikeCount),
    (5, AvgStrikeDistance),
    (6, BatteryVolts),
    (7, ReportInterval),
];

const RAPID_WIND_SCHEMA: &[(usize, ObservationField)] = &[(1, WindAvg), (2, WindDirection)];

impl WireShape {
    pub fn from_tag(tag: &str) -> DecodeResult<Self> {
        match tag {
            "obs_st" => Ok(WireShape::Full),
            "obs_st_reduced" => Ok(WireShape::Reduced),
            "obs_air" => Ok(WireShape::LegacyPressure),
            "obs_sky" => Ok(WireShape::LegacyWind),
            "rapid_wind" => Ok(WireShape::RapidWind),
            other => Err(DecodeError::UnrecognizedFormat(other.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            WireShape::Full => "obs_st",
            WireShape::Reduced => "obs_st_reduced",
            WireShape::LegacyPressure => "obs_air",
            WireShape::LegacyWind => "obs_sky",
            WireShape::RapidWind => "rapid_wind",
        }
    }

    pub fn kind(&self) -> ObservationKind {
        match self {
            WireShape::Full => ObservationKind::Full,
            WireShape::Reduced => ObservationKind::Reduced,
            WireShape::LegacyPressure => ObservationKind::LegacyPressure,
            WireShape::LegacyWind => ObservationKind::LegacyWind,
            WireShape::RapidWind => ObservationKind::RapidWind,
        }
    }

    /// Index -> field table for this shape
    pub fn schema(&self) -> &'static [(usize, ObservationField)] {
        match self {
            WireShape::Full => FULL_SCHEMA,
            WireShape::Reduced | WireShape::LegacyWind => SKY_SCHEMA,
            WireShape::LegacyPressure => AIR_SCHEMA,
            WireShape::RapidWind => RAPID_WIND_SCHEMA,
        }
    }

    /// Shortest record accepted. Older composite firmware stops after the
    /// report interval, so `obs_st` accepts 18 as well as 22 elements.
    pub fn min_len(&self) -> usize {
        match self {
            WireShape::Full => 18,
            WireShape::Reduced | WireShape::LegacyWind => 17,
            WireShape::LegacyPressure => 8,
            WireShape::RapidWind => 3,
        }
    }
}

/// One push-feed or historical API message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub device_id: Option<i64>,

    /// Observation records; `null` in historical responses without data
    #[serde(default)]
    pub obs: Option<Vec<Vec<Value>>>,

    /// Single record used by `rapid_wind` events
    #[serde(default)]
    pub ob: Option<Vec<Value>>,

    #[serde(default)]
    pub summary: Option<Value>,
}

impl Envelope {
    /// All raw records carried by the envelope, in arrival order
    pub fn records(&self) -> Vec<&[Value]> {
        let mut records: Vec<&[Value]> = self
            .obs
            .iter()
            .flatten()
            .map(|record| record.as_slice())
            .collect();
        if let Some(ob) = &self.ob {
            records.push(ob.as_slice());
        }
        records
    }
}

/// Largest epoch in seconds whose millisecond form still fits a `TimestampMs`
const MAX_EPOCH_SECS: Timestamp = TimestampMs::MAX / 1000;

/// Epoch seconds from a JSON number, rejecting values that cannot be
/// expressed in milliseconds
fn parse_epoch(value: &Value) -> Option<Timestamp> {
    let epoch = match value.as_i64() {
        Some(epoch) => epoch,
        None => {
            let secs = value.as_f64()?;
            if !secs.is_finite() || secs.abs() > MAX_EPOCH_SECS as f64 {
                return None;
            }
            secs as Timestamp
        }
    };
    (-MAX_EPOCH_SECS..=MAX_EPOCH_SECS)
        .contains(&epoch)
        .then_some(epoch)
}

/// Decode one positional record of a known shape
pub fn decode_record(shape: WireShape, values: &[Value]) -> DecodeResult<Observation> {
    if values.len() < shape.min_len() {
        return Err(DecodeError::MalformedRecord {
            shape: shape.tag(),
            reason: format!(
                "expected at least {} elements, got {}",
                shape.min_len(),
                values.len()
            ),
        });
    }

    let epoch = parse_epoch(&values[0]).ok_or_else(|| DecodeError::MalformedRecord {
        shape: shape.tag(),
        reason: format!("epoch is not a valid timestamp: {}", values[0]),
    })?;

    let mut observation = Observation::empty(epoch, shape.kind());
    for (index, field) in shape.schema() {
        let value = values.get(*index).and_then(Value::as_f64);
        observation.set(*field, value);
    }
    Ok(observation)
}

/// Decode every record of an envelope, one result per record.
///
/// An envelope without records yields an empty list regardless of its tag.
pub fn decode_envelope(envelope: &Envelope) -> Vec<DecodeResult<Observation>> {
    let records = envelope.records();
    if records.is_empty() {
        return Vec::new();
    }

    let tag = envelope.kind.as_deref().unwrap_or_default();
    match WireShape::from_tag(tag) {
        Ok(shape) => records
            .into_iter()
            .map(|record| decode_record(shape, record))
            .collect(),
        Err(_) => records
            .iter()
            .map(|_| Err(DecodeError::UnrecognizedFormat(tag.to_string())))
            .collect(),
    }
}

/// Decode an envelope, logging and skipping records that fail
pub fn decode_observations(envelope: &Envelope) -> Vec<Observation> {
    decode_envelope(envelope)
        .into_iter()
        .filter_map(|result| match result {
            Ok(observation) => Some(observation),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable record");
                None
            }
        })
        .collect()
}

/// Decode the summary attached to an envelope, stamping it with the epoch of
/// the first sibling observation.
pub fn decode_summary(envelope: &Envelope) -> DecodeResult<Summary> {
    let payload = envelope
        .summary
        .as_ref()
        .ok_or(DecodeError::MissingEnvelopeData("summary"))?;

    let first = envelope
        .obs
        .as_ref()
        .and_then(|obs| obs.first())
        .and_then(|record| record.first())
        .ok_or(DecodeError::MissingEnvelopeData("obs"))?;
    let epoch = parse_epoch(first).ok_or_else(|| DecodeError::MalformedRecord {
        shape: "summary",
        reason: format!("epoch is not a valid timestamp: {}", first),
    })?;

    let mut summary: Summary = serde_json::from_value(payload.clone())?;
    summary.epoch = epoch;
    Ok(summary)
}
