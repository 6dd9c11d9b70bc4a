//! Core data types for Tempest observations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Timestamp type (Unix epoch seconds)
pub type Timestamp = i64;

/// Timestamp type (Unix epoch milliseconds)
pub type TimestampMs = i64;

/// Which wire shape produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Full,
    Reduced,
    LegacyPressure,
    LegacyWind,
    RapidWind,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Full => "full",
            ObservationKind::Reduced => "reduced",
            ObservationKind::LegacyPressure => "legacy_pressure",
            ObservationKind::LegacyWind => "legacy_wind",
            ObservationKind::RapidWind => "rapid_wind",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric metric slots an observation can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObservationField {
    WindLull,
    WindAvg,
    WindGust,
    WindDirection,
    WindSampleInterval,
    Pressure,
    AirTemperature,
    RelativeHumidity,
    Lux,
    UvIndex,
    SolarRadiation,
    RainAccumulation,
    PrecipitationType,
    AvgStrikeDistance,
    StrikeCount,
    BatteryVolts,
    ReportInterval,
    LocalDayRainAccumulation,
    NcRainAccumulation,
    LocalDayNcRainAccumulation,
    PrecipitationAnalysisType,
}

impl ObservationField {
    pub const ALL: [ObservationField; 21] = [
        ObservationField::WindLull,
        ObservationField::WindAvg,
        ObservationField::WindGust,
        ObservationField::WindDirection,
        ObservationField::WindSampleInterval,
        ObservationField::Pressure,
        ObservationField::AirTemperature,
        ObservationField::RelativeHumidity,
        ObservationField::Lux,
        ObservationField::UvIndex,
        ObservationField::SolarRadiation,
        ObservationField::RainAccumulation,
        ObservationField::PrecipitationType,
        ObservationField::AvgStrikeDistance,
        ObservationField::StrikeCount,
        ObservationField::BatteryVolts,
        ObservationField::ReportInterval,
        ObservationField::LocalDayRainAccumulation,
        ObservationField::NcRainAccumulation,
        ObservationField::LocalDayNcRainAccumulation,
        ObservationField::PrecipitationAnalysisType,
    ];

    /// Metric name used in configuration and series keys
    pub fn name(&self) -> &'static str {
        match self {
            ObservationField::WindLull => "wind_lull",
            ObservationField::WindAvg => "wind_avg",
            ObservationField::WindGust => "wind_gust",
            ObservationField::WindDirection => "wind_direction",
            ObservationField::WindSampleInterval => "wind_sample_interval",
            ObservationField::Pressure => "pressure",
            ObservationField::AirTemperature => "air_temperature",
            ObservationField::RelativeHumidity => "relative_humidity",
            ObservationField::Lux => "lux",
            ObservationField::UvIndex => "uv_index",
            ObservationField::SolarRadiation => "solar_radiation",
            ObservationField::RainAccumulation => "rain_accumulation",
            ObservationField::PrecipitationType => "precipitation_type",
            ObservationField::AvgStrikeDistance => "avg_strike_distance",
            ObservationField::StrikeCount => "strike_count",
            ObservationField::BatteryVolts => "battery_volts",
            ObservationField::ReportInterval => "report_interval",
            ObservationField::LocalDayRainAccumulation => "local_day_rain_accumulation",
            ObservationField::NcRainAccumulation => "nc_rain_accumulation",
            ObservationField::LocalDayNcRainAccumulation => "local_day_nc_rain_accumulation",
            ObservationField::PrecipitationAnalysisType => "precipitation_analysis_type",
        }
    }
}

impl FromStr for ObservationField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObservationField::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or(())
    }
}

/// Canonical sensor reading decoded from any wire shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub epoch: Timestamp,
    pub kind: ObservationKind,
    pub wind_lull: Option<f64>,
    pub wind_avg: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_direction: Option<f64>,
    pub wind_sample_interval: Option<f64>,
    pub pressure: Option<f64>,
    pub air_temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub lux: Option<f64>,
    pub uv_index: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub rain_accumulation: Option<f64>,
    pub precipitation_type: Option<f64>,
    pub avg_strike_distance: Option<f64>,
    pub strike_count: Option<f64>,
    pub battery_volts: Option<f64>,
    pub report_interval: Option<f64>,
    pub local_day_rain_accumulation: Option<f64>,
    pub nc_rain_accumulation: Option<f64>,
    pub local_day_nc_rain_accumulation: Option<f64>,
    pub precipitation_analysis_type: Option<f64>,
}

impl Observation {
    /// An observation with every metric slot empty
    pub fn empty(epoch: Timestamp, kind: ObservationKind) -> Self {
        Self {
            epoch,
            kind,
            wind_lull: None,
            wind_avg: None,
            wind_gust: None,
            wind_direction: None,
            wind_sample_interval: None,
            pressure: None,
            air_temperature: None,
            relative_humidity: None,
            lux: None,
            uv_index: None,
            solar_radiation: None,
            rain_accumulation: None,
            precipitation_type: None,
            avg_strike_distance: None,
            strike_count: None,
            battery_volts: None,
            report_interval: None,
            local_day_rain_accumulation: None,
            nc_rain_accumulation: None,
            local_day_nc_rain_accumulation: None,
            precipitation_analysis_type: None,
        }
    }

    fn slot(&self, field: ObservationField) -> &Option<f64> {
        match field {
            ObservationField::WindLull => &self.wind_lull,
            ObservationField::WindAvg => &self.wind_avg,
            ObservationField::WindGust => &self.wind_gust,
            ObservationField::WindDirection => &self.wind_direction,
            ObservationField::WindSampleInterval => &self.wind_sample_interval,
            ObservationField::Pressure => &self.pressure,
            ObservationField::AirTemperature => &self.air_temperature,
            ObservationField::RelativeHumidity => &self.relative_humidity,
            ObservationField::Lux => &self.lux,
            ObservationField::UvIndex => &self.uv_index,
            ObservationField::SolarRadiation => &self.solar_radiation,
            ObservationField::RainAccumulation => &self.rain_accumulation,
            ObservationField::PrecipitationType => &self.precipitation_type,
            ObservationField::AvgStrikeDistance => &self.avg_strike_distance,
            ObservationField::StrikeCount => &self.strike_count,
            ObservationField::BatteryVolts => &self.battery_volts,
            ObservationField::ReportInterval => &self.report_interval,
            ObservationField::LocalDayRainAccumulation => &self.local_day_rain_accumulation,
            ObservationField::NcRainAccumulation => &self.nc_rain_accumulation,
            ObservationField::LocalDayNcRainAccumulation => &self.local_day_nc_rain_accumulation,
            ObservationField::PrecipitationAnalysisType => &self.precipitation_analysis_type,
        }
    }

    fn slot_mut(&mut self, field: ObservationField) -> &mut Option<f64> {
        match field {
            ObservationField::WindLull => &mut self.wind_lull,
            ObservationField::WindAvg => &mut self.wind_avg,
            ObservationField::WindGust => &mut self.wind_gust,
            ObservationField::WindDirection => &mut self.wind_direction,
            ObservationField::WindSampleInterval => &mut self.wind_sample_interval,
            ObservationField::Pressure => &mut self.pressure,
            ObservationField::AirTemperature => &mut self.air_temperature,
            ObservationField::RelativeHumidity => &mut self.relative_humidity,
            ObservationField::Lux => &mut self.lux,
            ObservationField::UvIndex => &mut self.uv_index,
            ObservationField::SolarRadiation => &mut self.solar_radiation,
            ObservationField::RainAccumulation => &mut self.rain_accumulation,
            ObservationField::PrecipitationType => &mut self.precipitation_type,
            ObservationField::AvgStrikeDistance => &mut self.avg_strike_distance,
            ObservationField::StrikeCount => &mut self.strike_count,
            ObservationField::BatteryVolts => &mut self.battery_volts,
            ObservationField::ReportInterval => &mut self.report_interval,
            ObservationField::LocalDayRainAccumulation => &mut self.local_day_rain_accumulation,
            ObservationField::NcRainAccumulation => &mut self.nc_rain_accumulation,
            ObservationField::LocalDayNcRainAccumulation => {
                &mut self.local_day_nc_rain_accumulation
            }
            ObservationField::PrecipitationAnalysisType => &mut self.precipitation_analysis_type,
        }
    }

    pub fn get(&self, field: ObservationField) -> Option<f64> {
        *self.slot(field)
    }

    pub fn set(&mut self, field: ObservationField, value: Option<f64>) {
        *self.slot_mut(field) = value;
    }
}

/// Derived summary record attached to push-feed observation envelopes.
///
/// `epoch` is not part of the wire payload; the decoder copies it from the
/// sibling observation array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub strike_count_1h: Option<i64>,
    pub strike_count_3h: Option<i64>,
    pub precip_total_1h: Option<f64>,
    pub strike_last_dist: Option<f64>,
    pub strike_last_epoch: Option<i64>,
    pub precip_accum_local_yesterday: Option<f64>,
    pub precip_analysis_type_yesterday: Option<i64>,
    pub feels_like: Option<f64>,
    pub heat_index: Option<f64>,
    pub wind_chill: Option<f64>,
    pub wet_bulb_temperature: Option<f64>,
    pub wet_bulb_globe_temperature: Option<f64>,
    pub raining_minutes: Option<Vec<i64>>,
    pub dew_point: Option<f64>,
    pub precip_minutes_local_day: Option<i64>,
    pub precip_minutes_local_yesterday: Option<f64>,
    pub air_density: Option<f64>,
    pub delta_t: Option<f64>,
    pub pressure_trend: Option<String>,
    pub pulse_adj_ob_time: Option<i64>,
    pub pulse_adj_ob_wind_avg: Option<f64>,
    pub pulse_adj_ob_temp: Option<f64>,
    #[serde(skip_deserializing)]
    pub epoch: Timestamp,
}

impl Summary {
    /// Metric names a summary can produce
    pub const METRICS: [&'static str; 22] = [
        "strike_count_1h",
        "strike_count_3h",
        "precip_total_1h",
        "strike_last_dist",
        "strike_last_epoch",
        "precip_accum_local_yesterday",
        "precip_analysis_type_yesterday",
        "feels_like",
        "heat_index",
        "wind_chill",
        "wet_bulb_temperature",
        "wet_bulb_globe_temperature",
        "raining_minutes",
        "dew_point",
        "precip_minutes_local_day",
        "precip_minutes_local_yesterday",
        "air_density",
        "delta_t",
        "pressure_trend",
        "pulse_adj_ob_time",
        "pulse_adj_ob_wind_avg",
        "pulse_adj_ob_temp",
    ];

    /// A summary is only emitted once its epoch has been filled in
    pub fn is_valid(&self) -> bool {
        self.epoch != 0
    }

    /// Whether a metric is textual. `None` if the metric does not exist.
    pub fn is_string(metric: &str) -> Option<bool> {
        if !Self::METRICS.contains(&metric) {
            return None;
        }
        Some(metric == "pressure_trend")
    }
}

/// Value of a single datapoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatapointValue {
    Numeric(f64),
    Text(String),
}

impl DatapointValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DatapointValue::Numeric(v) => Some(*v),
            DatapointValue::Text(_) => None,
        }
    }
}

impl From<f64> for DatapointValue {
    fn from(value: f64) -> Self {
        DatapointValue::Numeric(value)
    }
}

/// One point of a metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp_ms: TimestampMs,
    pub value: DatapointValue,
}

impl Datapoint {
    pub fn new(timestamp_ms: TimestampMs, value: impl Into<DatapointValue>) -> Self {
        Self {
            timestamp_ms,
            value: value.into(),
        }
    }
}

/// Metric name -> datapoints, in input record order
pub type MetricSeries = BTreeMap<String, Vec<Datapoint>>;

/// Persisted progress boundaries for one metric key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Earliest epoch-ms successfully backfilled
    pub low: Option<TimestampMs>,
    /// Latest epoch-ms successfully streamed or frontfilled
    pub high: Option<TimestampMs>,
}

impl Watermark {
    pub fn new(low: Option<TimestampMs>, high: Option<TimestampMs>) -> Self {
        Self { low, high }
    }

    /// Widen the watermark so it covers `[low, high]`
    pub fn expanded(self, low: TimestampMs, high: TimestampMs) -> Self {
        Self {
            low: Some(self.low.map_or(low, |current| current.min(low))),
            high: Some(self.high.map_or(high, |current| current.max(high))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }
}
