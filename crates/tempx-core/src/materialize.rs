//! Conversion of decoded records into per-metric datapoint series

use crate::types::{
    Datapoint, DatapointValue, MetricSeries, Observation, ObservationField, Summary, Timestamp,
};

/// A decoded record that can be projected onto named metrics
pub trait MetricRecord {
    fn epoch(&self) -> Timestamp;

    /// Value of `metric` on this record, or `None` if absent or unknown
    fn metric_value(&self, metric: &str) -> Option<DatapointValue>;
}

impl MetricRecord for Observation {
    fn epoch(&self) -> Timestamp {
        self.epoch
    }

    fn metric_value(&self, metric: &str) -> Option<DatapointValue> {
        let field: ObservationField = metric.parse().ok()?;
        self.get(field).map(DatapointValue::Numeric)
    }
}

impl MetricRecord for Summary {
    fn epoch(&self) -> Timestamp {
        self.epoch
    }

    fn metric_value(&self, metric: &str) -> Option<DatapointValue> {
        let int = |v: Option<i64>| v.map(|v| DatapointValue::Numeric(v as f64));
        let float = |v: Option<f64>| v.map(DatapointValue::Numeric);

        match metric {
            "strike_count_1h" => int(self.strike_count_1h),
            "strike_count_3h" => int(self.strike_count_3h),
            "precip_total_1h" => float(self.precip_total_1h),
            "strike_last_dist" => float(self.strike_last_dist),
            "strike_last_epoch" => int(self.strike_last_epoch),
            "precip_accum_local_yesterday" => float(self.precip_accum_local_yesterday),
            "precip_analysis_type_yesterday" => int(self.precip_analysis_type_yesterday),
            "feels_like" => float(self.feels_like),
            "heat_index" => float(self.heat_index),
            "wind_chill" => float(self.wind_chill),
            "wet_bulb_temperature" => float(self.wet_bulb_temperature),
            "wet_bulb_globe_temperature" => float(self.wet_bulb_globe_temperature),
            // Stored as per-5-minute buckets; the metric is minutes raining this hour
            "raining_minutes" => self
                .raining_minutes
                .as_ref()
                .map(|buckets| DatapointValue::Numeric(buckets.iter().sum::<i64>() as f64)),
            "dew_point" => float(self.dew_point),
            "precip_minutes_local_day" => int(self.precip_minutes_local_day),
            "precip_minutes_local_yesterday" => float(self.precip_minutes_local_yesterday),
            "air_density" => float(self.air_density),
            "delta_t" => float(self.delta_t),
            "pressure_trend" => self.pressure_trend.clone().map(DatapointValue::Text),
            "pulse_adj_ob_time" => int(self.pulse_adj_ob_time),
            "pulse_adj_ob_wind_avg" => float(self.pulse_adj_ob_wind_avg),
            "pulse_adj_ob_temp" => float(self.pulse_adj_ob_temp),
            _ => None,
        }
    }
}

/// Build one series per requested metric.
///
/// Every requested metric gets an entry, empty when no record carries it.
/// Datapoints keep the input record order.
pub fn materialize<R, S>(records: &[R], metrics: &[S]) -> MetricSeries
where
    R: MetricRecord,
    S: AsRef<str>,
{
    metrics
        .iter()
        .map(|metric| {
            let metric = metric.as_ref();
            let points = records
                .iter()
                .filter_map(|record| {
                    let timestamp_ms = record.epoch().checked_mul(1000)?;
                    record
                        .metric_value(metric)
                        .map(|value| Datapoint::new(timestamp_ms, value))
                })
                .collect();
            (metric.to_string(), points)
        })
        .collect()
}

/// Drop metrics that produced no datapoints
pub fn non_empty(series: MetricSeries) -> impl Iterator<Item = (String, Vec<Datapoint>)> {
    series.into_iter().filter(|(_, points)| !points.is_empty())
}
