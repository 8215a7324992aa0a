// Core data types shared by the parser, cache, session and sources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single named vital signal.
///
/// The set is fixed; which channels a reading carries depends on the wire
/// format the device speaks (see [`LineFormat`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "heart_rate")]
    HeartRate,
    #[serde(rename = "spo2")]
    SpO2,
    #[serde(rename = "temp_c")]
    TempC,
    #[serde(rename = "temp_f")]
    TempF,
    #[serde(rename = "bp_sys")]
    Systolic,
    #[serde(rename = "bp_dia")]
    Diastolic,
    #[serde(rename = "weight_kg")]
    WeightKg,
    #[serde(rename = "alcohol_detected")]
    AlcoholDetected,
    #[serde(rename = "alcohol_level")]
    AlcoholLevel,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::HeartRate,
        Channel::SpO2,
        Channel::TempC,
        Channel::TempF,
        Channel::Systolic,
        Channel::Diastolic,
        Channel::WeightKg,
        Channel::AlcoholDetected,
        Channel::AlcoholLevel,
    ];

    /// Canonical key used in serialized readings.
    pub fn key(&self) -> &'static str {
        match self {
            Channel::HeartRate => "heart_rate",
            Channel::SpO2 => "spo2",
            Channel::TempC => "temp_c",
            Channel::TempF => "temp_f",
            Channel::Systolic => "bp_sys",
            Channel::Diastolic => "bp_dia",
            Channel::WeightKg => "weight_kg",
            Channel::AlcoholDetected => "alcohol_detected",
            Channel::AlcoholLevel => "alcohol_level",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Channel::HeartRate => "Heart Rate",
            Channel::SpO2 => "SpO2",
            Channel::TempC => "Temperature",
            Channel::TempF => "Temperature (F)",
            Channel::Systolic => "Systolic BP",
            Channel::Diastolic => "Diastolic BP",
            Channel::WeightKg => "Weight",
            Channel::AlcoholDetected => "Alcohol Detected",
            Channel::AlcoholLevel => "Alcohol Level",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Channel::HeartRate => "bpm",
            Channel::SpO2 => "%",
            Channel::TempC => "°C",
            Channel::TempF => "°F",
            Channel::Systolic | Channel::Diastolic => "mmHg",
            Channel::WeightKg => "kg",
            Channel::AlcoholDetected => "",
            Channel::AlcoholLevel => "",
        }
    }

    /// Number of decimal places a value of this channel is displayed with.
    pub fn precision(&self) -> usize {
        match self {
            Channel::SpO2 | Channel::TempC | Channel::WeightKg => 1,
            _ => 0,
        }
    }

    /// Resolve a device-side key to a channel.
    ///
    /// Firmware revisions disagree on naming (`hr` vs `heart_rate`, `spo` vs
    /// `spo2`, `TempC` vs `tempC`, nested `bp.sys`), so matching is on a
    /// normalized form: lowercase with `_`, `-` and `.` removed.
    pub fn from_key(key: &str) -> Option<Channel> {
        let normalized: String = key
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "hr" | "heartrate" | "pulse" | "bpm" => Some(Channel::HeartRate),
            "spo" | "spo2" | "oxygen" => Some(Channel::SpO2),
            "tempc" | "temperature" | "temp" => Some(Channel::TempC),
            "tempf" => Some(Channel::TempF),
            "bpsys" | "sys" | "systolic" => Some(Channel::Systolic),
            "bpdia" | "dia" | "diastolic" => Some(Channel::Diastolic),
            "weightkg" | "weight" => Some(Channel::WeightKg),
            "alcoholdetected" => Some(Channel::AlcoholDetected),
            "alcohollevel" => Some(Channel::AlcoholLevel),
            _ => None,
        }
    }

    /// Format a value with this channel's precision.
    pub fn format_value(&self, value: f64) -> String {
        format!("{:.*}", self.precision(), value)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::from_key(s).ok_or_else(|| {
            let known: Vec<&str> = Channel::ALL.iter().map(|c| c.key()).collect();
            format!("Unknown channel '{}'. Expected one of: {}", s, known.join(", "))
        })
    }
}

/// Wire format a reading was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineFormat {
    /// Self-describing key/value payload
    Json,
    /// heart_rate,spo2,temp_c,temp_f,alcohol_detected,alcohol_level
    Csv6,
    /// heart_rate,spo2,temp_c,temp_f
    Csv4,
    /// heart_rate,spo2
    Csv2,
}

impl LineFormat {
    /// Channels carried by the fixed-width CSV formats, in field order.
    pub fn csv_channels(&self) -> &'static [Channel] {
        match self {
            LineFormat::Json => &[],
            LineFormat::Csv6 => &[
                Channel::HeartRate,
                Channel::SpO2,
                Channel::TempC,
                Channel::TempF,
                Channel::AlcoholDetected,
                Channel::AlcoholLevel,
            ],
            LineFormat::Csv4 => &[Channel::HeartRate, Channel::SpO2, Channel::TempC, Channel::TempF],
            LineFormat::Csv2 => &[Channel::HeartRate, Channel::SpO2],
        }
    }
}

/// One instant's structured sensor values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Recognized channel values
    pub values: BTreeMap<Channel, f64>,

    /// Numeric keys of a structured payload that name no known channel
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,

    /// When the reading was decoded (display and freshness only)
    pub timestamp: DateTime<Utc>,

    /// Original device line, kept for audit
    pub raw: String,

    pub format: LineFormat,
}

impl Reading {
    pub fn new(format: LineFormat, raw: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            values: BTreeMap::new(),
            extra: BTreeMap::new(),
            timestamp,
            raw: raw.into(),
            format,
        }
    }

    pub fn with_value(mut self, channel: Channel, value: f64) -> Self {
        self.values.insert(channel, value);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.values.get(&channel).copied()
    }

    /// Value as an integer, if it is integral.
    pub fn get_int(&self, channel: Channel) -> Option<i64> {
        self.get(channel)
            .filter(|v| v.fract() == 0.0 && v.is_finite())
            .map(|v| v as i64)
    }

    pub fn channels(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extra.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_aliases() {
        assert_eq!(Channel::from_key("hr"), Some(Channel::HeartRate));
        assert_eq!(Channel::from_key("heart_rate"), Some(Channel::HeartRate));
        assert_eq!(Channel::from_key("spo"), Some(Channel::SpO2));
        assert_eq!(Channel::from_key("SpO2"), Some(Channel::SpO2));
        assert_eq!(Channel::from_key("TempC"), Some(Channel::TempC));
        assert_eq!(Channel::from_key("TempF"), Some(Channel::TempF));
        assert_eq!(Channel::from_key("bp.sys"), Some(Channel::Systolic));
        assert_eq!(Channel::from_key("bpDia"), Some(Channel::Diastolic));
        assert_eq!(Channel::from_key("weightKg"), Some(Channel::WeightKg));
        assert_eq!(Channel::from_key("ts"), None);
    }

    #[test]
    fn test_canonical_keys_round_trip_through_aliases() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_key(channel.key()), Some(channel));
        }
    }

    #[test]
    fn test_channel_serializes_as_canonical_key() {
        let json = serde_json::to_string(&Channel::Systolic).unwrap();
        assert_eq!(json, "\"bp_sys\"");
    }

    #[test]
    fn test_format_value_uses_precision() {
        assert_eq!(Channel::SpO2.format_value(97.26), "97.3");
        assert_eq!(Channel::HeartRate.format_value(72.0), "72");
    }

    #[test]
    fn test_get_int_rejects_fractional() {
        let reading = Reading::new(LineFormat::Json, "{}", Utc::now())
            .with_value(Channel::HeartRate, 72.0)
            .with_value(Channel::TempC, 36.6);
        assert_eq!(reading.get_int(Channel::HeartRate), Some(72));
        assert_eq!(reading.get_int(Channel::TempC), None);
        assert_eq!(reading.get_int(Channel::SpO2), None);
    }
}
