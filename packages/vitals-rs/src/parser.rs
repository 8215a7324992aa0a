use crate::types::{Channel, LineFormat, Reading};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Decode one device line into a [`Reading`].
///
/// Formats are tried in a fixed priority order and the first match wins:
///
/// 1. Structured JSON object (any channel keys, precision preserved)
/// 2. Six integer fields: heart_rate,spo2,temp_c,temp_f,alcohol_detected,alcohol_level
/// 3. Four integer fields: heart_rate,spo2,temp_c,temp_f
/// 4. Two integer fields: heart_rate,spo2
///
/// Returns `None` for anything else. Serial lines routinely carry boot
/// banners and half-written frames, so an unrecognized line is dropped
/// rather than reported.
pub fn parse_line(line: &str) -> Option<Reading> {
    parse_line_at(line, Utc::now())
}

/// [`parse_line`] with an explicit capture timestamp.
pub fn parse_line_at(line: &str, timestamp: DateTime<Utc>) -> Option<Reading> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(reading) = parse_structured(trimmed, timestamp) {
        return Some(reading);
    }

    let fields = parse_integer_fields(trimmed)?;
    let format = match fields.len() {
        6 => LineFormat::Csv6,
        4 => LineFormat::Csv4,
        2 => LineFormat::Csv2,
        _ => return None,
    };

    let mut reading = Reading::new(format, trimmed, timestamp);
    for (channel, value) in format.csv_channels().iter().zip(fields) {
        reading.values.insert(*channel, value as f64);
    }
    Some(reading)
}

fn parse_structured(line: &str, timestamp: DateTime<Utc>) -> Option<Reading> {
    let Value::Object(object) = serde_json::from_str::<Value>(line).ok()? else {
        return None;
    };

    let mut reading = Reading::new(LineFormat::Json, line, timestamp);
    flatten_into(&mut reading, "", &object);
    Some(reading)
}

/// Walk a JSON object, folding nested objects into dotted keys
/// (`{"bp":{"sys":120}}` becomes `bp.sys`).
fn flatten_into(reading: &mut Reading, prefix: &str, object: &Map<String, Value>) {
    for (key, value) in object {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        let number = match value {
            Value::Object(inner) => {
                flatten_into(reading, &path, inner);
                continue;
            }
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };

        let Some(number) = number else {
            continue;
        };

        match Channel::from_key(&path) {
            Some(channel) => {
                reading.values.insert(channel, number);
            }
            None => {
                reading.extra.insert(path, number);
            }
        }
    }
}

/// Split on commas and require every field to be a non-negative integer.
fn parse_integer_fields(line: &str) -> Option<Vec<u64>> {
    line.split(',')
        .map(|field| {
            let field = field.trim();
            if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            field.parse::<u64>().ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_field_csv() {
        let reading = parse_line("72,98,37,98,0,12").unwrap();
        assert_eq!(reading.format, LineFormat::Csv6);
        assert_eq!(reading.values.len(), 6);
        assert_eq!(reading.get_int(Channel::HeartRate), Some(72));
        assert_eq!(reading.get_int(Channel::SpO2), Some(98));
        assert_eq!(reading.get_int(Channel::TempC), Some(37));
        assert_eq!(reading.get_int(Channel::TempF), Some(98));
        assert_eq!(reading.get_int(Channel::AlcoholDetected), Some(0));
        assert_eq!(reading.get_int(Channel::AlcoholLevel), Some(12));
        assert_eq!(reading.raw, "72,98,37,98,0,12");
    }

    #[test]
    fn test_four_field_csv() {
        let reading = parse_line("80,97,36,97").unwrap();
        assert_eq!(reading.format, LineFormat::Csv4);
        assert_eq!(reading.values.len(), 4);
        assert_eq!(reading.get(Channel::TempF), Some(97.0));
        assert_eq!(reading.get(Channel::AlcoholLevel), None);
    }

    #[test]
    fn test_legacy_two_field_csv() {
        let reading = parse_line("512, 1").unwrap();
        assert_eq!(reading.format, LineFormat::Csv2);
        assert_eq!(reading.get(Channel::HeartRate), Some(512.0));
        assert_eq!(reading.get(Channel::SpO2), Some(1.0));
    }

    #[test]
    fn test_whitespace_is_ignored() {
        let reading = parse_line("  72 , 98 \r\n").unwrap();
        assert_eq!(reading.format, LineFormat::Csv2);
        assert_eq!(reading.raw, "72 , 98");
    }

    #[test]
    fn test_unrecognized_lines() {
        for line in [
            "",
            "   ",
            "Booting sensor firmware v1.2",
            "72,98,37",
            "72,98,37,98,1",
            "72,98,37,98,0,12,5",
            "72.5,98",
            "-72,98",
            "72,,98,97",
            "72,98,",
            "42",
            "\"text\"",
            "[72, 98]",
            "{\"heart_rate\": 7",
        ] {
            assert!(parse_line(line).is_none(), "expected no reading for {:?}", line);
        }
    }

    #[test]
    fn test_structured_payload_preserves_precision() {
        let line = r#"{"hr": 75, "spo2": 97.6, "tempC": 36.9, "weightKg": 70.4}"#;
        let reading = parse_line(line).unwrap();
        assert_eq!(reading.format, LineFormat::Json);
        assert_eq!(reading.get(Channel::HeartRate), Some(75.0));
        assert_eq!(reading.get(Channel::SpO2), Some(97.6));
        assert_eq!(reading.get(Channel::TempC), Some(36.9));
        assert_eq!(reading.get(Channel::WeightKg), Some(70.4));
        assert_eq!(reading.raw, line);
    }

    #[test]
    fn test_structured_payload_nested_blood_pressure() {
        let line = r#"{"ts": 1700000000000, "bp": {"sys": 121, "dia": 79}, "hr": 70}"#;
        let reading = parse_line(line).unwrap();
        assert_eq!(reading.get(Channel::Systolic), Some(121.0));
        assert_eq!(reading.get(Channel::Diastolic), Some(79.0));
        assert_eq!(reading.get(Channel::HeartRate), Some(70.0));
        assert_eq!(reading.extra.get("ts"), Some(&1700000000000.0));
    }

    #[test]
    fn test_structured_payload_firmware_keys() {
        let line = r#"{"heart_rate":72,"spo":98,"TempC":37,"TempF":98,"alcohol_detected":true,"alcohol_level":3,"status":"ok"}"#;
        let reading = parse_line(line).unwrap();
        assert_eq!(reading.get(Channel::SpO2), Some(98.0));
        assert_eq!(reading.get(Channel::AlcoholDetected), Some(1.0));
        assert_eq!(reading.values.len(), 6);
        assert!(reading.extra.is_empty());
    }

    #[test]
    fn test_empty_object_is_still_a_reading() {
        let reading = parse_line("{}").unwrap();
        assert!(reading.is_empty());
        assert_eq!(reading.format, LineFormat::Json);
    }

    #[test]
    fn test_explicit_timestamp() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let reading = parse_line_at("72,98", ts).unwrap();
        assert_eq!(reading.timestamp, ts);
    }
}
