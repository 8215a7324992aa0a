use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use vitals_rs::{Reading, ReadingSink, VitalsError};

/// Write JSON string to stdout or a file.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(Path::new(path), format!("{}\n", json))
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e)),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .and_then(|_| handle.flush())
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Saves a reading by printing it as JSON to stdout or a file.
pub struct JsonSink {
    output: Option<String>,
    compact: bool,
}

impl JsonSink {
    pub fn new(output: Option<String>, compact: bool) -> Self {
        Self { output, compact }
    }
}

#[async_trait]
impl ReadingSink for JsonSink {
    async fn save(&self, reading: &Reading) -> vitals_rs::Result<()> {
        let json = to_json(reading, self.compact).map_err(VitalsError::Sink)?;
        write_output(&json, self.output.as_deref()).map_err(VitalsError::Sink)
    }
}
