pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod parser;
pub mod session;
pub mod sink;
pub mod source;
pub mod types;

pub use config::{EngineConfig, SerialConfig};
pub use engine::{EngineEvent, EngineStatus, VitalsEngine};
pub use error::{Result, VitalsError};
pub use parser::{parse_line, parse_line_at};
pub use session::{median, CaptureSession, SessionSnapshot, VitalState, VitalStatus, REQUIRED_CHANNELS};
pub use sink::{MemorySink, ReadingSink};
pub use source::{
    DeviceSource, SourceConfig, SourceEvent, SourceKind, SourceMetadata, SourceMonitor,
};
pub use types::*;
