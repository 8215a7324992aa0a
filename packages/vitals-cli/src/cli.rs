use clap::{Args, Parser, Subcommand};
use vitals_rs::config::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};
use vitals_rs::{SerialConfig, SourceConfig};

#[derive(Parser)]
#[command(
    name = "vitals",
    version,
    about = "Vitals acquisition tool for intake kiosks",
    long_about = "Read, watch and capture patient vitals from a serial vitals device.\n\
                  Set $VITALS_SERIAL_PORT or use --port, or pass --simulate to use synthetic vitals."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show version, platform and serial support information
    Info(InfoArgs),
    /// List serial ports visible to this machine
    Ports(PortsArgs),
    /// Decode device lines from an argument, a file or stdin
    Parse(ParseArgs),
    /// Stream readings from a device as JSON lines
    Watch(WatchArgs),
    /// Wait for one fresh reading and print it
    Read(ReadArgs),
    /// Run a capture window and commit the median of each vital
    Capture(CaptureArgs),
}

/// Where readings come from
#[derive(Args, Clone)]
pub struct SourceArgs {
    /// Use the built-in simulator instead of a serial device
    #[arg(long, default_value_t = false)]
    pub simulate: bool,

    /// Seed for reproducible simulated vitals
    #[arg(long, requires = "simulate")]
    pub seed: Option<u64>,

    /// Serial port (e.g., /dev/ttyACM0, COM3); ignored with --simulate
    #[arg(long, env = "VITALS_SERIAL_PORT")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long, env = "VITALS_BAUD_RATE", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Per-read serial timeout in milliseconds
    #[arg(long, env = "VITALS_READ_TIMEOUT_MS", default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub read_timeout_ms: u64,
}

impl SourceArgs {
    /// Resolve to a source configuration, falling back to `default_port`.
    pub fn to_source_config(&self, default_port: &str) -> SourceConfig {
        if self.simulate {
            return SourceConfig::Simulated { seed: self.seed };
        }
        let mut serial = SerialConfig::new(
            self.port.clone().unwrap_or_else(|| default_port.to_string()),
            self.baud,
        );
        serial.read_timeout_ms = self.read_timeout_ms;
        SourceConfig::Serial(serial)
    }
}

#[derive(Args)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct PortsArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ParseArgs {
    /// A single line to decode (default: read lines from --input or stdin)
    pub line: Option<String>,

    /// File with one device line per row
    #[arg(short, long, conflicts_with = "line")]
    pub input: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Stop after this many readings
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,

    /// Stop after this many milliseconds
    #[arg(long)]
    pub duration_ms: Option<u64>,
}

#[derive(Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// How long to wait for a reading, in milliseconds
    #[arg(long, env = "VITALS_ACQUIRE_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Capture window length in milliseconds
    #[arg(long, env = "VITALS_CAPTURE_WINDOW_MS")]
    pub window_ms: Option<u64>,

    /// Fail unless blood pressure, heart rate, SpO2 and temperature were all captured
    #[arg(long, default_value_t = false)]
    pub require_complete: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_simulate_resolves_to_simulator() {
        let cli = Cli::try_parse_from(["vitals", "read", "--simulate", "--seed", "9"]).unwrap();
        let Command::Read(args) = cli.command else {
            panic!("expected read command");
        };
        assert!(matches!(
            args.source.to_source_config("/dev/ttyACM0"),
            SourceConfig::Simulated { seed: Some(9) }
        ));
    }

    #[test]
    fn test_port_falls_back_to_default() {
        let args = SourceArgs {
            simulate: false,
            seed: None,
            port: None,
            baud: 115200,
            read_timeout_ms: 250,
        };
        match args.to_source_config("COM9") {
            SourceConfig::Serial(serial) => {
                assert_eq!(serial.port, "COM9");
                assert_eq!(serial.baud_rate, 115200);
                assert_eq!(serial.read_timeout_ms, 250);
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_seed_requires_simulate() {
        assert!(Cli::try_parse_from(["vitals", "read", "--seed", "1"]).is_err());
    }

    #[test]
    fn test_simulate_wins_over_port() {
        let cli =
            Cli::try_parse_from(["vitals", "watch", "--simulate", "--port", "COM3"]).unwrap();
        let Command::Watch(args) = cli.command else {
            panic!("expected watch command");
        };
        assert!(matches!(
            args.source.to_source_config("COM3"),
            SourceConfig::Simulated { seed: None }
        ));
    }
}
