use crate::cli::CaptureArgs;
use crate::commands::{build_engine, connect};
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use tokio::time::{interval, Duration, MissedTickBehavior};
use vitals_rs::{Channel, SessionSnapshot, REQUIRED_CHANNELS};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Serialize)]
struct CaptureOutput {
    committed: BTreeMap<Channel, f64>,
    /// Committed values with their display precision and unit
    display: BTreeMap<Channel, String>,
    complete: bool,
    missing: Vec<Channel>,
    session: SessionSnapshot,
}

impl CaptureOutput {
    fn new(committed: BTreeMap<Channel, f64>, session: SessionSnapshot) -> Self {
        let display = committed
            .iter()
            .map(|(c, v)| (*c, format!("{} {}", c.format_value(*v), c.unit()).trim().to_string()))
            .collect();
        let missing: Vec<Channel> = REQUIRED_CHANNELS
            .iter()
            .filter(|c| !committed.contains_key(*c))
            .copied()
            .collect();
        Self {
            complete: missing.is_empty(),
            committed,
            display,
            missing,
            session,
        }
    }
}

pub async fn execute(args: CaptureArgs) -> i32 {
    let (engine, source_config) = match build_engine(&args.source, None, args.window_ms) {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    if let Err(code) = connect(&engine, source_config).await {
        return code;
    }

    let window = engine.config().capture_window();
    if !args.quiet {
        eprintln!("Capturing vitals for {:.1}s...", window.as_secs_f64());
    }

    engine.start_capture();

    let mut tick = interval(POLL_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut device_lost = false;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Capture interrupted, committing collected samples");
                engine.stop_capture();
                break;
            }
            _ = tick.tick() => {
                if engine.poll_capture().is_some() {
                    break;
                }
                if !engine.is_connected() {
                    device_lost = true;
                    engine.stop_capture();
                    break;
                }
                if !args.quiet {
                    eprint!("\r  Progress: {:>3.0}%", engine.capture_progress());
                    let _ = std::io::stderr().flush();
                }
            }
        }
    }
    if !args.quiet {
        eprintln!("\r  Progress: done");
    }

    let result = CaptureOutput::new(engine.committed_vitals(), engine.session_snapshot());

    if let Err(e) = engine.disconnect().await {
        log::warn!("Error during disconnect: {}", e);
    }

    if result.committed.is_empty() {
        eprintln!("Error: No readings received during the capture window");
        return if device_lost {
            exit_codes::CONNECTION_ERROR
        } else {
            exit_codes::NO_READING
        };
    }

    let written = output::to_json(&result, args.compact)
        .and_then(|json| output::write_output(&json, args.output.as_deref()));
    if let Err(e) = written {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    if !args.quiet {
        if let Some(ref path) = args.output {
            eprintln!("Results written to {}", path);
        }
    }

    if device_lost {
        eprintln!("Error: Device disconnected during capture");
        return exit_codes::CONNECTION_ERROR;
    }
    if args.require_complete && !result.complete {
        let missing: Vec<&str> = result.missing.iter().map(|c| c.key()).collect();
        eprintln!("Error: Incomplete vitals, missing {}", missing.join(", "));
        return exit_codes::EXECUTION_ERROR;
    }

    exit_codes::SUCCESS
}
