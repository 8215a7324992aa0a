use crate::cli::WatchArgs;
use crate::commands::{build_engine, connect};
use crate::exit_codes;
use crate::output;
use std::future::pending;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use vitals_rs::EngineEvent;

pub async fn execute(args: WatchArgs) -> i32 {
    let (engine, source_config) = match build_engine(&args.source, None, None) {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.set_event_callback(move |event| {
        let _ = tx.send(event);
    });

    if let Err(code) = connect(&engine, source_config).await {
        return code;
    }

    let deadline = args
        .duration_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let timer = async move {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => pending::<()>().await,
        }
    };
    tokio::pin!(timer);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen: u64 = 0;
    let code = loop {
        tokio::select! {
            _ = &mut ctrl_c => break exit_codes::SUCCESS,
            _ = &mut timer => break exit_codes::SUCCESS,
            event = rx.recv() => match event {
                Some(EngineEvent::Reading(reading)) => {
                    let written = output::to_json(&reading, true)
                        .and_then(|json| output::write_output(&json, None));
                    if let Err(e) = written {
                        eprintln!("Error: {}", e);
                        break exit_codes::EXECUTION_ERROR;
                    }
                    seen += 1;
                    if args.count.is_some_and(|n| seen >= n) {
                        break exit_codes::SUCCESS;
                    }
                }
                Some(EngineEvent::Error(message)) => {
                    eprintln!("Error: {}", message);
                    break exit_codes::CONNECTION_ERROR;
                }
                Some(_) => {}
                None => break exit_codes::EXECUTION_ERROR,
            }
        }
    };

    log::info!("Watched {} readings", seen);
    if let Err(e) = engine.disconnect().await {
        log::warn!("Error during disconnect: {}", e);
    }
    code
}
