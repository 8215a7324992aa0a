use crate::cli::ReadArgs;
use crate::commands::{build_engine, connect, fail};
use crate::exit_codes;
use crate::output::JsonSink;

pub async fn execute(args: ReadArgs) -> i32 {
    let (engine, source_config) = match build_engine(&args.source, args.timeout_ms, None) {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    if let Err(code) = connect(&engine, source_config).await {
        return code;
    }

    let sink = JsonSink::new(args.output.clone(), args.compact);
    let code = match engine.capture_and_save(&sink).await {
        Ok(_) => {
            if let Some(ref path) = args.output {
                eprintln!("Reading written to {}", path);
            }
            exit_codes::SUCCESS
        }
        Err(e) => fail(&e),
    };

    if let Err(e) = engine.disconnect().await {
        log::warn!("Error during disconnect: {}", e);
    }
    code
}
