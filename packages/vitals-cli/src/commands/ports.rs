use crate::cli::PortsArgs;
use crate::commands::fail;
use crate::exit_codes;
use crate::output;
use vitals_rs::source::SerialSource;

pub fn execute(args: PortsArgs) -> i32 {
    let ports = match SerialSource::available_ports() {
        Ok(ports) => ports,
        Err(e) => return fail(&e),
    };

    if args.json {
        return match output::to_json(&ports, false).and_then(|json| output::write_output(&json, None)) {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                exit_codes::EXECUTION_ERROR
            }
        };
    }

    if ports.is_empty() {
        println!("No serial ports found");
        return exit_codes::SUCCESS;
    }

    println!("{:<28} {:<10} Description", "Port", "Type");
    for port in &ports {
        println!(
            "{:<28} {:<10} {}",
            port.name,
            port.kind,
            port.description.as_deref().unwrap_or("")
        );
    }

    exit_codes::SUCCESS
}
