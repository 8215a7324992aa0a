use crate::cli::ParseArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use std::io::BufRead;
use vitals_rs::{parse_line, Reading};

#[derive(Serialize)]
struct ParseOutput {
    total_lines: usize,
    skipped: usize,
    readings: Vec<Reading>,
}

pub fn execute(args: ParseArgs) -> i32 {
    if let Some(line) = &args.line {
        return match parse_line(line) {
            Some(reading) => emit(&reading, &args),
            None => {
                eprintln!("Error: Unrecognized line: {}", line.trim());
                exit_codes::INPUT_ERROR
            }
        };
    }

    let lines = match read_lines(args.input.as_deref()) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let result = summarize(&lines);
    if result.skipped > 0 {
        log::info!("Skipped {} unrecognized lines", result.skipped);
    }
    emit(&result, &args)
}

fn summarize(lines: &[String]) -> ParseOutput {
    let non_empty: Vec<&String> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
    let readings: Vec<Reading> = non_empty.iter().filter_map(|l| parse_line(l)).collect();
    ParseOutput {
        total_lines: non_empty.len(),
        skipped: non_empty.len() - readings.len(),
        readings,
    }
}

fn read_lines(input: Option<&str>) -> Result<Vec<String>, String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .map(|text| text.lines().map(str::to_string).collect())
            .map_err(|e| format!("Failed to read '{}': {}", path, e)),
        None => std::io::stdin()
            .lock()
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Failed to read stdin: {}", e)),
    }
}

fn emit<T: Serialize>(value: &T, args: &ParseArgs) -> i32 {
    match output::to_json(value, args.compact) {
        Ok(json) => match output::write_output(&json, args.output.as_deref()) {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                exit_codes::EXECUTION_ERROR
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
