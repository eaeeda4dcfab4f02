//! TAM interpreter.
//!
//! Loads an object program and runs it on the Triangle Abstract Machine.
//!
//! # Usage
//! ```text
//! tam [OPTIONS] [file]
//! ```
//!
//! # Arguments
//! - `file`: Object program to run (defaults to `obj.tam`)
//!
//! # Options
//! - `--trace`: Log every executed instruction
//! - `--no-banner`: Do not print the banner line
//!
//! The program reads standard input and writes standard output. When it stops, the final
//! status is printed, followed by a dump of the data store if it did not halt normally.
//!
//! An object file with no instructions is loaded but not run, and no status is printed.
//!
//! # Exit codes
//! - `0`: the program halted normally, or there was nothing to run
//! - `1`: bad arguments, or the object program could not be loaded
//! - `2`: the program failed

use std::env;
use std::io::{self, Write};
use std::process;
use tam::utils::log::{self, Level};
use tam::virtual_machine::status::Status;
use tam::virtual_machine::vm::Machine;
use tam::{error, info};

const DEFAULT_OBJECT_FILE: &str = "obj.tam";
const BANNER: &str = "********** TAM Interpreter (Rust Version) **********";

fn main() {
    log::init_from_env();

    let args: Vec<String> = env::args().collect();

    let mut object_path: Option<&str> = None;
    let mut trace = false;
    let mut banner = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            "--trace" => {
                trace = true;
                i += 1;
            }
            "--no-banner" => {
                banner = false;
                i += 1;
            }
            other if other.starts_with('-') => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if object_path.is_some() {
                    error!("Only one object file may be given, found extra: {}\n", path);
                    print_usage(&args[0]);
                    process::exit(1);
                }
                object_path = Some(path);
                i += 1;
            }
        }
    }

    let object_path = object_path.unwrap_or(DEFAULT_OBJECT_FILE);

    if banner {
        println!("{BANNER}");
    }

    if trace && log::min_level() > Level::Debug {
        log::set_min_level(Level::Debug);
    }

    let mut machine = Machine::with_std_console();
    machine.set_trace(trace);

    if let Err(e) = machine.load_file(object_path) {
        error!("Failed to load object program: {}", e);
        process::exit(1);
    }
    if !machine.is_loaded() {
        info!("{} holds no instructions, nothing to run", object_path);
        return;
    }
    info!(
        "Loaded {} ({} instructions)",
        object_path,
        machine.registers().ct
    );

    let status = machine.run();

    let mut stdout = io::stdout().lock();
    if let Err(e) = stdout
        .write_all(machine.report().as_bytes())
        .and_then(|()| stdout.flush())
    {
        error!("Failed to write report: {}", e);
        process::exit(1);
    }

    process::exit(match status {
        Status::Halted => 0,
        Status::Running | Status::Failed(_) => 2,
    });
}

const USAGE: &str = "\
TAM Interpreter

USAGE:
    {program} [OPTIONS] [file]

ARGS:
    [file]    Object program to run (defaults to obj.tam)

OPTIONS:
    --trace        Log every executed instruction to stderr
    --no-banner    Do not print the banner line
    -h, --help     Print this help message

ENVIRONMENT:
    TAM_LOG        Minimum log level: debug, info, warn or error (defaults to info)

EXAMPLES:
    # Run obj.tam from the current directory
    {program}

    # Run a program and trace its execution
    {program} --trace program.tam
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
