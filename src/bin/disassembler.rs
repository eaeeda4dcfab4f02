//! TAM disassembler CLI.
//!
//! Prints an object program in assembly notation, one `address: instruction` line each.
//!
//! # Usage
//! ```text
//! disassembler [file]
//! ```
//!
//! # Arguments
//! - `file`: Object program to read (defaults to `obj.tam`)

use std::env;
use std::process;
use tam::utils::log;
use tam::virtual_machine::assembler::disassemble;
use tam::virtual_machine::program::load_object_file;
use tam::{error, info};

const DEFAULT_OBJECT_FILE: &str = "obj.tam";

fn main() {
    log::init_from_env();

    let args: Vec<String> = env::args().collect();

    if args.len() > 2 {
        error!("Unexpected argument: {}\n", args[2]);
        print_usage(&args[0]);
        process::exit(1);
    }

    let path = match args.get(1).map(String::as_str) {
        Some("--help" | "-h") => {
            print_usage(&args[0]);
            process::exit(0);
        }
        Some(path) => path,
        None => DEFAULT_OBJECT_FILE,
    };

    let program = match load_object_file(path) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to load object program: {}", e);
            process::exit(1);
        }
    };

    print!("{}", disassemble(&program));
}

const USAGE: &str = "\
TAM Disassembler

USAGE:
    {program} [file]

ARGS:
    [file]    Object program to disassemble (defaults to obj.tam)
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
