//! TAM assembler CLI.
//!
//! Reads TAM assembly source and writes an object program the interpreter can load.
//!
//! # Usage
//! ```text
//! assembler <input.tasm> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.tasm`: Assembly source file to assemble
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.tam`)
//! - `-l, --listing`: Print the assembled program, one instruction per line
//!
//! # Examples
//! ```text
//! assembler program.tasm
//! assembler program.tasm -o obj.tam
//! ```

use std::env;
use std::path::Path;
use std::process;
use tam::utils::log;
use tam::virtual_machine::assembler::{assemble_file, disassemble};
use tam::virtual_machine::program::{RECORD_SIZE, write_object_file};
use tam::{error, info};

fn main() {
    log::init_from_env();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut listing = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--listing" | "-l" => {
                listing = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| {
        let p = Path::new(input_path);
        let stem = p.file_stem().unwrap_or_default().to_string_lossy();
        let parent = p.parent().unwrap_or(Path::new("."));
        parent
            .join(format!("{}.tam", stem))
            .to_string_lossy()
            .into_owned()
    });

    if let Some(parent) = Path::new(&output_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    let program = match assemble_file(input_path) {
        Ok(p) => p,
        Err(e) => {
            error!("Assembly failed: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_object_file(&output_path, &program) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    info!(
        "Assembled {} -> {} ({} instructions, {} bytes)",
        input_path,
        output_path,
        program.len(),
        program.len() * RECORD_SIZE
    );

    if listing {
        print!("{}", disassemble(&program));
    }
}

const USAGE: &str = "\
TAM Assembler

USAGE:
    {program} <input.tasm> [OPTIONS]

ARGS:
    <input.tasm>    Assembly source file to assemble

OPTIONS:
    -o, --output <file>    Output file path (defaults to <input>.tam)
    -l, --listing          Print the assembled program
    -h, --help             Print this help message

EXAMPLES:
    # Assemble to the default output name
    {program} program.tasm

    # Assemble to the interpreter's default object file
    {program} program.tasm -o obj.tam
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
