use bbb::cpu::Cpu;
use bbb::host::HeadlessBridge;
use bbb::memory::{Memory, DEFAULT_SIZE};
use bbb::{assembler, image};
use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about, long_about = None, disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a source file into a binary image
    Assemble(AssembleArgs),
    /// Hex-dump an image's header and program bytes
    Inspect(InspectArgs),
    /// Load an image into a fresh machine and run it to completion
    Run(RunArgs),
}

#[derive(Parser)]
struct AssembleArgs {
    source: PathBuf,
    image: PathBuf,
    /// Raise logging verbosity (equivalent to RUST_LOG=debug)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser)]
struct InspectArgs {
    image: PathBuf,
}

#[derive(Parser)]
struct RunArgs {
    image: PathBuf,
    /// Raise logging verbosity (equivalent to RUST_LOG=debug)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Assemble(args) => args.verbose,
        Commands::Run(args) => args.verbose,
        Commands::Inspect(_) => false,
    };
    if verbose && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    let result = match cli.command {
        Commands::Assemble(args) => run_assemble(&args),
        Commands::Inspect(args) => run_inspect(&args),
        Commands::Run(args) => run_run(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn run_assemble(args: &AssembleArgs) -> Result<(), String> {
    let source = fs::read_to_string(&args.source)
        .map_err(|e| format!("failed to read {}: {}", args.source.display(), e))?;
    let file = args.source.display().to_string();

    match assembler::assemble_source(&source, &file) {
        Ok(bytes) => {
            image::write_image(&args.image, &bytes)
                .map_err(|e| format!("failed to write {}: {}", args.image.display(), e))?;
            log::info!("wrote {} bytes to {}", bytes.len(), args.image.display());
            Ok(())
        }
        Err(errors) => {
            for error in &errors {
                eprintln!("{}", error);
            }
            Err(format!("assembly failed with {} error(s)", errors.len()))
        }
    }
}

fn run_inspect(args: &InspectArgs) -> Result<(), String> {
    let bytes = image::read_image(&args.image)
        .map_err(|e| format!("failed to read {}: {}", args.image.display(), e))?;

    let (header, program) = bytes.split_at(image::HEADER_LEN);
    println!("{}", "-- initial register header --".bold());
    for (name, word) in ["pc", "sp", "iv", "ix", "ta"].iter().zip(header.chunks(4)) {
        print!("{} = ", name);
        for nibble in word {
            print_nibble(*nibble);
        }
        println!();
    }

    println!("{}", "-- program/data --".bold());
    for (row, chunk) in program.chunks(16).enumerate() {
        print!("{:04x} │ ", image::HEADER_LEN + row * 16);
        for nibble in chunk {
            print_nibble(*nibble);
            print!(" ");
        }
        println!();
    }
    Ok(())
}

fn print_nibble(nibble: u8) {
    let text = format!("{:x}", nibble & 0xF);
    let styled = match nibble & 0xF {
        0 => text.dimmed(),
        1..=5 => text.blue(),
        6..=10 => text.cyan(),
        _ => text.green(),
    };
    print!("{}", styled);
}

fn run_run(args: &RunArgs) -> Result<(), String> {
    let bytes = image::read_image(&args.image)
        .map_err(|e| format!("failed to read {}: {}", args.image.display(), e))?;

    let mut memory = Memory::new(DEFAULT_SIZE);
    memory.load_image(&bytes);
    let mut cpu = Cpu::new(memory);
    let mut host = HeadlessBridge;
    cpu.run(&mut host);

    log::info!(
        "halted: a={:x} b={:x} c={:x} d={:x} e={:x} f={:x} flags={:#04x}",
        cpu.register(bbb::opcodes::RegisterCode::A),
        cpu.register(bbb::opcodes::RegisterCode::B),
        cpu.register(bbb::opcodes::RegisterCode::C),
        cpu.register(bbb::opcodes::RegisterCode::D),
        cpu.register(bbb::opcodes::RegisterCode::E),
        cpu.register(bbb::opcodes::RegisterCode::F),
        cpu.flags()
    );
    Ok(())
}
