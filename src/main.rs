//! Universal Machine - CLI Entry Point
//!
//! Commands:
//! - `um <program>` - Run an image (or an `.asm` file) on stdin/stdout
//! - `um debug <program>` - Interactive debugger
//! - `um asm <source>` - Assemble to an image
//! - `um disasm <image>` - Disassemble an image
//! - `um gen-tests <dir>` - Write the conformance suite to disk
//! - `um self-test` - Run the conformance suite

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use um::cpu::Console;
use um::suite;
use um::{assemble, load_image, save_image, AssemblerError, Cpu, CpuError, ImageError, StdConsole, Word};

#[derive(Parser)]
#[command(name = "um")]
#[command(version)]
#[command(about = "An emulator for the 14-instruction Universal Machine")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Program image to run
    program: Option<PathBuf>,

    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print a JSON run summary to stderr when the program stops
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble source to an image
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output image (default: the source path with a .um extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Path to the image
        image: PathBuf,
    },
    /// Step through a program interactively
    #[cfg(feature = "tui")]
    Debug {
        /// Path to the image or .asm file
        program: PathBuf,
        /// File whose bytes are fed to `in`
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Write the conformance suite as .um/.0/.1 files
    GenTests {
        /// Directory to write into (created if missing)
        dir: PathBuf,
    },
    /// Run the conformance suite in-process
    SelfTest,
}

/// Everything that can end the CLI with exit status 1.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Assembly(#[from] AssemblerError),

    #[error(transparent)]
    Machine(#[from] CpuError),

    #[error(transparent)]
    Suite(#[from] suite::SuiteError),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0} conformance case(s) failed")]
    SelfTest(usize),
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Asm { source, output }) => assemble_file(&source, output),
        Some(Commands::Disasm { image }) => disassemble_file(&image),
        #[cfg(feature = "tui")]
        Some(Commands::Debug { program, input }) => debug_program(&program, input.as_deref()),
        Some(Commands::GenTests { dir }) => generate_tests(&dir),
        Some(Commands::SelfTest) => run_self_test(),
        None => match cli.program {
            Some(program) => run_program(&program, cli.stats),
            None => Cli::command()
                .error(
                    ErrorKind::MissingRequiredArgument,
                    "a program image or a subcommand is required",
                )
                .exit(),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr; stdout belongs to the running program.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Load a program: `.asm` files are assembled, anything else is an image.
fn load_program(path: &Path) -> Result<Vec<Word>, CliError> {
    if path.extension().is_some_and(|ext| ext == "asm") {
        let source = read_source(path)?;
        let words = assemble(&source)?;
        tracing::info!(path = %path.display(), words = words.len(), "assembled program");
        Ok(words)
    } else {
        Ok(load_image(path)?)
    }
}

fn read_source(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn run_program(path: &Path, stats: bool) -> Result<(), CliError> {
    let program = load_program(path)?;
    let mut cpu = Cpu::new(program);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut console = StdConsole::new(stdin.lock(), BufWriter::new(stdout.lock()));

    let result = cpu.run(&mut console);
    // Output written before a fault still reaches stdout
    let flushed = console.flush();

    if stats {
        match serde_json::to_string(&cpu.stats()) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => tracing::warn!(%e, "could not serialize run stats"),
        }
    }

    let cycles = result?;
    flushed?;
    tracing::info!(cycles, "program halted");
    Ok(())
}

#[cfg(feature = "tui")]
fn debug_program(path: &Path, input: Option<&Path>) -> Result<(), CliError> {
    let program = load_program(path)?;
    let input = match input {
        Some(input) => std::fs::read(input).map_err(|source| CliError::File {
            path: input.to_path_buf(),
            source,
        })?,
        None => Vec::new(),
    };

    um::run_debugger(program, input)?;
    Ok(())
}

fn assemble_file(source_path: &Path, output: Option<PathBuf>) -> Result<(), CliError> {
    let out_path = output.unwrap_or_else(|| source_path.with_extension("um"));

    let source = read_source(source_path)?;
    let words = assemble(&source)?;
    save_image(&out_path, &words)?;

    println!(
        "✓ Assembled {} words: {} → {}",
        words.len(),
        source_path.display(),
        out_path.display()
    );
    Ok(())
}

fn disassemble_file(image_path: &Path) -> Result<(), CliError> {
    let words = load_image(image_path)?;
    print!("{}", um::disassemble(&words));
    Ok(())
}

fn generate_tests(dir: &Path) -> Result<(), CliError> {
    let cases = suite::cases()?;
    suite::write_suite(dir, &cases)?;
    println!("✓ Wrote {} cases to {}", cases.len(), dir.display());
    Ok(())
}

fn run_self_test() -> Result<(), CliError> {
    println!("━━━ Universal Machine Self-Test ━━━");
    println!();

    let outcomes: Vec<_> = suite::cases()?.iter().map(suite::run_case).collect();
    println!("{}", suite::report(&outcomes));

    let failed = outcomes.iter().filter(|o| !o.passed).count();
    if failed > 0 {
        return Err(CliError::SelfTest(failed));
    }

    println!("✓ All tests passed!");
    Ok(())
}
