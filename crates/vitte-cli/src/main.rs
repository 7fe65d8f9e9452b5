//! `vitte` — the unified VitteLight toolchain driver.
//!
//! Parses arguments and initializes logging/color, then delegates to
//! `vitte_cli::execute` for the real work (§6.4).

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use vitte_cli as cli;

#[derive(Debug, Parser)]
#[command(name = "vitte", version, about = "VitteLight bytecode toolchain: compile, link, inspect")]
struct Opt {
    /// Force color output on or off; `auto` follows the terminal.
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    /// Colorize only when stdout looks like a terminal.
    Auto,
    /// Always colorize.
    Always,
    /// Never colorize.
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assemble a `.asm` source into a `.vlbc` module.
    Compile {
        /// Source path, or `-` for stdin.
        input: String,
        /// Output path (defaults to `<stem>.vlbc`).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge `.asm`/`.vlbc` inputs into one `.vlbc` module.
    #[command(alias = "build")]
    Link {
        /// Input paths, in link order.
        inputs: Vec<PathBuf>,
        /// Output path for the merged module.
        #[arg(short, long)]
        output: PathBuf,
        /// Write a `.map` file describing the per-input pool-index remap.
        #[arg(long)]
        map: Option<PathBuf>,
        /// Write the merged module's disassembly to this file.
        #[arg(long)]
        disasm: Option<PathBuf>,
    },
    /// Print a module's header summary, string pool and disassembly.
    Inspect {
        /// Module path, or `-` for stdin.
        input: String,
        /// List only the string pool.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        strings: bool,
        /// Append a hexdump of the raw module bytes.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        hexdump: bool,
    },
    /// Print the tool's version banner (same information as `--version`).
    Version,
    /// Print this help message (same information as `--help`).
    Help,
}

fn init_color(choice: ColorChoice) {
    match choice {
        ColorChoice::Auto => {},
        ColorChoice::Always => {
            std::env::set_var("CLICOLOR_FORCE", "1");
            std::env::remove_var("NO_COLOR");
        },
        ColorChoice::Never => {
            std::env::set_var("NO_COLOR", "1");
            std::env::remove_var("CLICOLOR_FORCE");
        },
    }
}

fn main() -> ExitCode {
    let opt = Opt::parse();
    init_color(opt.color);
    cli::init_logger();

    let command = match opt.cmd {
        Command::Compile { input, output } => cli::Command::Compile { input, out: output },
        Command::Link { inputs, output, map, disasm } => {
            cli::Command::Link { inputs, out: output, map, disasm }
        },
        Command::Inspect { input, strings, hexdump } => {
            cli::Command::Inspect { input, strings, hexdump }
        },
        Command::Version => cli::Command::Version,
        Command::Help => {
            use clap::CommandFactory;
            Opt::command().print_help().ok();
            return ExitCode::SUCCESS;
        },
    };

    match cli::execute(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        },
    }
}
