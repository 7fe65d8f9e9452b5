//! `vitte-disasm`: inspect/disassemble `.vlbc` modules (§4.6, §6.4).
//!
//! ```text
//! vitte-disasm a.vlbc
//! cat a.vlbc | vitte-disasm - --stdin-name a.vlbc
//! vitte-disasm a.vlbc --emit a.disasm.txt
//! vitte-disasm a.vlbc --hex
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use vitte_tools::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "vitte-disasm", version, about = "Disassemble/inspect VLBC modules")]
struct Cli {
    /// Input file, or `-` for stdin.
    input: String,

    /// Logical name to report when the input is `-` (stdin).
    #[arg(long, default_value = "<stdin>")]
    stdin_name: String,

    /// Write the disassembly to this file instead of stdout.
    #[arg(long)]
    emit: Option<PathBuf>,

    /// Also print a hexdump of the raw module bytes.
    #[arg(long, action = ArgAction::SetTrue)]
    hex: bool,

    /// Print how long loading/disassembly took.
    #[arg(long, action = ArgAction::SetTrue)]
    time: bool,
}

fn main() -> ExitCode {
    match real_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        },
    }
}

fn real_main() -> Result<()> {
    vitte_tools::init_tracing();
    let cli = Cli::parse();
    let timer = Timer::start();

    let bytes = if cli.input == "-" {
        read_stdin_to_bytes()?
    } else {
        read_bytes(&Utf8PathBuf::from(&cli.input))?
    };

    let module =
        Module::from_bytes(&bytes).map_err(|e| anyhow!("{}: {e}", display_input(&cli)))?;

    let mut report = inspect(&module)?;
    if cli.hex {
        report.push_str("\n.raw\n");
        report.push_str(&hexdump(&bytes, 0));
    }

    if let Some(path) = &cli.emit {
        write_text_atomic(&to_utf8(path.clone())?, &report)?;
    } else {
        println!("{report}");
    }
    if cli.time {
        eprintln!("{}", timer.pretty());
    }

    Ok(())
}

fn display_input(cli: &Cli) -> &str {
    if cli.input == "-" {
        &cli.stdin_name
    } else {
        &cli.input
    }
}
