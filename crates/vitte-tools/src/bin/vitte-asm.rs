//! `vitte-asm`: assemble `.asm` sources into `.vlbc` modules (§6.4).
//!
//! ```text
//! vitte-asm source.asm -o out.vlbc
//! cat source.asm | vitte-asm - --out out.vlbc --disasm
//! vitte-asm a.asm b.asm --out-dir target/ --verify --time
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use vitte_tools::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "vitte-asm", version, about = "Assemble .asm sources into VLBC modules")]
struct Cli {
    /// Source file(s), or `-` for stdin (single input only).
    inputs: Vec<String>,

    /// Output path (only valid with a single input).
    #[arg(short, long, conflicts_with = "out_dir")]
    out: Option<PathBuf>,

    /// Output directory for multiple inputs (keeps `<stem>.vlbc`).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Parse and validate only; write nothing.
    #[arg(long, action = ArgAction::SetTrue)]
    check: bool,

    /// Print the disassembly of the assembled module to stdout.
    #[arg(long, action = ArgAction::SetTrue)]
    disasm: bool,

    /// Write the disassembly to this file.
    #[arg(long)]
    emit_disasm: Option<PathBuf>,

    /// Round-trip the module (serialize, then reload) as an extra check.
    #[arg(long, action = ArgAction::SetTrue)]
    verify: bool,

    /// Logical name to report when the input is `-` (stdin).
    #[arg(long, default_value = "<stdin>")]
    stdin_name: String,

    /// Print how long assembly took.
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
    if cli.inputs.is_empty() {
        return Err(anyhow!("no input given; example: vitte-asm src.asm -o out.vlbc"));
    }

    let use_stdin = cli.inputs.len() == 1 && cli.inputs[0] == "-";
    if use_stdin && cli.out_dir.is_some() {
        return Err(anyhow!("`--out-dir` doesn't apply to stdin input; use `--out`"));
    }
    if cli.inputs.len() > 1 && cli.out.is_some() {
        return Err(anyhow!("with multiple inputs, use `--out-dir` instead of `--out`"));
    }

    for inp in &cli.inputs {
        let (src, in_name) = read_source(inp, &cli.stdin_name)?;
        run_one(&src, &in_name, &cli)?;
    }
    Ok(())
}

fn read_source(input: &str, stdin_name: &str) -> Result<(String, Utf8PathBuf)> {
    if input == "-" {
        Ok((read_stdin_to_string()?, Utf8PathBuf::from(stdin_name)))
    } else {
        let path = Utf8PathBuf::from(input);
        let src = read_text(&path)?;
        Ok((src, path))
    }
}

fn run_one(src: &str, in_name: &Utf8Path, cli: &Cli) -> Result<()> {
    let timer = Timer::start();

    let module = assemble(src).map_err(|errs| {
        let mut msg = format!("{in_name}: {} diagnostic(s)", errs.len());
        for e in &errs {
            msg.push_str(&format!("\n  {e}"));
        }
        anyhow!(msg)
    })?;

    if cli.verify {
        let bytes = module.to_bytes();
        Module::from_bytes(&bytes).map_err(|e| anyhow!("round-trip check failed: {e}"))?;
    }

    if cli.check {
        if cli.disasm {
            println!("{}", inspect(&module)?);
        }
        if let Some(path) = &cli.emit_disasm {
            write_text_atomic(&to_utf8(path.clone())?, &inspect(&module)?)?;
        }
        if cli.time {
            eprintln!("{}", timer.pretty());
        }
        eprintln!("ok (check-only): {in_name}");
        return Ok(());
    }

    let out_path = if let Some(ref out) = cli.out {
        to_utf8(out.clone())?
    } else if let Some(ref dir) = cli.out_dir {
        to_utf8(dir.clone())?.join(default_filename_with_ext(in_name, "vlbc"))
    } else {
        default_out_path(in_name, "vlbc")
    };

    write_bytes_atomic(&out_path, &module.to_bytes())?;
    eprintln!("assembled: {out_path}");

    if cli.disasm {
        println!("{}", inspect(&module)?);
    }
    if let Some(path) = &cli.emit_disasm {
        write_text_atomic(&to_utf8(path.clone())?, &inspect(&module)?)?;
    }
    if cli.time {
        eprintln!("{}", timer.pretty());
    }

    Ok(())
}
