//! `vitte-link`: merge `.asm`/`.vlbc` inputs into one `.vlbc` module (§6.4).
//!
//! ```text
//! vitte-link a.vlbc b.vlbc -o linked.vlbc
//! vitte-link a.asm b.vlbc -o linked.vlbc --map linked.map
//! vitte-link a.vlbc b.vlbc --emit-disasm linked.disasm.txt -o linked.vlbc
//! ```
//!
//! Inputs are linked in the order given on the command line; `.asm` sources
//! are assembled first, `.vlbc` files are loaded as-is.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use vitte_tools::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "vitte-link", version, about = "Link .asm/.vlbc inputs into one VLBC module")]
struct Cli {
    /// Input files, in link order (`.asm` or `.vlbc`).
    inputs: Vec<PathBuf>,

    /// Output path for the merged module.
    #[arg(short, long)]
    out: PathBuf,

    /// Write a `.map` file describing the pool-index remap per input.
    #[arg(long)]
    map: Option<PathBuf>,

    /// Print the disassembly of the merged module to stdout.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    disasm: bool,

    /// Write the disassembly to this file.
    #[arg(long)]
    emit_disasm: Option<PathBuf>,

    /// Print how long linking took.
    #[arg(long, action = clap::ArgAction::SetTrue)]
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

fn load_one(path: &PathBuf) -> Result<(String, Module)> {
    let utf8 = to_utf8(path.clone())?;
    let ext = utf8.extension().unwrap_or_default();
    let module = match ext {
        "asm" => {
            let src = read_text(&utf8)?;
            assemble(&src).map_err(|errs| {
                let mut msg = format!("{utf8}: {} diagnostic(s)", errs.len());
                for e in &errs {
                    msg.push_str(&format!("\n  {e}"));
                }
                anyhow!(msg)
            })?
        },
        "vlbc" => {
            let bytes = read_bytes(&utf8)?;
            Module::from_bytes(&bytes).map_err(|e| anyhow!("{utf8}: {e}"))?
        },
        other => return Err(anyhow!("unsupported input extension `.{other}` for {utf8}")),
    };
    Ok((utf8.to_string(), module))
}

fn real_main() -> Result<()> {
    vitte_tools::init_tracing();
    let cli = Cli::parse();
    if cli.inputs.is_empty() {
        return Err(anyhow!("no input given; example: vitte-link a.vlbc b.vlbc -o out.vlbc"));
    }

    let timer = Timer::start();
    let modules = cli.inputs.iter().map(load_one).collect::<Result<Vec<_>>>()?;
    let (merged, report) = link(&modules).map_err(anyhow::Error::from)?;

    let out = to_utf8(cli.out.clone())?;
    write_bytes_atomic(&out, &merged.to_bytes())?;
    eprintln!("linked: {out}");

    if let Some(map_path) = &cli.map {
        write_text_atomic(&to_utf8(map_path.clone())?, &render_map("vitte-link", &report))?;
    }
    if cli.disasm {
        println!("{}", inspect(&merged)?);
    }
    if let Some(path) = &cli.emit_disasm {
        write_text_atomic(&to_utf8(path.clone())?, &inspect(&merged)?)?;
    }
    if cli.time {
        eprintln!("{}", timer.pretty());
    }

    Ok(())
}
