//! vitte-cli — internal library backing the `vitte` binary.
//!
//! `main.rs` only parses arguments and calls [`execute`]; all the actual
//! work (assembling, linking, inspecting) is delegated to `vitte_vitbc`
//! through `vitte_tools`'s shared I/O plumbing, so the command surface stays
//! a thin adapter over the toolchain core (§6.4).

#![forbid(unsafe_code)]
#![deny(unused_must_use)]

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use camino::Utf8PathBuf;

use vitte_tools::{
    default_out_path, read_bytes, read_stdin_to_bytes, read_stdin_to_string, read_text, to_utf8,
    write_bytes_atomic, write_text_atomic,
};
use vitte_vitbc::{assemble, hexdump, inspect as inspect_module, link, render_map, LinkError, Module};

/// A parsed, ready-to-run `vitte` subcommand.
#[derive(Clone, Debug)]
pub enum Command {
    /// Assemble one `.asm` source into a `.vlbc` module.
    Compile {
        /// Source path, or `-` for stdin.
        input: String,
        /// Output path; defaults to the input's stem with a `.vlbc`
        /// extension (`out.vlbc` when reading from stdin).
        out: Option<PathBuf>,
    },
    /// Merge `.asm`/`.vlbc` inputs into one `.vlbc` module, in link order.
    /// Also reachable as `build`, an alias with identical semantics.
    Link {
        /// Input paths, in link order.
        inputs: Vec<PathBuf>,
        /// Output path for the merged module.
        out: PathBuf,
        /// Optional `.map` file describing the per-input pool-index remap.
        map: Option<PathBuf>,
        /// Optional path to write the merged module's disassembly to.
        disasm: Option<PathBuf>,
    },
    /// Print a module's header summary, string pool and disassembly.
    Inspect {
        /// Module path, or `-` for stdin.
        input: String,
        /// List only the string pool.
        strings: bool,
        /// Append a hexdump of the raw module bytes.
        hexdump: bool,
    },
    /// Print the tool's version banner.
    Version,
}

fn load_input(path: &str) -> Result<Module> {
    if path == "-" {
        let bytes = read_stdin_to_bytes()?;
        return Module::from_bytes(&bytes).map_err(|e| anyhow!("<stdin>: {e}"));
    }
    let utf8 = Utf8PathBuf::from(path);
    match utf8.extension() {
        Some("asm") => {
            let src = read_text(&utf8)?;
            assemble(&src).map_err(|errs| format_diagnostics(&utf8.to_string(), &errs))
        },
        Some("vlbc") => {
            let bytes = read_bytes(&utf8)?;
            Module::from_bytes(&bytes).map_err(|e| anyhow!("{utf8}: {e}"))
        },
        _ => Err(LinkError::UnsupportedInputFormat { path: utf8.to_string() }.into()),
    }
}

fn format_diagnostics(name: &str, errs: &[vitte_vitbc::AsmError]) -> anyhow::Error {
    let mut msg = format!("{name}: {} diagnostic(s)", errs.len());
    for e in errs {
        msg.push_str(&format!("\n  {e}"));
    }
    anyhow!(msg)
}

/// Run a parsed command, printing to stdout/stderr as each one dictates.
///
/// # Errors
/// Returns an error on malformed input, a failed assembly/link, or an I/O
/// failure while reading or writing a file.
pub fn execute(command: Command) -> Result<()> {
    match command {
        Command::Compile { input, out } => compile(&input, out),
        Command::Link { inputs, out, map, disasm } => {
            link_cmd(&inputs, &out, map.as_deref(), disasm.as_deref())
        },
        Command::Inspect { input, strings, hexdump: show_hex } => {
            inspect_cmd(&input, strings, show_hex)
        },
        Command::Version => {
            println!("{}", vitte_tools::version_banner("vitte"));
            Ok(())
        },
    }
}

fn compile(input: &str, out: Option<PathBuf>) -> Result<()> {
    let src =
        if input == "-" { read_stdin_to_string()? } else { read_text(&Utf8PathBuf::from(input))? };
    let module = assemble(&src).map_err(|errs| format_diagnostics(input, &errs))?;

    let out_path = match out {
        Some(p) => to_utf8(p)?,
        None if input == "-" => Utf8PathBuf::from("out.vlbc"),
        None => default_out_path(&Utf8PathBuf::from(input), "vlbc"),
    };
    write_bytes_atomic(&out_path, &module.to_bytes())?;
    status_ok("compiled", &out_path.to_string());
    Ok(())
}

fn link_cmd(
    inputs: &[PathBuf],
    out: &PathBuf,
    map: Option<&std::path::Path>,
    disasm: Option<&std::path::Path>,
) -> Result<()> {
    if inputs.is_empty() {
        return Err(anyhow!("link needs at least one input"));
    }
    let named: Vec<(String, Module)> = inputs
        .iter()
        .map(|p| {
            let name = p.to_string_lossy().into_owned();
            load_input(&name).map(|m| (name, m))
        })
        .collect::<Result<_>>()?;

    let (merged, report) = link(&named).map_err(anyhow::Error::from)?;
    let out_utf8 = to_utf8(out.clone())?;
    write_bytes_atomic(&out_utf8, &merged.to_bytes())?;
    status_ok("linked", &out_utf8.to_string());

    if let Some(map_path) = map {
        write_text_atomic(&to_utf8(map_path.to_path_buf())?, &render_map("vitte", &report))?;
    }
    if let Some(disasm_path) = disasm {
        write_text_atomic(&to_utf8(disasm_path.to_path_buf())?, &inspect_module(&merged)?)?;
    }
    Ok(())
}

fn inspect_cmd(input: &str, strings_only: bool, show_hexdump: bool) -> Result<()> {
    let bytes = if input == "-" { read_stdin_to_bytes()? } else { read_bytes(&Utf8PathBuf::from(input))? };
    let module = Module::from_bytes(&bytes).map_err(|e| anyhow!("{input}: {e}"))?;

    let mut report = if strings_only {
        vitte_vitbc::disassemble_pool(&module.strings)
    } else {
        inspect_module(&module)?
    };
    if show_hexdump {
        report.push_str("\n.raw\n");
        report.push_str(&hexdump(&bytes, 0));
    }
    println!("{report}");
    Ok(())
}

fn status_ok(tag: &str, msg: &str) {
    #[cfg(feature = "trace")]
    log::info!("{tag} {msg}");
    #[cfg(feature = "color")]
    {
        use owo_colors::OwoColorize;
        eprintln!("{} {msg}", tag.green().bold());
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{tag} {msg}");
    }
}

/// Initialize `env_logger` from `RUST_LOG`, when the `trace` feature is on.
pub fn init_logger() {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .format_timestamp_secs()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch_dir() -> Utf8PathBuf {
        let dir = std::env::temp_dir().join(format!("vitte-cli-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        to_utf8(dir).unwrap()
    }

    #[test]
    fn compile_then_inspect_roundtrips() {
        let dir = scratch_dir();
        let src_path = dir.join("a.asm");
        std::fs::write(&src_path, "PUSHI 1\nHALT\n").unwrap();
        let out_path = dir.join("a.vlbc");

        compile(src_path.as_str(), Some(out_path.clone().into_std_path_buf())).unwrap();
        assert!(out_path.exists());

        let module = load_input(out_path.as_str()).unwrap();
        assert_eq!(module.code_len(), 10);
    }

    #[test]
    fn link_rejects_empty_input_list() {
        let dir = scratch_dir();
        let err = link_cmd(&[], &dir.join("out.vlbc").into_std_path_buf(), None, None).unwrap_err();
        assert!(err.to_string().contains("needs at least one input"));
    }

    #[test]
    fn link_rejects_unsupported_extension() {
        let dir = scratch_dir();
        let bogus = dir.join("notes.txt");
        std::fs::write(&bogus, "hello").unwrap();
        let err = link_cmd(
            &[bogus.into_std_path_buf()],
            &dir.join("out.vlbc").into_std_path_buf(),
            None,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported input format"));
    }

    #[test]
    fn inspect_strings_only_omits_code_section() {
        let dir = scratch_dir();
        let src = dir.join("a.asm");
        std::fs::write(&src, "PUSHS \"hi\"\nPOP\nHALT\n").unwrap();
        let out = dir.join("a.vlbc");
        compile(src.as_str(), Some(out.clone().into_std_path_buf())).unwrap();

        inspect_cmd(out.as_str(), true, false).unwrap();
    }

    #[test]
    fn link_two_asm_inputs_produces_a_module() {
        let dir = scratch_dir();
        let a = dir.join("a.asm");
        let b = dir.join("b.asm");
        std::fs::write(&a, "PUSHI 1\nHALT\n").unwrap();
        std::fs::write(&b, "PUSHI 2\nHALT\n").unwrap();
        let out = dir.join("linked.vlbc");

        link_cmd(
            &[a.into_std_path_buf(), b.into_std_path_buf()],
            &out.clone().into_std_path_buf(),
            None,
            None,
        )
        .unwrap();

        let module = load_input(out.as_str()).unwrap();
        assert_eq!(module.code_len(), 20);
    }
}
