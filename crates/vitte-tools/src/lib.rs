//! vitte-tools — shared plumbing for the `vitte-asm`/`vitte-link`/`vitte-disasm`
//! binaries (§6.4 of the specification).
//!
//! ## Modules
//! - `prelude`  : quick-import surface for the bin crates
//! - I/O        : `read_text`, `read_bytes`, `read_stdin_*`, `write_text_atomic`, `write_bytes_atomic`
//! - Time       : `Timer`, `human_millis`
//! - Colors     : `ColorMode`, `setup_colors`
//!
//! These functions favor `anyhow::Result` at this layer — the real error
//! taxonomy lives in `vitte-vitbc`; this crate only adapts it to the
//! filesystem and the terminal.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

pub use vitte_vitbc::{
    assemble, disassemble_code, disassemble_pool, hexdump, inspect, link, render_map, AsmError,
    LinkError, LinkInput, LinkReport, LoadError, Module,
};

/// Readable version string, inherited by every bin crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short version banner useful in logs/tool output.
#[must_use]
pub fn version_banner(tool: &str) -> String {
    format!("{tool} — vitte-tools {VERSION}")
}

/// Initialize a `tracing-subscriber` `fmt` layer from `RUST_LOG` (default
/// `warn`), so the structured spans `vitte-vitbc` emits around
/// assemble/link/inspect (§4.7's ambient logging) surface on stderr for the
/// standalone `vitte-asm`/`vitte-link`/`vitte-disasm` binaries. A no-op
/// without the `tracing` feature.
pub fn init_tracing() {
    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

/// Convenient re-export surface for the bin crates.
pub mod prelude {
    pub use anyhow::{anyhow, Context, Result};
    pub use camino::{Utf8Path, Utf8PathBuf};
    pub use std::path::PathBuf;

    pub use crate::{
        default_filename_with_ext, default_out_path, human_millis, init_tracing, read_bytes,
        read_stdin_to_bytes, read_stdin_to_string, read_text, to_utf8, version_banner,
        write_bytes_atomic, write_text_atomic, ColorMode, Timer,
    };
    pub use vitte_vitbc::{assemble, disassemble_code, hexdump, inspect, link, render_map, Module};
}

/* ------------------------------------------------------------------------- */
/* I/O utils                                                                  */
/* ------------------------------------------------------------------------- */

/// Read a UTF-8 text file.
pub fn read_text(path: &Utf8Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {path}"))
}

/// Read a binary file.
pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading {path}"))
}

/// Read all of `stdin` as a UTF-8 string.
pub fn read_stdin_to_string() -> Result<String> {
    let mut s = String::new();
    io::stdin().read_to_string(&mut s)?;
    Ok(s)
}

/// Read all of `stdin` as raw bytes.
pub fn read_stdin_to_bytes() -> Result<Vec<u8>> {
    let mut v = Vec::new();
    io::stdin().read_to_end(&mut v)?;
    Ok(v)
}

fn unique_tmp_path(dir: &Utf8Path, base: &str) -> Utf8PathBuf {
    dir.join(format!("{base}.tmp.{}", std::process::id()))
}

/// Write text atomically: write to a sibling `<name>.tmp.<pid>`, flush and
/// close, then rename over the destination (§6.4). Creates parent
/// directories as needed.
pub fn write_text_atomic(path: &Utf8Path, s: &str) -> Result<()> {
    write_bytes_atomic(path, s.as_bytes())
}

/// Write bytes atomically (§6.4): same tmp-then-rename contract as
/// [`write_text_atomic`].
pub fn write_bytes_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_str().is_empty()).unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent)?;
    let file_name = path.file_name().ok_or_else(|| anyhow!("output path has no file name: {path}"))?;
    let tmp = unique_tmp_path(parent, file_name);
    {
        let mut f = fs::File::create(&tmp).with_context(|| format!("creating {tmp}"))?;
        f.write_all(bytes)?;
        f.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("renaming {tmp} to {path}"))?;
    Ok(())
}

/// Convert a `PathBuf` into a `Utf8PathBuf` (errors on non-UTF-8 paths).
pub fn to_utf8(p: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(p).map_err(|_| anyhow!("path is not valid UTF-8"))
}

/* ------------------------------------------------------------------------- */
/* Time                                                                       */
/* ------------------------------------------------------------------------- */

/// A simple scoped timer, suitable for `--time` style flags.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start timing now.
    #[must_use]
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Elapsed time since [`Timer::start`].
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time, formatted for humans.
    #[must_use]
    pub fn pretty(&self) -> String {
        human_millis(self.elapsed())
    }
}

/// Human-readable rendering of a duration (ms / s / "m min s.s").
#[must_use]
pub fn human_millis(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        return format!("{ms} ms");
    }
    let s = ms as f64 / 1000.0;
    if s < 60.0 {
        return format!("{s:.3} s");
    }
    let m = (s / 60.0).floor();
    let rest = s - m * 60.0;
    format!("{m:.0} min {rest:.1} s")
}

/* ------------------------------------------------------------------------- */
/* Colors                                                                     */
/* ------------------------------------------------------------------------- */

/// Controls whether CLI output uses ANSI color.
#[derive(Clone, Copy, Debug)]
pub enum ColorMode {
    /// Colorize only if the output stream looks like it supports ANSI.
    Auto,
    /// Always colorize, even if the output doesn't look like a terminal.
    Always,
    /// Never colorize.
    Never,
}

/// Apply `mode` to the global `yansi` painter (a no-op without the `colors`
/// feature).
pub fn setup_colors(mode: ColorMode) {
    #[cfg(feature = "colors")]
    {
        match mode {
            ColorMode::Auto => yansi::whenever(yansi::Condition::DEFAULT),
            ColorMode::Always => yansi::enable(),
            ColorMode::Never => yansi::disable(),
        }
    }
    #[cfg(not(feature = "colors"))]
    {
        let _ = mode;
    }
}

/* ------------------------------------------------------------------------- */
/* Misc                                                                       */
/* ------------------------------------------------------------------------- */

/// Build `<stem>.<ext>` from an input path.
#[must_use]
pub fn default_filename_with_ext(input: &Utf8Path, ext: &str) -> String {
    let stem = input.file_stem().unwrap_or("out");
    format!("{stem}.{ext}")
}

/// Replace an input path's extension with `ext` (no leading dot), e.g.
/// `.vlbc`.
#[must_use]
pub fn default_out_path(input: &Utf8Path, ext: &str) -> Utf8PathBuf {
    input.with_extension(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn human_millis_formats_sub_second() {
        assert_eq!(human_millis(Duration::from_millis(250)), "250 ms");
    }

    #[test]
    fn human_millis_formats_minutes() {
        assert_eq!(human_millis(Duration::from_secs(90)), "1 min 30.0 s");
    }

    #[test]
    fn default_out_path_swaps_extension() {
        let p = Utf8Path::new("prog.asm");
        assert_eq!(default_out_path(p, "vlbc"), Utf8PathBuf::from("prog.vlbc"));
    }

    #[test]
    fn write_bytes_atomic_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("out.vlbc")).unwrap();
        write_bytes_atomic(&path, b"hello").unwrap();
        assert_eq!(read_bytes(&path).unwrap(), b"hello");
    }
}
