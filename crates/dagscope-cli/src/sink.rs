//! Output sink: DOT files and optional PNG rendering.
//!
//! Every artifact is written to a temp file in the output directory and
//! atomically promoted onto its final name only on success, so a crash or
//! a failed renderer never leaves a truncated file behind.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, bail};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Writes named captures into one output directory.
#[derive(Debug)]
pub struct Sink {
    out_dir: PathBuf,
    render: bool,
    /// Renderer binary, `dot` in production. Parameterized so tests can
    /// substitute a command that fails.
    renderer: String,
}

impl Sink {
    #[must_use]
    pub fn new(out_dir: PathBuf, render: bool, renderer: impl Into<String>) -> Self {
        Self { out_dir, render, renderer: renderer.into() }
    }

    /// Write `<name>.dot` (and `<name>.png` when rendering is on).
    /// Returns the path of the DOT file.
    ///
    /// # Errors
    ///
    /// I/O failures and renderer failures. A renderer failure leaves the
    /// DOT file in place but no PNG.
    pub fn write(&self, name: &str, dot: &str) -> anyhow::Result<PathBuf> {
        let dot_path = self.out_dir.join(format!("{name}.dot"));

        let mut tmp = NamedTempFile::new_in(&self.out_dir)
            .with_context(|| format!("creating temp file in {}", self.out_dir.display()))?;
        tmp.write_all(dot.as_bytes())
            .with_context(|| format!("writing {}", dot_path.display()))?;
        tmp.persist(&dot_path)
            .with_context(|| format!("promoting {}", dot_path.display()))?;
        debug!(path = %dot_path.display(), bytes = dot.len(), "wrote dot file");

        if self.render {
            let png_path = self.out_dir.join(format!("{name}.png"));
            self.render_png(&dot_path, &png_path)?;
            info!(path = %png_path.display(), "rendered png");
        }

        Ok(dot_path)
    }

    fn render_png(&self, dot_path: &Path, png_path: &Path) -> anyhow::Result<()> {
        let tmp = NamedTempFile::new_in(&self.out_dir)
            .with_context(|| format!("creating temp file in {}", self.out_dir.display()))?;

        let status = Command::new(&self.renderer)
            .arg("-Tpng")
            .arg(dot_path)
            .arg("-o")
            .arg(tmp.path())
            .status()
            .with_context(|| format!("spawning renderer {:?}", self.renderer))?;
        if !status.success() {
            // The temp file drops here, so no partial png survives.
            bail!("renderer {:?} exited with {status}", self.renderer);
        }

        tmp.persist(png_path)
            .with_context(|| format!("promoting {}", png_path.display()))?;
        Ok(())
    }
}
