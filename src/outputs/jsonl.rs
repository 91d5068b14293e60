//! JSON Lines output for scrape results.
//!
//! One [`ScrapeResult`] per line. The file is truncated when the sink is
//! created, then every task's results are appended and flushed as soon as
//! that task finishes, so a crash mid-run keeps the completed tasks.

use crate::models::ScrapeResult;
use crate::utils::ensure_writable_dir;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};

#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    file: File,
    written: usize,
}

impl JsonlSink {
    /// Check the parent directory is writable, then create or truncate `path`.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn create(path: &Path) -> Result<Self, Box<dyn Error>> {
        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        if let Err(e) = ensure_writable_dir(parent).await {
            error!(dir = %parent.display(), error = %e, "Output directory is not writable");
            return Err(e);
        }

        let file = File::create(path).await?;
        info!("Opened JSONL output");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: 0,
        })
    }

    /// Append one line per result and flush.
    #[instrument(level = "info", skip_all, fields(results = results.len()))]
    pub async fn write_batch(&mut self, results: &[ScrapeResult]) -> Result<(), Box<dyn Error>> {
        let mut buf = Vec::new();
        for result in results {
            serde_json::to_writer(&mut buf, result)?;
            buf.push(b'\n');
        }
        self.file.write_all(&buf).await?;
        self.file.flush().await?;

        self.written += results.len();
        info!(path = %self.path.display(), total = self.written, "Appended results");
        Ok(())
    }

    /// Results written since the sink was created.
    pub fn written(&self) -> usize {
        self.written
    }
}
