//! Local extractor backed by a yt-dlp compatible executable

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::ResolutionError;
use crate::messages::ResolvedLinks;

/// Runs `{bin} {args...} {url}` and reads one link per stdout line
#[derive(Debug, Clone)]
pub struct YtdlExtractor {
    bin: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    url: String,
}

impl YtdlExtractor {
    pub fn new(
        bin: impl Into<PathBuf>,
        args: Vec<String>,
        timeout: Duration,
        url: impl Into<String>,
    ) -> Self {
        Self {
            bin: bin.into(),
            args,
            timeout,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn resolve(&self) -> Result<ResolvedLinks, ResolutionError> {
        debug!(bin = %self.bin.display(), url = %self.url, "Running extractor");

        let mut command = Command::new(&self.bin);
        command
            .args(&self.args)
            .arg(&self.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| ResolutionError::Spawn(format!("{}: {}", self.bin.display(), e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ResolutionError::Timeout(self.timeout))?
            .map_err(|e| ResolutionError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(ResolutionError::Extractor {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let links = parse_links(&String::from_utf8_lossy(&output.stdout));
        debug!(count = links.len(), "Extractor finished");

        ResolvedLinks::new(links).ok_or(ResolutionError::NoLinks)
    }
}

fn parse_links(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
