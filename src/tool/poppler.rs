//! Poppler backend: `pdfinfo`, `pdftotext` and `pdftoppm` as subprocesses.
//!
//! Every call is a fresh `tokio::process::Command`, so concurrent page tasks
//! never share process state. Children are spawned with `kill_on_drop`, which
//! is what makes the optional timeout effective: when the timeout future wins
//! the race, the `output()` future is dropped and the child is killed.

use super::{png_path, DocumentTool, ToolError};
use crate::config::PipelineConfig;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const PDFINFO: &str = "pdfinfo";
const PDFTOTEXT: &str = "pdftotext";
const PDFTOPPM: &str = "pdftoppm";

static RE_PAGES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^Pages:\s+(\S+)\s*$").unwrap());

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// [`DocumentTool`] backed by the poppler-utils command line programs.
#[derive(Debug, Clone)]
pub struct PopplerTool {
    bin_dir: Option<PathBuf>,
    dpi: u32,
    timeout: Option<Duration>,
}

impl Default for PopplerTool {
    fn default() -> Self {
        Self {
            bin_dir: None,
            dpi: 150,
            timeout: None,
        }
    }
}

impl PopplerTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tool from the pipeline settings (`poppler_dir`, `dpi`,
    /// `tool_timeout_secs`).
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            bin_dir: config.poppler_dir.clone(),
            dpi: config.dpi,
            timeout: config.tool_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Look the binaries up in `dir` instead of `$PATH`.
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Kill any single invocation that runs longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    fn program(&self, tool: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        }
    }

    fn raster_args(&self) -> Vec<OsString> {
        vec!["-png".into(), "-r".into(), self.dpi.to_string().into()]
    }

    /// Run `tool` to completion and return its stdout.
    async fn run(&self, tool: &str, args: Vec<OsString>) -> Result<Vec<u8>, ToolError> {
        debug!("Running {} {:?}", tool, args);

        let mut cmd = Command::new(self.program(tool));
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| ToolError::Timeout {
                    tool: tool.to_string(),
                    secs: limit.as_secs(),
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| ToolError::Launch {
            tool: tool.to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl DocumentTool for PopplerTool {
    fn name(&self) -> &'static str {
        "poppler"
    }

    async fn page_count(&self, document: &Path) -> Result<usize, ToolError> {
        let stdout = self.run(PDFINFO, vec![document.into()]).await?;
        parse_page_count(&String::from_utf8_lossy(&stdout))
    }

    async fn extract_text(&self, document: &Path, page: usize) -> Result<String, ToolError> {
        let page = page.to_string();
        let args: Vec<OsString> = vec![
            "-f".into(),
            page.clone().into(),
            "-l".into(),
            page.into(),
            "-enc".into(),
            "UTF-8".into(),
            document.into(),
            "-".into(),
        ];
        let stdout = self.run(PDFTOTEXT, args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn rasterize_all(
        &self,
        document: &Path,
        out_dir: &Path,
        prefix: &str,
    ) -> Result<(), ToolError> {
        let mut args = self.raster_args();
        args.push(document.into());
        args.push(out_dir.join(prefix).into());
        self.run(PDFTOPPM, args).await?;
        Ok(())
    }

    async fn rasterize_page_to_file(
        &self,
        document: &Path,
        page: usize,
        out_stem: &Path,
    ) -> Result<PathBuf, ToolError> {
        let mut args = self.raster_args();
        args.extend(single_page_args(page));
        args.push(document.into());
        args.push(out_stem.into());
        self.run(PDFTOPPM, args).await?;

        let path = png_path(out_stem);
        if !path.exists() {
            return Err(ToolError::InvalidOutput {
                tool: PDFTOPPM.to_string(),
                detail: format!("expected output file '{}' was not written", path.display()),
            });
        }
        Ok(path)
    }

    async fn rasterize_page(&self, document: &Path, page: usize) -> Result<Vec<u8>, ToolError> {
        // No output root: pdftoppm writes the single image to stdout.
        let mut args = self.raster_args();
        args.extend(single_page_args(page));
        args.push(document.into());
        let bytes = self.run(PDFTOPPM, args).await?;

        if !bytes.starts_with(PNG_SIGNATURE) {
            return Err(ToolError::InvalidOutput {
                tool: PDFTOPPM.to_string(),
                detail: format!("page {page}: stdout is not a PNG ({} bytes)", bytes.len()),
            });
        }
        Ok(bytes)
    }
}

fn single_page_args(page: usize) -> Vec<OsString> {
    let page = page.to_string();
    vec![
        "-f".into(),
        page.clone().into(),
        "-l".into(),
        page.into(),
        "-singlefile".into(),
    ]
}

/// Pull the `Pages:` field out of `pdfinfo` output.
pub(crate) fn parse_page_count(info: &str) -> Result<usize, ToolError> {
    let raw = RE_PAGES
        .captures(info)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ToolError::InvalidOutput {
            tool: PDFINFO.to_string(),
            detail: "no 'Pages:' line".to_string(),
        })?;

    raw.parse::<usize>().map_err(|_| ToolError::InvalidOutput {
        tool: PDFINFO.to_string(),
        detail: format!("non-numeric page count '{raw}'"),
    })
}
