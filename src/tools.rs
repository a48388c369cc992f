use crate::naming;
use anyhow::{Context, Result, anyhow, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Output, Stdio};
use tracing::{info, warn};

pub fn command_from_template(template: &[String], vars: &[(&str, &str)]) -> Result<ProcessCommand> {
    let (program, args) = template
        .split_first()
        .ok_or_else(|| anyhow!("command template is empty"))?;
    if program.trim().is_empty() {
        bail!("command template has an empty program name");
    }

    let mut cmd = ProcessCommand::new(expand(program, vars));
    cmd.args(args.iter().map(|arg| expand(arg, vars)));
    Ok(cmd)
}

fn expand(arg: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(arg.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

fn stderr_tail(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr);
    let tail: Vec<&str> = text.lines().rev().take(3).collect();
    let joined = tail.into_iter().rev().collect::<Vec<_>>().join(" | ");
    if joined.trim().is_empty() {
        format!("exit status {}", output.status)
    } else {
        joined
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Done(PathBuf),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub input: String,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    fn push(&mut self, input: impl Into<String>, outcome: ItemOutcome) {
        self.items.push(BatchItem {
            input: input.into(),
            outcome,
        });
    }

    pub fn done(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Done(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|item| pred(&item.outcome)).count()
    }
}

pub trait DurationProbe {
    fn duration_seconds(&self, path: &Path) -> Result<f64>;
}

pub struct FfprobeProbe {
    pub ffprobe: String,
}

impl DurationProbe for FfprobeProbe {
    fn duration_seconds(&self, path: &Path) -> Result<f64> {
        let output = ProcessCommand::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to launch {}", self.ffprobe))?;
        if !output.status.success() {
            bail!("{} failed: {}", self.ffprobe, stderr_tail(&output));
        }
        parse_duration_output(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| anyhow!("{} printed no usable duration", self.ffprobe))
    }
}

fn parse_duration_output(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find_map(|line| line.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeOutcome {
    Written(PathBuf),
    Skipped(String),
}

pub trait Normalizer {
    fn normalize(&self, input: &Path) -> Result<NormalizeOutcome>;
}

pub struct FfmpegNormalizer {
    pub ffmpeg: String,
    pub target_bitrate_kbps: u32,
    pub keep_originals: bool,
}

impl FfmpegNormalizer {
    pub fn output_path(input: &Path) -> Option<PathBuf> {
        let stem = input.file_stem()?.to_str()?;
        Some(input.with_file_name(format!("{stem}{}.mp4", naming::PROCESSED_SUFFIX)))
    }
}

impl Normalizer for FfmpegNormalizer {
    fn normalize(&self, input: &Path) -> Result<NormalizeOutcome> {
        let stem = input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow!("{} has no usable file name", input.display()))?;
        if naming::is_processed_stem(stem) {
            return Ok(NormalizeOutcome::Skipped(String::from("already processed")));
        }
        let output = Self::output_path(input)
            .ok_or_else(|| anyhow!("{} has no usable file name", input.display()))?;
        if output.exists() {
            return Ok(NormalizeOutcome::Skipped(format!(
                "{} already exists",
                output.display()
            )));
        }

        let partial = output.with_extension("mp4.part");
        let bitrate = format!("{}k", self.target_bitrate_kbps);
        let result = ProcessCommand::new(&self.ffmpeg)
            .args(["-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-s", "1280x720", "-r", "30", "-c:v", "libx264", "-b:v"])
            .arg(&bitrate)
            .args(["-maxrate", bitrate.as_str(), "-bufsize", bitrate.as_str()])
            .args(["-c:a", "aac", "-b:a", "160k", "-ar", "44100"])
            .args(["-movflags", "+faststart", "-f", "mp4"])
            .arg(&partial)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to launch {}", self.ffmpeg))?;

        if !result.status.success() {
            let _ = fs::remove_file(&partial);
            bail!("{} failed: {}", self.ffmpeg, stderr_tail(&result));
        }
        fs::rename(&partial, &output)
            .with_context(|| format!("failed to move {} into place", output.display()))?;

        if !self.keep_originals {
            if let Err(err) = fs::remove_file(input) {
                warn!(path = %input.display(), error = %err, "could not remove original after normalizing");
            }
        }
        Ok(NormalizeOutcome::Written(output))
    }
}

pub fn normalize_batch(normalizer: &dyn Normalizer, inputs: &[PathBuf]) -> BatchReport {
    let mut report = BatchReport::default();
    for input in inputs {
        let label = input.display().to_string();
        info!(input = %label, "normalizing");
        match normalizer.normalize(input) {
            Ok(NormalizeOutcome::Written(output)) => report.push(label, ItemOutcome::Done(output)),
            Ok(NormalizeOutcome::Skipped(reason)) => {
                report.push(label, ItemOutcome::Skipped(reason))
            }
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(input = %label, error = %detail, "normalization failed, continuing");
                report.push(label, ItemOutcome::Failed(detail));
            }
        }
    }
    report
}

pub trait Acquirer {
    fn acquire(&self, url: &str, dest: &Path) -> Result<()>;
}

pub struct CommandAcquirer {
    pub template: Vec<String>,
}

impl Acquirer for CommandAcquirer {
    fn acquire(&self, url: &str, dest: &Path) -> Result<()> {
        let dir = dest.display().to_string();
        let mut cmd = command_from_template(&self.template, &[("url", url), ("dir", dir.as_str())])?;
        let output = cmd
            .current_dir(dest)
            .stdin(Stdio::null())
            .output()
            .context("failed to launch downloader")?;
        if !output.status.success() {
            bail!("downloader failed: {}", stderr_tail(&output));
        }
        Ok(())
    }
}

pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read url list {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

pub fn acquire_batch(acquirer: &dyn Acquirer, urls: &[String], dest: &Path) -> Result<BatchReport> {
    fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;

    let mut report = BatchReport::default();
    for url in urls {
        let url = url.trim();
        if url.is_empty() {
            continue;
        }
        info!(url, "downloading");
        match acquirer.acquire(url, dest) {
            Ok(()) => report.push(url, ItemOutcome::Done(dest.to_path_buf())),
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(url, error = %detail, "download failed, continuing");
                report.push(url, ItemOutcome::Failed(detail));
            }
        }
    }
    Ok(report)
}
