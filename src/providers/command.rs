//! Provider adapters that delegate to operator-configured shell commands.
//!
//! Commands are read from the settings store on every call, so editing the
//! settings file and reloading swaps providers without a restart. Inputs
//! travel on stdin plus `LIFELOG_*` environment variables; results come back
//! on stdout.

use std::{
    fs,
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
    sync::Arc,
    thread,
};

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::{db::CaptureKind, digest::render_html, settings::SettingsStore};

use super::{CaptureRequest, CapturedMedia, DigestSender, Enricher, MediaCapture, Summarizer};

fn shell(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

fn run_shell(command: &str, envs: &[(&str, String)], input: &[u8]) -> Result<Vec<u8>> {
    if command.trim().is_empty() {
        bail!("no command configured");
    }

    let mut child = shell(command)
        .envs(envs.iter().map(|(key, value)| (*key, value.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn `{command}`"))?;

    // Feed stdin from a separate thread so a child that writes a lot before
    // reading cannot deadlock against us. Commands that ignore stdin close
    // the pipe early; that write error is expected.
    let mut stdin = child.stdin.take().context("child stdin unavailable")?;
    let input = input.to_vec();
    let writer = thread::spawn(move || {
        let _ = stdin.write_all(&input);
    });

    let output = child
        .wait_with_output()
        .with_context(|| format!("failed to wait for `{command}`"))?;
    let _ = writer.join();

    if !output.status.success() {
        bail!(
            "`{command}` exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(output.stdout)
}

fn stdout_text(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Runs `capture_command`; its stdout is the media, written under
/// `<media_dir>/<table>/<timestamp>.<ext>`.
pub struct CommandCapture {
    kind: CaptureKind,
    settings: Arc<SettingsStore>,
    media_dir: PathBuf,
}

impl CommandCapture {
    pub fn new(kind: CaptureKind, settings: Arc<SettingsStore>, media_dir: PathBuf) -> Self {
        Self {
            kind,
            settings,
            media_dir,
        }
    }
}

impl MediaCapture for CommandCapture {
    fn capture(&self, request: &CaptureRequest) -> Result<CapturedMedia> {
        let settings = self.settings.capture(self.kind);
        let bytes = run_shell(
            &settings.capture_command,
            &[
                ("LIFELOG_KIND", self.kind.to_string()),
                ("LIFELOG_RECORD_SECS", request.record_for.as_secs().to_string()),
            ],
            &[],
        )?;

        if bytes.is_empty() {
            return Ok(CapturedMedia::default());
        }

        let dir = self.media_dir.join(self.kind.table());
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create media directory {}", dir.display()))?;
        let path = dir.join(format!(
            "{}.{}",
            request.timestamp.format("%Y-%m-%d-%H-%M-%S"),
            settings.media_extension
        ));
        fs::write(&path, &bytes)
            .with_context(|| format!("failed to write media to {}", path.display()))?;

        Ok(CapturedMedia {
            bytes,
            reference: path.display().to_string(),
        })
    }
}

/// Runs `enrich_command` with the media on stdin.
pub struct CommandEnricher {
    kind: CaptureKind,
    settings: Arc<SettingsStore>,
}

impl CommandEnricher {
    pub fn new(kind: CaptureKind, settings: Arc<SettingsStore>) -> Self {
        Self { kind, settings }
    }
}

impl Enricher for CommandEnricher {
    fn enrich(&self, media: &CapturedMedia, prompt: &str) -> Result<String> {
        let settings = self.settings.capture(self.kind);
        let output = run_shell(
            &settings.enrich_command,
            &[
                ("LIFELOG_KIND", self.kind.to_string()),
                ("LIFELOG_PROMPT", prompt.to_string()),
                ("LIFELOG_MODEL", settings.model.clone()),
                ("LIFELOG_MEDIA_PATH", media.reference.clone()),
            ],
            &media.bytes,
        )?;
        Ok(stdout_text(output))
    }
}

/// Runs `summarize_command` with a JSON request on stdin.
pub struct CommandSummarizer {
    settings: Arc<SettingsStore>,
}

impl CommandSummarizer {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }
}

impl Summarizer for CommandSummarizer {
    fn summarize(&self, merged_text: &str, previous_summary: &str, prompt: &str) -> Result<String> {
        let settings = self.settings.summary();
        let request = json!({
            "merged_text": merged_text,
            "previous_summary": previous_summary,
            "prompt": prompt,
            "model": settings.model,
        });
        let body = serde_json::to_vec(&request).context("failed to encode summarize request")?;
        let output = run_shell(&settings.summarize_command, &[], &body)?;
        Ok(stdout_text(output))
    }
}

/// Runs `send_command` with the HTML digest body on stdin.
pub struct CommandDigestSender {
    settings: Arc<SettingsStore>,
}

impl CommandDigestSender {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }
}

impl DigestSender for CommandDigestSender {
    fn send_digest(&self, content: &str) -> Result<()> {
        let settings = self.settings.digest();
        run_shell(
            &settings.send_command,
            &[
                ("LIFELOG_DIGEST_SUBJECT", settings.subject.clone()),
                ("LIFELOG_DIGEST_RECIPIENT", settings.recipient.clone()),
            ],
            render_html(content).as_bytes(),
        )?;
        Ok(())
    }
}
