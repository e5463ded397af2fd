//! In-process collaborators for unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Condvar, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};

use super::{CaptureRequest, CapturedMedia, DigestSender, Enricher, MediaCapture, Summarizer};

/// Replays queued results, then keeps returning `fallback`.
pub struct ScriptedCapture {
    script: Mutex<VecDeque<Result<Vec<u8>, String>>>,
    fallback: Vec<u8>,
    calls: AtomicUsize,
}

impl ScriptedCapture {
    pub fn always(bytes: &[u8]) -> Self {
        Self::scripted(Vec::new(), bytes)
    }

    pub fn scripted(script: Vec<Result<Vec<u8>, String>>, fallback: &[u8]) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: fallback.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MediaCapture for ScriptedCapture {
    fn capture(&self, request: &CaptureRequest) -> Result<CapturedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let bytes = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(message)) => return Err(anyhow!(message)),
            None => self.fallback.clone(),
        };
        Ok(CapturedMedia {
            reference: format!("media/{}", request.timestamp.format("%H-%M-%S")),
            bytes,
        })
    }
}

#[derive(Default)]
struct GateState {
    entered: bool,
    open: bool,
}

/// Blocks inside `capture` until `release` is called, so a test can act
/// while the tick is in flight.
#[derive(Default)]
pub struct GatedCapture {
    state: Mutex<GateState>,
    opened: Condvar,
}

impl GatedCapture {
    pub fn release(&self) {
        self.state.lock().unwrap().open = true;
        self.opened.notify_all();
    }

    /// Polls until a capture call is parked at the gate.
    pub async fn wait_until_entered(&self) {
        while !self.state.lock().unwrap().entered {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl MediaCapture for GatedCapture {
    fn capture(&self, request: &CaptureRequest) -> Result<CapturedMedia> {
        let mut state = self.state.lock().unwrap();
        state.entered = true;
        while !state.open {
            state = self.opened.wait(state).unwrap();
        }
        Ok(CapturedMedia {
            bytes: b"clip".to_vec(),
            reference: format!("media/{}", request.timestamp.format("%H-%M-%S")),
        })
    }
}

pub struct FixedEnricher {
    reply: Result<String, String>,
}

impl FixedEnricher {
    pub fn ok(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
        }
    }
}

impl Enricher for FixedEnricher {
    fn enrich(&self, _media: &CapturedMedia, _prompt: &str) -> Result<String> {
        self.reply.clone().map_err(|message| anyhow!(message))
    }
}

/// Answers with `reply` (or fails) and remembers every request.
pub struct RecordingSummarizer {
    reply: Mutex<Result<String, String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingSummarizer {
    pub fn ok(reply: &str) -> Self {
        Self {
            reply: Mutex::new(Ok(reply.to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reply(&self, reply: Result<&str, &str>) {
        *self.reply.lock().unwrap() = reply.map(str::to_string).map_err(str::to_string);
    }

    /// `(merged_text, previous_summary)` per call.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Summarizer for RecordingSummarizer {
    fn summarize(&self, merged_text: &str, previous_summary: &str, _prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((merged_text.to_string(), previous_summary.to_string()));
        self.reply.lock().unwrap().clone().map_err(|message| anyhow!(message))
    }
}

#[derive(Default)]
pub struct RecordingDigestSender {
    failing: AtomicBool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl RecordingDigestSender {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl DigestSender for RecordingDigestSender {
    fn send_digest(&self, content: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("smtp connection refused"));
        }
        self.sent.lock().unwrap().push(content.to_string());
        Ok(())
    }
}
