use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use log::info;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    capture::{CaptureLoop, CaptureSource},
    clock::Clock,
    db::{CaptureKind, Database},
    digest::DigestGate,
    providers::{CommandDigestSender, CommandSummarizer, DigestSender, Summarizer},
    settings::SettingsStore,
    summary::{summary_loop, SummaryEngine},
};

use super::state::ControlPlane;

/// Everything outside the process the agent talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Vec<CaptureSource>,
    pub summarizer: Arc<dyn Summarizer>,
    pub digest: Arc<dyn DigestSender>,
}

impl Collaborators {
    /// One command-backed source per capture kind plus command-backed
    /// summarization and delivery.
    pub fn from_commands(settings: &Arc<SettingsStore>, media_dir: &Path) -> Self {
        Self {
            sources: CaptureKind::ALL
                .into_iter()
                .map(|kind| CaptureSource::from_commands(kind, Arc::clone(settings), media_dir))
                .collect(),
            summarizer: Arc::new(CommandSummarizer::new(Arc::clone(settings))),
            digest: Arc::new(CommandDigestSender::new(Arc::clone(settings))),
        }
    }
}

/// Owns the background tasks of one agent: a capture loop per source plus
/// the summary loop.
pub struct AgentController {
    control: ControlPlane,
    handles: Mutex<Vec<JoinHandle<()>>>,
    db: Database,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
}

impl AgentController {
    pub fn new(
        db: Database,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            control: ControlPlane::new(),
            handles: Mutex::new(Vec::new()),
            db,
            settings,
            clock,
            collaborators,
        }
    }

    pub fn control(&self) -> &ControlPlane {
        &self.control
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Spawns every loop. Returns false if already running.
    pub async fn start(&self) -> bool {
        let mut handles = self.handles.lock().await;
        if !self.control.start() {
            return false;
        }
        let signal = self.control.signal();

        for source in &self.collaborators.sources {
            let worker = CaptureLoop::new(
                source.clone(),
                self.db.clone(),
                Arc::clone(&self.settings),
                Arc::clone(&self.clock),
            );
            let signal = signal.clone();
            handles.push(tokio::spawn(async move {
                worker.run(signal).await;
            }));
        }

        let engine = SummaryEngine::new(
            self.db.clone(),
            Arc::clone(&self.settings),
            Arc::clone(&self.clock),
            Arc::clone(&self.collaborators.summarizer),
        );
        let gate = DigestGate::new(
            self.db.clone(),
            Arc::clone(&self.settings),
            Arc::clone(&self.clock),
            Arc::clone(&self.collaborators.digest),
        );
        handles.push(tokio::spawn(summary_loop(
            engine,
            gate,
            Arc::clone(&self.settings),
            signal,
        )));

        info!("agent started with {} capture loops", self.collaborators.sources.len());
        true
    }

    /// Cancels the run and waits for every loop to finish its current step.
    pub async fn stop(&self) -> Result<()> {
        let mut handles = self.handles.lock().await;
        self.control.stop();

        let mut first_error = None;
        for handle in handles.drain(..) {
            if let Err(err) = handle.await.context("agent loop task failed to join") {
                first_error.get_or_insert(err);
            }
        }

        info!("agent stopped");
        first_error.map_or(Ok(()), Err)
    }
}
