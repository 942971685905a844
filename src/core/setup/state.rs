// ─── Setup Pipeline ───
// Ordered steps, each with its own progress, run strictly one after another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::context::SetupContext;
use crate::core::downloader::TaskQueue;
use crate::core::error::LauncherResult;

/// A named unit of setup work.
///
/// Side effects must be keyed by content hash or version id so a step can be
/// run again safely.
#[async_trait]
pub trait Step: Send + Sync {
    /// Human readable label for status lines.
    fn friendly_name(&self) -> String;
    /// Stable identifier, e.g. `client_download`.
    fn name(&self) -> String;
    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()>;
    /// `0.0..=1.0`
    fn progress(&self) -> f32;

    fn current_status(&self) -> String {
        self.friendly_name()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetupPhase {
    NotStarted,
    Running,
    Succeeded,
    Failed(String),
}

impl SetupPhase {
    pub fn is_done(&self) -> bool {
        matches!(self, SetupPhase::Succeeded | SetupPhase::Failed(_))
    }
}

pub struct SetupState {
    friendly_name: String,
    name: String,
    steps: Vec<Arc<dyn Step>>,
    current: Mutex<Option<Arc<dyn Step>>>,
    phase: Mutex<SetupPhase>,
}

impl SetupState {
    pub fn new(friendly_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            name: name.into(),
            steps: Vec::new(),
            current: Mutex::new(None),
            phase: Mutex::new(SetupPhase::NotStarted),
        }
    }

    pub fn add_step(&mut self, step: impl Step + 'static) {
        self.steps.push(Arc::new(step));
    }

    pub fn add_shared_step(&mut self, step: Arc<dyn Step>) {
        self.steps.push(step);
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn phase(&self) -> SetupPhase {
        self.phase_guard().clone()
    }

    pub fn is_done(&self) -> bool {
        self.phase_guard().is_done()
    }

    /// Message of the terminal error, if the pipeline failed.
    pub fn error(&self) -> Option<String> {
        match &*self.phase_guard() {
            SetupPhase::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Run every step in order. A no-op once the pipeline is done, whether
    /// it succeeded or failed.
    pub async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        {
            let mut phase = self.phase_guard();
            if phase.is_done() {
                return Ok(());
            }
            *phase = SetupPhase::Running;
        }
        info!("Setup {} started ({} steps)", self.name, self.steps.len());

        for step in &self.steps {
            let step_name = step.name();
            let already_running = self
                .current_guard()
                .as_ref()
                .is_some_and(|current| current.name() == step_name);
            if already_running {
                debug!("Skipping {}: already the current step", step_name);
                continue;
            }

            *self.current_guard() = Some(Arc::clone(step));
            debug!("Running step {}", step_name);
            if let Err(err) = step.run(ctx).await {
                error!("Step {} failed: {}", step_name, err);
                *self.phase_guard() = SetupPhase::Failed(err.to_string());
                return Err(err);
            }
        }

        *self.current_guard() = None;
        *self.phase_guard() = SetupPhase::Succeeded;
        info!("Setup {} finished", self.name);
        Ok(())
    }

    /// Progress of the running step, 1.0 after a clean finish.
    pub fn current_progress(&self) -> f32 {
        match self.current_step() {
            Some(step) => step.progress(),
            None if self.phase() == SetupPhase::Succeeded => 1.0,
            None => 0.0,
        }
    }

    fn current_step(&self) -> Option<Arc<dyn Step>> {
        self.current_guard().clone()
    }

    fn current_guard(&self) -> MutexGuard<'_, Option<Arc<dyn Step>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase_guard(&self) -> MutexGuard<'_, SetupPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Step for SetupState {
    fn friendly_name(&self) -> String {
        match self.current_step() {
            Some(step) => step.friendly_name(),
            None => self.friendly_name.clone(),
        }
    }

    fn name(&self) -> String {
        match self.current_step() {
            Some(step) => step.name(),
            None => self.name.clone(),
        }
    }

    async fn run(&self, ctx: &SetupContext) -> LauncherResult<()> {
        SetupState::run(self, ctx).await
    }

    /// Unweighted mean of the steps' progress.
    fn progress(&self) -> f32 {
        if self.steps.is_empty() {
            return if self.phase() == SetupPhase::Succeeded {
                1.0
            } else {
                0.0
            };
        }
        let sum: f32 = self.steps.iter().map(|s| s.progress()).sum();
        sum / self.steps.len() as f32
    }

    fn current_status(&self) -> String {
        match self.current_step() {
            Some(step) => step.current_status(),
            None => self.friendly_name.clone(),
        }
    }
}

/// Progress of a step that drains one queue: 0 before the queue exists,
/// the queue's completion ratio while it runs, 1 after a clean finish.
#[derive(Default)]
pub struct QueueProgress {
    queue: Mutex<Option<TaskQueue>>,
    finished: AtomicBool,
}

impl QueueProgress {
    /// Run `queue` to completion while exposing its progress.
    pub async fn drain(&self, queue: TaskQueue) -> LauncherResult<()> {
        *self.queue.lock().unwrap_or_else(PoisonError::into_inner) = Some(queue.clone());
        queue.run_to_completion().await?;
        self.finish();
        Ok(())
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        if self.finished.load(Ordering::Acquire) {
            return 1.0;
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0.0, TaskQueue::progress)
    }
}
