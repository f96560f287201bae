//! Session Manager
//!
//! Drives one long-lived Claude CLI subprocess as a request/response peer.
//! Runs are strictly serialized: the run slot is a FIFO mutex around the
//! process session, so a queued caller observes the previous run's full
//! completion (including teardown) before its own request is written.

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::events::{RunDisposition, SessionEvent};
use super::state::{RunState, SessionInfo, SessionState};
use super::tracker::ModifiedFiles;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::process::{CommandResolver, ProcessSession};
use crate::protocol::{EventKind, EventLine, RunRequest};

/// Summary of a run that reached its `result` line
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub working_dir: PathBuf,
    /// Stdout lines delivered to the caller (blank lines excluded)
    pub lines: usize,
    pub duration: Duration,
    pub modified_files: Vec<String>,
}

/// Session manager - owns the subprocess and serializes runs against it
pub struct SessionManager {
    config: SessionConfig,
    resolver: CommandResolver,
    /// The run slot. Holding this lock is what makes a run in flight.
    session: tokio::sync::Mutex<Option<ProcessSession>>,
    state: RwLock<SessionState>,
    /// Files written during the current or most recent run
    modified_files: Mutex<ModifiedFiles>,
    /// Working directory of the most recent run, for resolving relative paths
    last_working_dir: Mutex<Option<PathBuf>>,
    disposed: AtomicBool,
}

impl SessionManager {
    /// Create a new session manager. No process is started until the first run.
    pub fn new(config: SessionConfig) -> Self {
        let resolver = CommandResolver::new(&config.extra_search_dirs);
        Self {
            config,
            resolver,
            session: tokio::sync::Mutex::new(None),
            state: RwLock::new(SessionState::new()),
            modified_files: Mutex::new(ModifiedFiles::new()),
            last_working_dir: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.read().subscribe()
    }

    pub fn state(&self) -> RunState {
        self.state.read().state
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo::from(&*self.state.read())
    }

    /// Whether a subprocess is currently running. While a run holds the slot
    /// this reports whether a process has been started and not yet stopped.
    pub fn is_alive(&self) -> bool {
        match self.session.try_lock() {
            Ok(mut slot) => slot.as_mut().map_or(false, ProcessSession::is_alive),
            Err(_) => self.state.read().pid.is_some(),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Files reported as written or edited by the most recent run
    pub fn modified_files(&self) -> Vec<String> {
        self.modified_files.lock().to_vec()
    }

    pub fn clear_modified_files(&self) {
        self.modified_files.lock().clear();
    }

    /// Modified files as absolute paths, relative ones joined onto the run's working directory
    pub fn resolved_modified_files(&self) -> Vec<PathBuf> {
        let base = self
            .last_working_dir
            .lock()
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        self.modified_files.lock().resolved(&base)
    }

    /// Send `prompt` and deliver every output line to `on_line` until the
    /// `result` line arrives.
    ///
    /// Callback errors and panics are logged and ignored. Cancellation via
    /// `cancel` yields [`SessionError::Cancelled`]; the configured request
    /// timeout yields [`SessionError::Timeout`]. Any run that does not
    /// complete normally leaves the subprocess torn down.
    pub async fn run<F>(
        &self,
        prompt: &str,
        working_dir: Option<&Path>,
        mut on_line: F,
        cancel: CancellationToken,
    ) -> SessionResult<RunOutcome>
    where
        F: FnMut(&str) -> anyhow::Result<()>,
    {
        self.ensure_not_disposed()?;

        let mut slot = tokio::select! {
            slot = self.session.lock() => slot,
            _ = cancel.cancelled() => {
                info!("[Info] Operation canceled while waiting for the previous run");
                return Err(SessionError::Cancelled);
            }
        };
        // dispose() may have run while we were queued
        self.ensure_not_disposed()?;

        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        self.modified_files.lock().clear();

        let working_dir = self.resolve_working_dir(working_dir)?;
        *self.last_working_dir.lock() = Some(working_dir.clone());
        debug!("Run {} in {}", run_id, working_dir.display());

        let result = self
            .run_locked(&mut slot, &run_id, prompt, &working_dir, &mut on_line, &cancel)
            .await;

        let disposition = match &result {
            Ok(_) => RunDisposition::Completed,
            Err(SessionError::Cancelled) => RunDisposition::Cancelled,
            Err(SessionError::Timeout(_)) => RunDisposition::TimedOut,
            Err(e) => RunDisposition::Failed {
                message: e.to_string(),
            },
        };

        let outcome = match result {
            Ok(lines) => {
                self.state.write().set_completed();
                Ok(RunOutcome {
                    run_id: run_id.clone(),
                    working_dir,
                    lines,
                    duration: started.elapsed(),
                    modified_files: self.modified_files(),
                })
            }
            Err(e) => {
                match &e {
                    SessionError::Cancelled => info!("[Info] Operation canceled by user."),
                    SessionError::Timeout(_) => warn!("[Error] Request timed out."),
                    other => error!("[Error] {}", other),
                }
                if let Some(session) = slot.take() {
                    self.teardown(session).await;
                }
                let mut state = self.state.write();
                if e.is_fatal() {
                    state.set_failed(e.to_string());
                } else {
                    state.set_state(RunState::Idle);
                }
                Err(e)
            }
        };

        self.state.read().emit(SessionEvent::RunFinished {
            run_id,
            disposition,
        });

        outcome
        // run slot released when `slot` drops
    }

    /// Like [`run`](Self::run), but yields output lines as a stream. The join
    /// handle resolves to the run's result once the stream has ended.
    pub fn run_stream(
        self: &Arc<Self>,
        prompt: impl Into<String>,
        working_dir: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> (
        UnboundedReceiverStream<String>,
        JoinHandle<SessionResult<RunOutcome>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Arc::clone(self);
        let prompt = prompt.into();

        let handle = tokio::spawn(async move {
            manager
                .run(
                    &prompt,
                    working_dir.as_deref(),
                    move |line| {
                        tx.send(line.to_string())
                            .map_err(|_| anyhow::anyhow!("line stream receiver dropped"))
                    },
                    cancel,
                )
                .await
        });

        (UnboundedReceiverStream::new(rx), handle)
    }

    /// Tear down the current subprocess, waiting for any run in flight to finish first
    pub async fn stop(&self) {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            self.teardown(session).await;
        }
    }

    /// Reject further runs and tear the subprocess down
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Disposing session manager");
        self.stop().await;
    }

    async fn run_locked<F>(
        &self,
        slot: &mut Option<ProcessSession>,
        run_id: &str,
        prompt: &str,
        working_dir: &Path,
        on_line: &mut F,
        cancel: &CancellationToken,
    ) -> SessionResult<usize>
    where
        F: FnMut(&str) -> anyhow::Result<()>,
    {
        self.state.write().set_state(RunState::Starting);
        self.ensure_started(slot, working_dir).await?;
        let session = slot.as_mut().ok_or(SessionError::NotRunning)?;

        for stale in session.drain_stderr() {
            debug!("Discarding stderr from before this run: {}", stale.trim_end());
        }

        let request = RunRequest::user(prompt).to_line()?;
        info!("[Input] {}", request);
        session.write_line(&request).await?;
        self.state.write().set_state(RunState::AwaitingResponse);

        let timeout = self.config.request_timeout();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut delivered = 0usize;
        loop {
            session.check_alive()?;
            let (stdout, stderr) = session.output();

            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = &mut deadline => return Err(SessionError::Timeout(timeout)),
                Some(chunk) = stderr.recv() => {
                    self.state.read().emit(SessionEvent::Stderr { text: chunk.clone() });
                    deliver(on_line, &chunk);
                    continue;
                }
                line = stdout.next_line() => line?,
            };

            let line = line.ok_or(SessionError::StreamClosed)?;
            if line.trim().is_empty() {
                continue;
            }

            let event = EventLine::parse(&line);
            if event.should_log() {
                info!("[Output] {}", line);
            }

            if event.kind() == &EventKind::StreamEvent {
                let tracked = self.modified_files.lock().track(&event);
                if let Some(path) = tracked {
                    self.state.read().emit(SessionEvent::FileModified {
                        run_id: run_id.to_string(),
                        path,
                    });
                }
            }

            deliver(on_line, &line);
            delivered += 1;

            if event.is_terminal() {
                debug!("Run {} completed after {} lines", run_id, delivered);
                return Ok(delivered);
            }
        }
    }

    /// Make sure a live subprocess runs in `working_dir`, restarting it if the
    /// directory changed or the old one died
    async fn ensure_started(
        &self,
        slot: &mut Option<ProcessSession>,
        working_dir: &Path,
    ) -> SessionResult<()> {
        if let Some(session) = slot.as_mut() {
            let alive = session.is_alive();
            if alive && session.is_for(working_dir) {
                return Ok(());
            }
            if alive {
                info!(
                    "Working directory changed from {} to {}, restarting process",
                    session.working_dir().display(),
                    working_dir.display()
                );
            } else {
                warn!("Process {} is no longer running, restarting", session.pid());
            }
        }

        if let Some(old) = slot.take() {
            self.teardown(old).await;
        }

        let session = ProcessSession::spawn(&self.config, &self.resolver, working_dir)?;
        self.state
            .write()
            .set_process_started(session.pid(), working_dir.to_path_buf());
        *slot = Some(session);
        Ok(())
    }

    async fn teardown(&self, session: ProcessSession) {
        session
            .shutdown(self.config.pump_drain(), self.config.shutdown_grace())
            .await;
        self.state.write().set_process_stopped();
    }

    fn resolve_working_dir(&self, requested: Option<&Path>) -> SessionResult<PathBuf> {
        if let Some(dir) = requested {
            if !dir.as_os_str().to_string_lossy().trim().is_empty() {
                return Ok(dir.to_path_buf());
            }
        }
        match &self.config.default_working_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    fn ensure_not_disposed(&self) -> SessionResult<()> {
        if self.is_disposed() {
            Err(SessionError::Disposed)
        } else {
            Ok(())
        }
    }
}

/// Hand a line to the caller, absorbing errors and panics
fn deliver<F>(on_line: &mut F, line: &str)
where
    F: FnMut(&str) -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(|| on_line(line))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Output callback failed: {:#}", e),
        Err(_) => error!("Output callback panicked"),
    }
}
