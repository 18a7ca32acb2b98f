//! Process supervisor - signal handling, fault policy and bounded shutdown.
//!
//! ```text
//! RUNNING ──signal──▶ STOPPING ──┬── all sessions stopped ──▶ exit 0
//!    │                           ├── failover deadline ─────▶ exit 0
//!    └─ fault: logged            └── fault ─────────────────▶ exit 1
//! ```
//!
//! Signal handlers and the panic hook are process-wide and installed at
//! most once, no matter how many supervisors are built.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::registry::RegistryHandle;

/// Default time allowed for draining sessions on shutdown.
pub const DEFAULT_SHUTDOWN_FAILOVER: Duration = Duration::from_millis(5000);

static HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK: Once = Once::new();

/// Lifecycle of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Running = 0,
    Stopping = 1,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        if value == Self::Stopping as u8 {
            Self::Stopping
        } else {
            Self::Running
        }
    }
}

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Shutdown completed (drained or timed out).
    Graceful,
    /// Fault during shutdown, or start-up never reached `RUNNING`.
    Fatal,
}

impl ExitStatus {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Graceful => 0,
            Self::Fatal => 1,
        }
    }
}

/// Something went wrong outside of any caller's control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Panic { message: String },
    TaskEnded { task: String, reason: String },
    Other(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panic { message } => write!(f, "panic: {message}"),
            Self::TaskEnded { task, reason } => write!(f, "task {task} ended: {reason}"),
            Self::Other(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

/// Cheap-to-clone sender for faults.
#[derive(Debug, Clone)]
pub struct FaultReporter {
    sender: mpsc::UnboundedSender<Fault>,
}

impl FaultReporter {
    pub fn report(&self, fault: Fault) {
        let _ = self.sender.send(fault);
    }
}

/// Owns the shutdown race.
pub struct Supervisor {
    registry: RegistryHandle,
    failover: Duration,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
    faults_tx: mpsc::UnboundedSender<Fault>,
    faults_rx: mpsc::UnboundedReceiver<Fault>,
}

impl Supervisor {
    pub fn new(registry: RegistryHandle, failover: Duration) -> Self {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            failover,
            state: Arc::new(AtomicU8::new(RunState::Running as u8)),
            shutdown: CancellationToken::new(),
            faults_tx,
            faults_rx,
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Token that requests shutdown when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn fault_reporter(&self) -> FaultReporter {
        FaultReporter {
            sender: self.faults_tx.clone(),
        }
    }

    /// Installs SIGTERM/SIGINT/SIGHUP handling and the panic hook.
    ///
    /// Returns `Ok(false)` if another supervisor already installed them in
    /// this process.
    ///
    /// # Errors
    ///
    /// Returns an error if a signal stream cannot be registered.
    pub fn install_handlers(&self) -> Result<bool, SupervisorError> {
        if HANDLERS_INSTALLED.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sighup = signal(SignalKind::hangup())?;
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                    _ = sighup.recv() => info!("Received SIGHUP"),
                }
                token.cancel();
            });
        }

        #[cfg(not(unix))]
        {
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C");
                }
                token.cancel();
            });
        }

        let state = Arc::clone(&self.state);
        let faults = self.fault_reporter();
        PANIC_HOOK.call_once(move || {
            std::panic::set_hook(Box::new(move |info| {
                let message = info.to_string();
                error!(panic = %message, "Uncaught panic");
                if RunState::from_u8(state.load(Ordering::SeqCst)) == RunState::Stopping {
                    error!("Panic during shutdown, exiting");
                    std::process::exit(ExitStatus::Fatal.code());
                }
                faults.report(Fault::Panic { message });
            }));
        });

        Ok(true)
    }

    /// Reports a fault if `task` ever finishes.
    pub fn watch_task(&self, name: &str, task: JoinHandle<()>) {
        let faults = self.fault_reporter();
        let task_name = name.to_string();
        tokio::spawn(async move {
            let reason = match task.await {
                Ok(()) => "returned".to_string(),
                Err(e) => e.to_string(),
            };
            faults.report(Fault::TaskEnded {
                task: task_name,
                reason,
            });
        });
    }

    /// Runs until shutdown is requested, then stops.
    ///
    /// Faults seen while running are logged and otherwise ignored.
    pub async fn run(mut self) -> ExitStatus {
        info!("Supervisor running");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                Some(fault) = self.faults_rx.recv() => {
                    error!(fault = %fault, "Fault while running, continuing");
                }
            }
        }
        self.stop().await
    }

    /// Enters `STOPPING` and races the session drain against the failover
    /// deadline. A fault seen meanwhile ends the race as fatal.
    pub async fn stop(mut self) -> ExitStatus {
        self.state.store(RunState::Stopping as u8, Ordering::SeqCst);
        info!(failover_ms = self.failover.as_millis() as u64, "Stopping");

        let registry = self.registry.clone();
        tokio::select! {
            stopped = registry.stop_all() => {
                info!(sessions = stopped, "All sessions stopped");
                ExitStatus::Graceful
            }
            () = tokio::time::sleep(self.failover) => {
                warn!(
                    failover_ms = self.failover.as_millis() as u64,
                    "Failover deadline reached before all sessions stopped"
                );
                ExitStatus::Graceful
            }
            Some(fault) = self.faults_rx.recv() => {
                error!(fault = %fault, "Fault during shutdown");
                ExitStatus::Fatal
            }
        }
    }
}
