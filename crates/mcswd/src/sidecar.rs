//! Start-up composition: one link, the mirror on top of it, the registry
//! and the supervisor that owns shutdown.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::link::{spawn_link, Connector, LinkConfig, LinkEvent, LinkHandle, WsConnector};
use crate::mirror::{spawn_mirror, MirrorHandle};
use crate::registry::{spawn_registry, RegistryHandle};
use crate::supervisor::{ExitStatus, Supervisor};

/// The running components of the sidecar.
pub struct Sidecar {
    pub link: LinkHandle,
    pub mirror: MirrorHandle,
    pub registry: RegistryHandle,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Sidecar {
    /// Spawns every actor. Nothing connects until [`Sidecar::connect`].
    ///
    /// The mirror is spawned before the link is used so it sees the first
    /// `Connected` event.
    pub fn spawn(config: LinkConfig, connector: Arc<dyn Connector>) -> Self {
        let (link, link_task) = spawn_link(config, connector);
        let (mirror, mirror_task) = spawn_mirror(link.clone());
        let (registry, registry_task) = spawn_registry();
        let logger_task = spawn_event_logger(&link);

        Self {
            link,
            mirror,
            registry,
            tasks: vec![
                ("link", link_task),
                ("mirror", mirror_task),
                ("registry", registry_task),
                ("event-logger", logger_task),
            ],
        }
    }

    /// Connects the link. Returns once the transport is open, or right
    /// away if the address is unusable.
    pub async fn connect(&self, address: &str) {
        self.link.connect(address).await;
    }

    /// Hands the actor tasks over, e.g. to [`Supervisor::watch_task`].
    pub fn take_tasks(&mut self) -> Vec<(&'static str, JoinHandle<()>)> {
        std::mem::take(&mut self.tasks)
    }
}

/// Logs connection-level and media-state events.
///
/// Stands in for a bus adapter: anything that wants to forward these events
/// subscribes the same way.
pub fn spawn_event_logger(link: &LinkHandle) -> JoinHandle<()> {
    let mut events = link.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(LinkEvent::Connected { epoch }) => info!(epoch, "connected"),
                Ok(LinkEvent::Disconnected) => warn!("disconnected"),
                Ok(LinkEvent::MediaState { media_id, state }) => {
                    debug!(media = %media_id, state = %state, "media-state");
                }
                Ok(LinkEvent::MediaStateIce {
                    media_id,
                    candidate,
                }) => {
                    debug!(media = %media_id, candidate = %candidate, "media-state-ice");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Runs the sidecar until shutdown and returns the exit status.
///
/// A missing address or failure to install signal handling is a start-up
/// fault and yields [`ExitStatus::Fatal`] without entering `RUNNING`.
pub async fn run(config: &Config) -> ExitStatus {
    let address = match config.require_address() {
        Ok(address) => address.to_string(),
        Err(e) => {
            error!(error = %e, "Cannot start");
            return ExitStatus::Fatal;
        }
    };

    let mut sidecar = Sidecar::spawn(config.link_config(), Arc::new(WsConnector));
    let supervisor = Supervisor::new(sidecar.registry.clone(), config.shutdown_failover());
    if let Err(e) = supervisor.install_handlers() {
        error!(error = %e, "Cannot start");
        return ExitStatus::Fatal;
    }
    for (name, task) in sidecar.take_tasks() {
        supervisor.watch_task(name, task);
    }

    // Connecting may take many retries; shutdown must not wait for it.
    let link = sidecar.link.clone();
    tokio::spawn(async move {
        link.connect(address.as_str()).await;
        if link.is_connected() {
            info!("Sidecar ready");
        }
    });

    let status = supervisor.run().await;
    info!(exit_code = status.code(), "Sidecar stopped");
    status
}
