//! One mock server: a listener on one port plus its lifecycle state machine.
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               |           |
//!               +-> Error <-+
//! ```
//!
//! Lifecycle calls are serialized by an async mutex. A pending bind can be
//! cancelled by `stop()` without waiting for that mutex.

use super::handler::handle_request;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};
use crate::executor::ResponseExecutor;
use crate::logs::LogRegistry;
use crate::metrics;
use crate::project::ProjectStore;
use chrono::{DateTime, Utc};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consecutive accept failures after which the listener gives up.
const MAX_ACCEPT_ERRORS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ServerState {
    pub fn is_up(&self) -> bool {
        matches!(self, ServerState::Starting | ServerState::Running)
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of an instance, for the control API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub name: String,
    pub state: ServerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub request_count: u64,
}

#[derive(Debug)]
struct StatusCell {
    state: ServerState,
    port: Option<u16>,
    last_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

struct RunningListener {
    port: u16,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Everything a running pipeline needs besides the listener.
pub struct InstanceContext {
    pub project: String,
    pub store: Arc<ProjectStore>,
    pub executor: ResponseExecutor,
    pub logs: Arc<LogRegistry>,
    pub events: EventBus,
    pub bind_host: String,
    pub max_body_bytes: usize,
}

pub struct ServerInstance {
    name: String,
    pub(crate) ctx: InstanceContext,
    status: RwLock<StatusCell>,
    request_count: AtomicU64,
    lifecycle: tokio::sync::Mutex<Option<RunningListener>>,
    pending_bind: Mutex<Option<CancellationToken>>,
}

impl ServerInstance {
    pub fn new(name: impl Into<String>, ctx: InstanceContext) -> Self {
        Self {
            name: name.into(),
            ctx,
            status: RwLock::new(StatusCell {
                state: ServerState::Stopped,
                port: None,
                last_error: None,
                started_at: None,
            }),
            request_count: AtomicU64::new(0),
            lifecycle: tokio::sync::Mutex::new(None),
            pending_bind: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> &str {
        &self.ctx.project
    }

    pub fn state(&self) -> ServerState {
        self.status.read().state
    }

    /// Port the listener is bound to, while running.
    pub fn bound_port(&self) -> Option<u16> {
        self.status.read().port
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.read().last_error.clone()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub(crate) fn count_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) -> ServerStatus {
        let cell = self.status.read();
        ServerStatus {
            name: self.name.clone(),
            state: cell.state,
            port: cell.port,
            last_error: cell.last_error.clone(),
            started_at: cell.started_at,
            request_count: self.request_count(),
        }
    }

    fn transition(&self, state: ServerState, port: Option<u16>, error: Option<String>) {
        let previous = {
            let mut cell = self.status.write();
            let previous = cell.state;
            cell.state = state;
            cell.port = port;
            match state {
                ServerState::Running => {
                    cell.started_at = Some(Utc::now());
                    cell.last_error = None;
                }
                ServerState::Error => cell.last_error = error.clone(),
                ServerState::Stopped => cell.started_at = None,
                _ => {}
            }
            previous
        };

        if previous == state {
            return;
        }
        if state == ServerState::Running {
            metrics::server_started(&self.ctx.project);
        } else if previous == ServerState::Running {
            metrics::server_stopped(&self.ctx.project);
        }

        debug!(
            "Server '{}' of '{}': {} -> {}",
            self.name, self.ctx.project, previous, state
        );
        self.ctx.events.publish(EngineEvent::ServerState {
            project: self.ctx.project.clone(),
            server: self.name.clone(),
            state,
            port,
            error,
        });
    }

    /// Put the instance into `Error` without a listener, e.g. when the fleet
    /// rejects its configuration.
    pub(crate) fn fail(&self, reason: &str) {
        self.transition(ServerState::Error, None, Some(reason.to_string()));
    }

    /// Bind `port` and start serving. Port 0 binds an ephemeral port; the
    /// bound port is returned.
    pub async fn start(self: &Arc<Self>, port: u16) -> Result<u16, EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(running) = lifecycle.as_ref() {
            if !running.task.is_finished() {
                return Err(EngineError::AlreadyRunning(self.name.clone()));
            }
        }
        if let Some(stale) = lifecycle.take() {
            stale.shutdown.cancel();
        }

        let cancel = CancellationToken::new();
        *self.pending_bind.lock() = Some(cancel.clone());
        self.transition(ServerState::Starting, None, None);

        let bind_host = self.ctx.bind_host.clone();
        let bound = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = TcpListener::bind((bind_host.as_str(), port)) => Some(result),
        };
        self.pending_bind.lock().take();

        let listener = match bound {
            Some(Ok(listener)) if !cancel.is_cancelled() => listener,
            Some(Ok(_)) | None => {
                info!("Start of server '{}' cancelled", self.name);
                self.transition(ServerState::Stopped, None, None);
                return Err(EngineError::StartCancelled(self.name.clone()));
            }
            Some(Err(e)) => {
                let err = EngineError::Bind {
                    port,
                    reason: e.to_string(),
                };
                error!("Server '{}': {}", self.name, err);
                self.transition(ServerState::Error, None, Some(err.to_string()));
                return Err(err);
            }
        };

        let bound_port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            Arc::clone(self),
            listener,
            bound_port,
            shutdown.clone(),
        ));
        *lifecycle = Some(RunningListener {
            port: bound_port,
            shutdown,
            task,
        });

        info!(
            "Server '{}' of '{}' listening on {}:{}",
            self.name, self.ctx.project, bind_host, bound_port
        );
        self.transition(ServerState::Running, Some(bound_port), None);
        Ok(bound_port)
    }

    /// Close the listener. In-flight requests are allowed to finish.
    pub async fn stop(&self) {
        if let Some(pending) = self.pending_bind.lock().take() {
            pending.cancel();
        }

        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.take() {
            Some(running) => {
                let port = running.port;
                self.transition(ServerState::Stopping, Some(port), None);
                running.shutdown.cancel();
                if let Err(e) = running.task.await {
                    warn!("Accept loop of server '{}' ended abnormally: {}", self.name, e);
                }
                info!("Server '{}' on port {} stopped", self.name, port);
                self.transition(ServerState::Stopped, None, None);
            }
            None => {
                if self.state() != ServerState::Stopped {
                    self.transition(ServerState::Stopped, None, None);
                }
            }
        }
    }

    /// `stop()` followed by `start(port)`.
    pub async fn restart(self: &Arc<Self>, port: u16) -> Result<u16, EngineError> {
        self.stop().await;
        self.start(port).await
    }
}

async fn accept_loop(
    instance: Arc<ServerInstance>,
    listener: TcpListener,
    port: u16,
    shutdown: CancellationToken,
) {
    let mut consecutive_errors = 0u32;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        consecutive_errors = 0;
                        let instance = Arc::clone(&instance);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service_instance = Arc::clone(&instance);
                            let service = service_fn(move |req| {
                                let instance = Arc::clone(&service_instance);
                                async move { handle_request(req, instance, addr).await }
                            });
                            let conn = http1::Builder::new().serve_connection(io, service);
                            tokio::pin!(conn);
                            let result = tokio::select! {
                                result = conn.as_mut() => result,
                                _ = shutdown.cancelled() => {
                                    conn.as_mut().graceful_shutdown();
                                    conn.await
                                }
                            };
                            if let Err(e) = result {
                                debug!("Connection error on port {}: {}", port, e);
                            }
                        });
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        error!("Accept error on port {}: {}", port, e);
                        if consecutive_errors >= MAX_ACCEPT_ERRORS {
                            instance.fail(&format!("listener failed: {e}"));
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("Server '{}' on port {} shutting down", instance.name(), port);
                break;
            }
        }
    }
}
