//! Backend child-process supervision.
//!
//! Each configured backend is spawned with piped stdio and supervised
//! for its whole life: stdout is framed by newline and decoded into
//! JSON-RPC frames, stderr is classified and logged, and a child that
//! dies is restarted after a fixed backoff. The MCP initialize
//! handshake gates the `ready` state.

use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use waygate_core::ServerId;

use crate::config::BackendConfig;
use crate::error::{McpError, McpResult};
use crate::protocol::{
    JsonRpcNotification, JsonRpcRequest, LATEST_PROTOCOL_VERSION, RpcFrame,
};
use crate::router::{PendingMap, UpstreamEvent};

/// How long the initialize handshake may take before the concession
/// applies.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed delay before a dead child is restarted.
const RESTART_BACKOFF: Duration = Duration::from_secs(3);

/// Grace period between SIGTERM and SIGKILL during shutdown.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Correlation id reserved for the initialize handshake.
const HANDSHAKE_ID: i64 = 0;

/// Lifecycle state of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    /// Known but never started.
    Configured,
    /// Child process being spawned.
    Starting,
    /// Spawned, awaiting the initialize response.
    Handshaking,
    /// Handshake complete (or conceded); requests may be routed.
    Ready,
    /// Spawn or handshake failed.
    Failed,
    /// The child exited; a restart may be pending.
    Stopped,
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configured => f.write_str("configured"),
            Self::Starting => f.write_str("starting"),
            Self::Handshaking => f.write_str("handshaking"),
            Self::Ready => f.write_str("ready"),
            Self::Failed => f.write_str("failed"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Point-in-time health of one backend.
#[derive(Debug, Clone)]
pub struct BackendHealth {
    /// The backend's server id.
    pub server: ServerId,
    /// Its current lifecycle state.
    pub state: BackendState,
    /// How many times the child has been (re)spawned.
    pub spawn_count: u64,
}

/// One supervised backend.
struct Backend {
    id: ServerId,
    config: BackendConfig,
    state: RwLock<BackendState>,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
    /// Bumped on every spawn; stale reader tasks compare against it.
    generation: AtomicU64,
}

impl Backend {
    fn state(&self) -> BackendState {
        self.state.read().map(|s| *s).unwrap_or(BackendState::Failed)
    }

    fn set_state(&self, next: BackendState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }
}

/// Spawns, supervises, and reaps backend child processes.
pub struct BackendSupervisor {
    backends: RwLock<HashMap<ServerId, Arc<Backend>>>,
    pending: Arc<PendingMap>,
    events: tokio::sync::mpsc::UnboundedSender<UpstreamEvent>,
    shutting_down: AtomicBool,
}

impl BackendSupervisor {
    /// Create a supervisor. The returned receiver yields relayed
    /// backend notifications and state changes; take it once.
    #[must_use]
    pub fn new() -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<UpstreamEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let supervisor = Arc::new(Self {
            backends: RwLock::new(HashMap::new()),
            pending: Arc::new(PendingMap::new()),
            events: tx,
            shutting_down: AtomicBool::new(false),
        });
        (supervisor, rx)
    }

    /// The shared correlation map (used by the router).
    #[must_use]
    pub(crate) fn pending(&self) -> Arc<PendingMap> {
        Arc::clone(&self.pending)
    }

    /// Register a backend without starting it.
    pub fn configure(&self, server: ServerId, config: BackendConfig) {
        let backend = Arc::new(Backend {
            id: server.clone(),
            config,
            state: RwLock::new(BackendState::Configured),
            stdin: Mutex::new(None),
            child: Mutex::new(None),
            generation: AtomicU64::new(0),
        });
        if let Ok(mut map) = self.backends.write() {
            map.insert(server, backend);
        }
    }

    /// Current state of one backend.
    #[must_use]
    pub fn state_of(&self, server: &ServerId) -> Option<BackendState> {
        self.backend(server).map(|b| b.state())
    }

    /// Whether a backend is configured at all.
    #[must_use]
    pub fn is_configured(&self, server: &ServerId) -> bool {
        self.backend(server).is_some()
    }

    /// Servers currently in the ready state.
    #[must_use]
    pub fn ready_servers(&self) -> Vec<ServerId> {
        self.backends
            .read()
            .map(|map| {
                map.values()
                    .filter(|b| b.state() == BackendState::Ready)
                    .map(|b| b.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Health snapshot of every configured backend.
    #[must_use]
    pub fn health(&self) -> Vec<BackendHealth> {
        self.backends
            .read()
            .map(|map| {
                map.values()
                    .map(|b| BackendHealth {
                        server: b.id.clone(),
                        state: b.state(),
                        spawn_count: b.generation.load(Ordering::Relaxed),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn backend(&self, server: &ServerId) -> Option<Arc<Backend>> {
        self.backends
            .read()
            .ok()
            .and_then(|map| map.get(server).cloned())
    }

    /// Start a backend if it is not already running.
    ///
    /// Spawns the child with a merged environment (ambient plus resolved
    /// `${VAR}` references), performs the initialize handshake, and
    /// marks the backend ready. A child that stays silent past the
    /// handshake timeout but is still alive is marked ready anyway;
    /// some backends never emit a startup marker.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ServerNotFound`] for unknown servers and
    /// [`McpError::SpawnFailed`] when the process cannot be created.
    pub fn start<'a>(
        self: &'a Arc<Self>,
        server: &'a ServerId,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = McpResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let backend = self.backend(server).ok_or_else(|| McpError::ServerNotFound {
                name: server.to_string(),
            })?;

            match backend.state() {
                BackendState::Starting | BackendState::Handshaking | BackendState::Ready => {
                    return Ok(());
                },
                _ => {},
            }
            backend.set_state(BackendState::Starting);

            let mut command = Command::new(&backend.config.command);
            command
                .args(&backend.config.args)
                .envs(backend.config.resolved_env())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            if let Some(cwd) = &backend.config.cwd {
                command.current_dir(cwd);
            }

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(source) => {
                    backend.set_state(BackendState::Failed);
                    self.emit_state(server, BackendState::Failed);
                    return Err(McpError::SpawnFailed {
                        name: server.to_string(),
                        source,
                    });
                },
            };

            let generation = backend.generation.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            info!(server = %server, pid = ?child.id(), "spawned backend");

            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let stdin = child.stdin.take();

            *backend.stdin.lock().await = stdin;
            *backend.child.lock().await = Some(child);

            if let Some(stderr) = stderr {
                tokio::spawn(stderr_task(backend.id.clone(), stderr));
            }
            if let Some(stdout) = stdout {
                let supervisor = Arc::clone(self);
                let backend_for_reader = Arc::clone(&backend);
                tokio::spawn(async move {
                    reader_task(supervisor, backend_for_reader, generation, stdout).await;
                });
            }

            backend.set_state(BackendState::Handshaking);
            self.emit_state(server, BackendState::Handshaking);
            self.handshake(&backend).await?;
            Ok(())
        })
    }

    /// Perform the MCP initialize exchange against a freshly spawned
    /// child.
    async fn handshake(self: &Arc<Self>, backend: &Arc<Backend>) -> McpResult<()> {
        let rx = self.pending.register(backend.id.clone(), HANDSHAKE_ID);
        let request = JsonRpcRequest::new(
            HANDSHAKE_ID,
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": LATEST_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "waygate", "version": env!("CARGO_PKG_VERSION")},
            })),
        );
        if let Err(e) = self
            .write_message(&backend.id, &serde_json::to_value(&request)?)
            .await
        {
            self.pending.purge_one(&backend.id, HANDSHAKE_ID);
            backend.set_state(BackendState::Failed);
            self.emit_state(&backend.id, BackendState::Failed);
            return Err(e);
        }

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, rx).await {
            Ok(Ok(Ok(result))) => {
                debug!(
                    server = %backend.id,
                    version = %result.get("protocolVersion").and_then(serde_json::Value::as_str).unwrap_or("?"),
                    "handshake complete"
                );
            },
            Ok(Ok(Err(e))) => {
                warn!(server = %backend.id, error = %e, "initialize rejected by backend");
                backend.set_state(BackendState::Failed);
                self.emit_state(&backend.id, BackendState::Failed);
                return Err(e);
            },
            Ok(Err(_)) | Err(_) => {
                // Timeout or the channel was dropped by a purge. If the
                // process is alive we proceed anyway: some backends
                // never answer initialize.
                self.pending.purge_one(&backend.id, HANDSHAKE_ID);
                if self.child_alive(backend).await {
                    warn!(server = %backend.id, "handshake timed out; marking ready best-effort");
                } else {
                    backend.set_state(BackendState::Failed);
                    self.emit_state(&backend.id, BackendState::Failed);
                    return Err(McpError::UpstreamDisconnected {
                        server: backend.id.to_string(),
                    });
                }
            },
        }

        let initialized = JsonRpcNotification::new("notifications/initialized", None);
        self.write_message(&backend.id, &serde_json::to_value(&initialized)?)
            .await?;
        backend.set_state(BackendState::Ready);
        self.emit_state(&backend.id, BackendState::Ready);
        info!(server = %backend.id, "backend ready");
        Ok(())
    }

    async fn child_alive(&self, backend: &Arc<Backend>) -> bool {
        let mut guard = backend.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Write one JSON value as a line to a backend's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ServerNotFound`] or [`McpError::WriteFailed`].
    pub(crate) async fn write_message(&self, server: &ServerId, message: &Value) -> McpResult<()> {
        let backend = self.backend(server).ok_or_else(|| McpError::ServerNotFound {
            name: server.to_string(),
        })?;
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut guard = backend.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| McpError::ServerNotReady {
            name: server.to_string(),
            state: backend.state().to_string(),
        })?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|source| McpError::WriteFailed {
                name: server.to_string(),
                source,
            })?;
        stdin.flush().await.map_err(|source| McpError::WriteFailed {
            name: server.to_string(),
            source,
        })
    }

    /// Called by the reader task when a child's stdout closes.
    async fn on_child_exit(self: Arc<Self>, backend: Arc<Backend>, generation: u64) {
        if backend.generation.load(Ordering::SeqCst) != generation {
            // A newer spawn owns this backend now.
            return;
        }
        let was_failed = backend.state() == BackendState::Failed;
        if !was_failed {
            backend.set_state(BackendState::Stopped);
        }

        // Reap the child so it does not linger as a zombie.
        if let Some(mut child) = backend.child.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), child.wait()).await;
        }
        *backend.stdin.lock().await = None;

        let rejected = self.pending.purge_server(&backend.id);
        if rejected > 0 {
            warn!(server = %backend.id, count = rejected, "rejected in-flight requests on disconnect");
        }
        self.emit_state(&backend.id, backend.state());

        if was_failed || self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        info!(server = %backend.id, backoff = ?RESTART_BACKOFF, "scheduling restart");
        let supervisor = Arc::clone(&self);
        let server = backend.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESTART_BACKOFF).await;
            if supervisor.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            if supervisor.state_of(&server) == Some(BackendState::Stopped) {
                if let Err(e) = supervisor.start(&server).await {
                    warn!(server = %server, error = %e, "supervised restart failed");
                }
            }
        });
    }

    /// Stop every backend: SIGTERM, wait up to the grace period, then
    /// SIGKILL survivors. Clears all supervisor tables.
    pub async fn stop_all(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let backends: Vec<Arc<Backend>> = self
            .backends
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();

        for backend in backends {
            backend.set_state(BackendState::Stopped);
            let mut guard = backend.child.lock().await;
            if let Some(mut child) = guard.take() {
                terminate(&mut child);
                match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                    Ok(_) => {},
                    Err(_) => {
                        warn!(server = %backend.id, "backend ignored SIGTERM; killing");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    },
                }
            }
            *backend.stdin.lock().await = None;
            self.pending.purge_server(&backend.id);
        }

        if let Ok(mut map) = self.backends.write() {
            map.clear();
        }
        self.pending.clear();
        info!("all backends stopped");
    }

    fn emit_state(&self, server: &ServerId, state: BackendState) {
        let _ = self.events.send(UpstreamEvent::StateChanged {
            server: server.clone(),
            state,
        });
    }

    pub(crate) fn emit_event(&self, event: UpstreamEvent) {
        let _ = self.events.send(event);
    }
}

/// Ask a child to exit politely. On unix this is SIGTERM; elsewhere we
/// go straight to the hard kill.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        #[allow(clippy::cast_possible_wrap)]
        if let Some(pid) = child.id() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
            return;
        }
    }
    let _ = child.start_kill();
}

/// Read a child's stdout line by line and dispatch decoded frames.
/// Incomplete trailing data stays in the reader's buffer until the next
/// newline arrives.
async fn reader_task(
    supervisor: Arc<BackendSupervisor>,
    backend: Arc<Backend>,
    generation: u64,
    stdout: tokio::process::ChildStdout,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_line(&supervisor, &backend.id, line);
            },
            Ok(None) => break,
            Err(e) => {
                debug!(server = %backend.id, error = %e, "stdout read error");
                break;
            },
        }
    }
    debug!(server = %backend.id, "stdout closed");
    supervisor.on_child_exit(backend, generation).await;
}

fn handle_line(supervisor: &Arc<BackendSupervisor>, server: &ServerId, line: &str) {
    match RpcFrame::decode(line) {
        Err(_) => {
            debug!(server = %server, line = %line, "discarding non-JSON line");
        },
        Ok(None) => {
            debug!(server = %server, "discarding non-JSON-RPC message");
        },
        Ok(Some(RpcFrame::Response(response))) => {
            supervisor.pending().resolve(server, &response);
        },
        Ok(Some(RpcFrame::Request(request))) => {
            // Server-initiated requests (sampling etc.) are not part of
            // the routed surface.
            debug!(server = %server, method = %request.method, "dropping backend-initiated request");
        },
        Ok(Some(RpcFrame::Notification(notification))) => {
            let unwrapped = unwrap_notification(notification);
            supervisor.emit_event(UpstreamEvent::Notification {
                server: server.clone(),
                notification: unwrapped,
            });
        },
    }
}

/// Unwrap a `$/notification` envelope one level.
fn unwrap_notification(notification: JsonRpcNotification) -> JsonRpcNotification {
    if notification.method != "$/notification" {
        return notification;
    }
    let Some(params) = notification.params.as_ref() else {
        return notification;
    };
    let Some(method) = params.get("method").and_then(Value::as_str) else {
        return notification;
    };
    JsonRpcNotification::new(method.to_string(), params.get("params").cloned())
}

/// Classify and log a child's stderr output.
async fn stderr_task(server: ServerId, stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let lowered = line.to_lowercase();
        if lowered.contains("error") || lowered.contains("fail") {
            warn!(server = %server, line = %line, "backend stderr");
        } else {
            debug!(server = %server, line = %line, "backend stderr");
        }
    }
}
