//! The gateway facade.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use waygate_access::{SystemToolPolicy, ToolVisibility, VisibilityDelta, system};
use waygate_audit::{AuditEntry, AuditLog, ReasoningSignature};
use waygate_capabilities::{CallContext, CapabilityLedger, LedgerSecret};
use waygate_core::{
    AccessDecision, MemoryLevel, QualifiedToolName, RoleId, ServerId, SessionId, SkillManifest,
};
use waygate_identity::{AgentIdentity, IdentityResolver, Resolution, ResolverConfig};
use waygate_mcp::{
    BackendSupervisor, DispatcherRegistry, JsonRpcNotification, RequestRouter, ToolDispatcher,
    UpstreamEvent,
};
use waygate_quota::{QuotaDecision, RateLimiter};
use waygate_skills::{MemoryGrant, RoleTable, compile};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::memory::{InMemoryMemoryStore, MemoryStore};
use crate::subagent::{SubAgentRequest, SubAgentSpawner};

type NotificationSender = Box<dyn Fn(JsonRpcNotification) + Send + Sync>;
type DeltaHook = Box<dyn Fn(&VisibilityDelta) + Send + Sync>;

/// Builder wiring optional seams before the gateway is shared.
pub struct GatewayBuilder {
    config: GatewayConfig,
    memory: Option<Arc<dyn MemoryStore>>,
    subagent: Option<Arc<dyn SubAgentSpawner>>,
}

impl GatewayBuilder {
    /// Start a builder from static configuration.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            memory: None,
            subagent: None,
        }
    }

    /// Use a custom memory store instead of the in-memory default.
    #[must_use]
    pub fn memory_store(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Register a sub-agent spawner; makes `spawn_sub_agent` visible.
    #[must_use]
    pub fn subagent_spawner(mut self, spawner: Arc<dyn SubAgentSpawner>) -> Self {
        self.subagent = Some(spawner);
        self
    }

    /// Build the gateway. The returned receiver carries backend
    /// events; hand it to [`Gateway::spawn_event_pump`].
    #[must_use]
    pub fn build(
        self,
    ) -> (
        Arc<Gateway>,
        tokio::sync::mpsc::UnboundedReceiver<UpstreamEvent>,
    ) {
        let mut config = self.config;
        config.apply_env();

        let (supervisor, events) = BackendSupervisor::new();
        let router = Arc::new(RequestRouter::new(Arc::clone(&supervisor)));

        let ledger = match &config.capability_secret {
            Some(secret) => match LedgerSecret::from_bytes(
                secret.clone().into_bytes(),
                config.strict_identity,
            ) {
                Ok(secret) => CapabilityLedger::new(secret),
                Err(e) => {
                    warn!(error = %e, "rejecting configured capability secret; generating one");
                    CapabilityLedger::with_generated_secret()
                },
            },
            None => CapabilityLedger::with_generated_secret(),
        };

        let policy = SystemToolPolicy {
            assigned_identity_mode: config.assigned_identity_mode,
            subagent_enabled: self.subagent.is_some(),
        };
        let resolver = IdentityResolver::new(ResolverConfig {
            default_role: config.default_role.clone(),
            reject_unknown: config.reject_unknown,
            strict: config.strict_identity,
        });

        let gateway = Arc::new(Gateway {
            session_id: SessionId::new(),
            audit: Arc::new(AuditLog::with_capacity(config.audit_capacity)),
            supervisor,
            router,
            dispatchers: DispatcherRegistry::new(),
            roles: RwLock::new(RoleTable::new()),
            visibility: Mutex::new(ToolVisibility::new(policy)),
            resolver: RwLock::new(resolver),
            ledger,
            limiter: RateLimiter::new(config.quotas.clone()),
            memory: self
                .memory
                .unwrap_or_else(|| Arc::new(InMemoryMemoryStore::new())),
            subagent: self.subagent,
            pending_reasoning: Mutex::new(None),
            notify: Mutex::new(None),
            on_tools_changed: Mutex::new(None),
            trusted: AtomicBool::new(false),
            task_id: Mutex::new(None),
            config,
        });
        (gateway, events)
    }
}

/// The capability-scoped routing gateway. One instance per process.
pub struct Gateway {
    session_id: SessionId,
    config: GatewayConfig,
    supervisor: Arc<BackendSupervisor>,
    router: Arc<RequestRouter>,
    dispatchers: DispatcherRegistry,
    roles: RwLock<RoleTable>,
    visibility: Mutex<ToolVisibility>,
    resolver: RwLock<IdentityResolver>,
    ledger: CapabilityLedger,
    limiter: RateLimiter,
    audit: Arc<AuditLog>,
    memory: Arc<dyn MemoryStore>,
    subagent: Option<Arc<dyn SubAgentSpawner>>,
    pending_reasoning: Mutex<Option<ReasoningSignature>>,
    notify: Mutex<Option<NotificationSender>>,
    on_tools_changed: Mutex<Option<DeltaHook>>,
    trusted: AtomicBool,
    task_id: Mutex<Option<String>>,
}

impl Gateway {
    /// Create a gateway with default seams. The returned receiver
    /// carries backend events; hand it to
    /// [`Gateway::spawn_event_pump`].
    #[must_use]
    pub fn new(
        config: GatewayConfig,
    ) -> (
        Arc<Self>,
        tokio::sync::mpsc::UnboundedReceiver<UpstreamEvent>,
    ) {
        GatewayBuilder::new(config).build()
    }

    /// Start a builder to wire custom seams.
    #[must_use]
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// The session id minted at construction.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The audit log.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The capability ledger.
    #[must_use]
    pub fn ledger(&self) -> &CapabilityLedger {
        &self.ledger
    }

    /// The backend supervisor (health, shutdown).
    #[must_use]
    pub fn supervisor(&self) -> &Arc<BackendSupervisor> {
        &self.supervisor
    }

    /// The active role, if one has been applied.
    #[must_use]
    pub fn current_role(&self) -> Option<RoleId> {
        self.visibility
            .lock()
            .ok()
            .and_then(|v| v.current_role().cloned())
    }

    /// Initialize in order: compile roles from skills, load identity
    /// rules from the same manifest, configure backends, optionally
    /// start them all, and apply the default role.
    ///
    /// # Errors
    ///
    /// Propagates identity-rule errors in strict mode. Backend spawn
    /// failures are tolerated here and surface via health state.
    pub async fn initialize(self: &Arc<Self>, manifest: &SkillManifest) -> GatewayResult<()> {
        let table = compile(manifest);
        info!(roles = table.role_ids().len(), skills = manifest.skills.len(), "compiled role table");
        if let Ok(mut roles) = self.roles.write() {
            *roles = table;
        }

        if let Ok(mut resolver) = self.resolver.write() {
            resolver.load_from_skills(manifest)?;
        }

        for (name, backend) in &self.config.backends.servers {
            match ServerId::new(name.clone()) {
                Ok(server) => {
                    self.supervisor.configure(server.clone(), backend.clone());
                    self.dispatchers.register(
                        server,
                        Arc::clone(&self.router) as Arc<dyn ToolDispatcher>,
                    );
                },
                Err(e) => warn!(server = %name, error = %e, "skipping backend with invalid id"),
            }
        }

        if self.config.start_all {
            for name in self.config.backends.servers.keys() {
                if let Ok(server) = ServerId::new(name.clone()) {
                    if let Err(e) = self.supervisor.start(&server).await {
                        warn!(server = %server, error = %e, "backend failed to start");
                    }
                }
            }
            self.refresh_tools().await;
        }

        let default_role = self.config.default_role.clone();
        if let Err(e) = self.apply_role(&default_role).await {
            debug!(role = %default_role, error = %e, "default role not applied");
        }
        Ok(())
    }

    /// Register a non-process tool source (the virtual HTTP adapter)
    /// under its prefix.
    pub fn register_virtual_server(&self, server: ServerId, dispatcher: Arc<dyn ToolDispatcher>) {
        self.dispatchers.register(server, dispatcher);
    }

    /// Resolve a declared identity, apply the resulting role, and
    /// remember the trust flag and task binding.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Identity`] in reject-unknown mode with
    /// no match, and [`GatewayError::RoleNotFound`] when the resolved
    /// role is not compiled.
    pub async fn connect(self: &Arc<Self>, identity: AgentIdentity) -> GatewayResult<Resolution> {
        let resolution = {
            let resolver = self
                .resolver
                .read()
                .map_err(|_| GatewayError::InvalidParams {
                    reason: "resolver poisoned".to_string(),
                })?;
            resolver.resolve(&identity)?
        };
        self.trusted.store(resolution.trusted, Ordering::SeqCst);
        if let Ok(mut task) = self.task_id.lock() {
            task.clone_from(&identity.task_id);
        }
        self.apply_role(&resolution.role).await?;
        info!(
            agent = %identity.name,
            role = %resolution.role,
            trusted = resolution.trusted,
            "identity connected"
        );
        Ok(resolution)
    }

    /// Set the reasoning signature attached to the NEXT audit entry.
    /// The slot is cleared on use.
    pub fn set_reasoning_context(&self, signature: ReasoningSignature) {
        if let Ok(mut slot) = self.pending_reasoning.lock() {
            *slot = Some(signature);
        }
    }

    /// Install the outbound notification sender (the serving loop's
    /// write half).
    pub fn set_notification_sender(
        &self,
        sender: impl Fn(JsonRpcNotification) + Send + Sync + 'static,
    ) {
        if let Ok(mut slot) = self.notify.lock() {
            *slot = Some(Box::new(sender));
        }
    }

    /// Install a hook observing visibility deltas (tests, metrics).
    pub fn on_tools_changed(&self, hook: impl Fn(&VisibilityDelta) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_tools_changed.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    /// Spawn the hourly capability-ledger cleanup.
    pub fn spawn_ledger_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
            interval.tick().await;
            loop {
                interval.tick().await;
                let dropped = gateway.ledger.cleanup();
                if dropped > 0 {
                    debug!(dropped, "capability ledger cleanup");
                }
            }
        })
    }

    /// Pump backend events: relay notifications to the client and
    /// refresh the tool table when a backend reports changes or
    /// becomes ready.
    pub fn spawn_event_pump(
        self: &Arc<Self>,
        mut events: tokio::sync::mpsc::UnboundedReceiver<UpstreamEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    UpstreamEvent::Notification {
                        server,
                        notification,
                    } => {
                        if notification.method.ends_with("tools/list_changed") {
                            let delta = gateway.refresh_tools().await;
                            gateway.emit_tools_changed(&delta);
                        } else {
                            debug!(server = %server, method = %notification.method, "relaying backend notification");
                            gateway.send_notification(notification);
                        }
                    },
                    UpstreamEvent::StateChanged { server, state } => {
                        debug!(server = %server, state = %state, "backend state changed");
                        if state == waygate_mcp::BackendState::Ready {
                            let delta = gateway.refresh_tools().await;
                            gateway.emit_tools_changed(&delta);
                        }
                    },
                }
            }
        })
    }

    /// Re-list tools from every dispatcher and rebuild the all-tools
    /// map. Returns the merged visibility delta.
    pub async fn refresh_tools(&self) -> VisibilityDelta {
        let mut by_server: HashMap<String, Vec<waygate_mcp::ToolDefinition>> = HashMap::new();
        for dispatcher in self.dispatchers.unique_dispatchers() {
            match dispatcher.list_tools().await {
                Ok(definitions) => {
                    for definition in definitions {
                        by_server
                            .entry(definition.server.clone())
                            .or_default()
                            .push(definition);
                    }
                },
                Err(e) => warn!(error = %e, "dispatcher failed to list tools"),
            }
        }

        let mut merged = VisibilityDelta::default();
        if let Ok(mut visibility) = self.visibility.lock() {
            for (server, tools) in by_server {
                let Ok(server) = ServerId::new(server) else {
                    continue;
                };
                let delta = visibility.record_server_tools(&server, tools);
                merged.added.extend(delta.added);
                merged.removed.extend(delta.removed);
            }
        }
        // A tool that moved between snapshots is not a change.
        let both: Vec<String> = merged
            .added
            .intersection(&merged.removed)
            .cloned()
            .collect();
        for name in both {
            merged.added.remove(&name);
            merged.removed.remove(&name);
        }
        merged
    }

    /// Switch the active role: start the backends it needs, refresh
    /// the tool table, recompute visibility, and emit one
    /// tools-changed notification when the visible set changed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RoleNotFound`] for uncompiled roles.
    pub async fn apply_role(self: &Arc<Self>, role: &RoleId) -> GatewayResult<VisibilityDelta> {
        let effective = {
            let roles = self.roles.read().map_err(|_| GatewayError::RoleNotFound {
                role: role.to_string(),
            })?;
            roles
                .effective(role)
                .map_err(|_| GatewayError::RoleNotFound {
                    role: role.to_string(),
                })?
        };

        // Lazy backend startup: a role's first use starts what it
        // needs (start-all mode already started everything).
        if !self.config.start_all {
            let needed: Vec<ServerId> = match &effective.servers {
                waygate_core::ServerScope::All => self
                    .config
                    .backends
                    .servers
                    .keys()
                    .filter_map(|name| ServerId::new(name.clone()).ok())
                    .collect(),
                waygate_core::ServerScope::Listed(set) => set
                    .iter()
                    .filter(|server| self.supervisor.is_configured(server))
                    .cloned()
                    .collect(),
            };
            for server in needed {
                if let Err(e) = self.supervisor.start(&server).await {
                    warn!(server = %server, error = %e, "backend failed to start for role");
                }
            }
        }

        self.refresh_tools().await;
        let delta = self
            .visibility
            .lock()
            .map(|mut visibility| visibility.set_current_role(effective))
            .unwrap_or_default();
        info!(role = %role, added = delta.added.len(), removed = delta.removed.len(), "role applied");
        self.emit_tools_changed(&delta);
        Ok(delta)
    }

    fn emit_tools_changed(&self, delta: &VisibilityDelta) {
        if delta.is_empty() {
            return;
        }
        if let Ok(hook) = self.on_tools_changed.lock() {
            if let Some(hook) = hook.as_ref() {
                hook(delta);
            }
        }
        self.send_notification(JsonRpcNotification::new(
            "notifications/tools/list_changed",
            Some(serde_json::json!({
                "added": delta.added.iter().collect::<Vec<_>>(),
                "removed": delta.removed.iter().collect::<Vec<_>>(),
            })),
        ));
    }

    fn send_notification(&self, notification: JsonRpcNotification) {
        if let Ok(sender) = self.notify.lock() {
            if let Some(sender) = sender.as_ref() {
                sender(notification);
            }
        }
    }

    /// Handle one client request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MethodNotFound`] for unknown methods and
    /// the specific error of each handler otherwise.
    pub async fn handle_request(self: &Arc<Self>, method: &str, params: Value) -> GatewayResult<Value> {
        match method {
            "tools/list" => {
                let tools: Vec<Value> = self
                    .visibility
                    .lock()
                    .map(|v| v.visible_tools())
                    .unwrap_or_default()
                    .iter()
                    .map(waygate_mcp::ToolDefinition::to_wire)
                    .collect();
                Ok(serde_json::json!({ "tools": tools }))
            },
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::InvalidParams {
                        reason: "tools/call requires a name".to_string(),
                    })?
                    .to_string();
                let args = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                let token = params
                    .get("capabilityToken")
                    .and_then(Value::as_str)
                    .map(String::from);
                self.call_tool(&name, args, token.as_deref()).await
            },
            "resources/list" => Ok(self.router.list_resources().await),
            "resources/read" => {
                let uri = params.get("uri").cloned().ok_or_else(|| {
                    GatewayError::InvalidParams {
                        reason: "resources/read requires a uri".to_string(),
                    }
                })?;
                let body = serde_json::json!({ "uri": uri });
                match params.get("server").and_then(Value::as_str) {
                    Some(server) => {
                        let server =
                            ServerId::new(server).map_err(waygate_mcp::McpError::from)?;
                        Ok(self
                            .router
                            .targeted(&server, "resources/read", Some(body))
                            .await?)
                    },
                    None => Ok(self.router.forward_default("resources/read", Some(body)).await?),
                }
            },
            "prompts/list" => Ok(self.router.forward_default("prompts/list", None).await?),
            "prompts/get" => {
                let mut body = params.clone();
                let server = params.get("server").and_then(Value::as_str).map(String::from);
                if let Some(object) = body.as_object_mut() {
                    object.remove("server");
                }
                match server {
                    Some(server) => {
                        let server =
                            ServerId::new(server).map_err(waygate_mcp::McpError::from)?;
                        Ok(self.router.targeted(&server, "prompts/get", Some(body)).await?)
                    },
                    None => Ok(self.router.forward_default("prompts/get", Some(body)).await?),
                }
            },
            other => Err(GatewayError::MethodNotFound {
                method: other.to_string(),
            }),
        }
    }

    /// The gated tool-call path: visibility, quota, capability,
    /// dispatch, audit. Exactly one audit entry per call.
    ///
    /// # Errors
    ///
    /// Denials return [`GatewayError::CallDenied`] with a stable kind;
    /// upstream failures return the transport error.
    pub async fn call_tool(
        self: &Arc<Self>,
        name: &str,
        args: Value,
        token: Option<&str>,
    ) -> GatewayResult<Value> {
        let thinking = self
            .pending_reasoning
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        let role = self
            .current_role()
            .unwrap_or_else(|| RoleId::new("(none)"));
        let session_key = self.session_id.0.to_string();
        let server = QualifiedToolName::parse(name)
            .map(|qualified| qualified.server.to_string())
            .unwrap_or_default();

        // 1. Visibility gate.
        let decision = self
            .visibility
            .lock()
            .map(|v| v.check_access(name))
            .unwrap_or_else(|_| AccessDecision::error("internal", "visibility engine poisoned"));
        match decision {
            AccessDecision::Allowed => {},
            AccessDecision::Denied { kind, reason } => {
                self.audit_denied(&role, name, &server, &args, &reason, thinking);
                return Err(GatewayError::CallDenied {
                    kind,
                    reason,
                    retry_after_ms: None,
                });
            },
            AccessDecision::Error { kind, reason } => {
                self.audit_error(&role, name, &server, &args, &reason, thinking);
                return Err(GatewayError::CallDenied {
                    kind,
                    reason,
                    retry_after_ms: None,
                });
            },
        }

        // 2. Quota gate.
        if let QuotaDecision::Denied {
            window,
            retry_after_ms,
            tool_scoped,
        } = self.limiter.check(&session_key, &role, name)
        {
            let reason = if tool_scoped {
                format!("rate limit exceeded for tool {name} in the {window} window")
            } else {
                format!("rate limit exceeded for role {role} in the {window} window")
            };
            self.audit_denied(&role, name, &server, &args, &reason, thinking);
            return Err(GatewayError::CallDenied {
                kind: "rate_limit_exceeded".to_string(),
                reason,
                retry_after_ms: Some(retry_after_ms),
            });
        }

        // 3. Capability gate (only when a token is presented).
        if let Some(token) = token {
            let call = CallContext {
                task_id: self.task_id.lock().ok().and_then(|t| t.clone()),
                tool_name: Some(name.to_string()),
                server_name: if server.is_empty() {
                    None
                } else {
                    Some(server.clone())
                },
            };
            let verified = self
                .ledger
                .verify_with_context(token, None, &call)
                .and_then(|payload| {
                    self.ledger.consume(&payload.jti)?;
                    Ok(payload)
                });
            if let Err(e) = verified {
                let reason = e.to_string();
                self.audit_denied(&role, name, &server, &args, &reason, thinking);
                return Err(GatewayError::CallDenied {
                    kind: "capability_invalid".to_string(),
                    reason,
                    retry_after_ms: None,
                });
            }
        }

        // Admitted: consume quota, dispatch, audit the outcome.
        self.limiter.consume(&session_key, &role, name);
        self.limiter.start_concurrent(&session_key);
        let started = std::time::Instant::now();
        let outcome = if system::is_system_tool(name) {
            self.call_system_tool(name, &args).await
        } else {
            self.dispatch_upstream(name, args.clone()).await
        };
        self.limiter.end_concurrent(&session_key);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(result) => {
                let mut entry = AuditEntry::allowed(
                    self.session_id.clone(),
                    role,
                    name,
                    server,
                    args,
                    duration_ms,
                );
                if let Some(thinking) = thinking {
                    entry = entry.with_thinking(thinking);
                }
                self.audit.append(entry);
                Ok(result)
            },
            Err(e) => {
                self.audit_error(&role, name, &server, &args, &e.to_string(), thinking);
                Err(e)
            },
        }
    }

    async fn dispatch_upstream(&self, name: &str, args: Value) -> GatewayResult<Value> {
        let qualified =
            QualifiedToolName::parse(name).map_err(|_| waygate_mcp::McpError::NoUpstreamForTool {
                name: name.to_string(),
            })?;
        let dispatcher = self.dispatchers.get(&qualified.server).ok_or_else(|| {
            waygate_mcp::McpError::NoUpstreamForTool {
                name: name.to_string(),
            }
        })?;
        Ok(dispatcher
            .execute(&qualified.server, &qualified.tool, args)
            .await?)
    }

    async fn call_system_tool(self: &Arc<Self>, name: &str, args: &Value) -> GatewayResult<Value> {
        match name {
            system::SET_ROLE => {
                let role = args
                    .get("role")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::InvalidParams {
                        reason: "set_role requires a role".to_string(),
                    })?;
                let delta = self.apply_role(&RoleId::new(role)).await?;
                Ok(serde_json::json!({
                    "role": role,
                    "added": delta.added.iter().collect::<Vec<_>>(),
                    "removed": delta.removed.iter().collect::<Vec<_>>(),
                }))
            },
            system::SAVE_MEMORY => {
                let key = require_str(args, "key")?;
                let content = require_str(args, "content")?;
                let store = self.own_store()?;
                self.memory.save(&store, key, content).await?;
                Ok(serde_json::json!({"saved": true, "store": store, "key": key}))
            },
            system::RECALL_MEMORY => {
                let query = require_str(args, "query")?;
                let stores = self.readable_stores().await?;
                let hits = self.memory.search(&stores, query).await?;
                Ok(serde_json::json!({
                    "hits": hits.iter().map(|hit| serde_json::json!({
                        "store": hit.store,
                        "key": hit.key,
                        "content": hit.content,
                    })).collect::<Vec<_>>()
                }))
            },
            system::LIST_MEMORIES => {
                let stores = self.readable_stores().await?;
                let entries = self.memory.list(&stores).await?;
                Ok(serde_json::json!({
                    "memories": entries.iter().map(|hit| serde_json::json!({
                        "store": hit.store,
                        "key": hit.key,
                    })).collect::<Vec<_>>()
                }))
            },
            system::GET_CONTEXT => {
                let (role, visible) = self
                    .visibility
                    .lock()
                    .map(|v| {
                        (
                            v.current_role().map(ToString::to_string),
                            v.visible_count(),
                        )
                    })
                    .unwrap_or((None, 0));
                Ok(serde_json::json!({
                    "sessionId": self.session_id.0.to_string(),
                    "role": role,
                    "trusted": self.trusted.load(Ordering::SeqCst),
                    "visibleTools": visible,
                    "assignedIdentityMode": self.config.assigned_identity_mode,
                }))
            },
            system::LIST_ROLES => {
                let roles = self
                    .roles
                    .read()
                    .map(|table| table.role_ids())
                    .unwrap_or_default();
                Ok(serde_json::json!({
                    "roles": roles.iter().map(ToString::to_string).collect::<Vec<_>>()
                }))
            },
            system::SPAWN_SUB_AGENT => {
                let Some(spawner) = &self.subagent else {
                    return Err(GatewayError::CallDenied {
                        kind: "tool_not_accessible".to_string(),
                        reason: "no sub-agent spawner is registered".to_string(),
                        retry_after_ms: None,
                    });
                };
                let task = require_str(args, "task")?.to_string();
                let role = args
                    .get("role")
                    .and_then(Value::as_str)
                    .map(RoleId::new);
                let parent_task_id = self.task_id.lock().ok().and_then(|t| t.clone());
                spawner
                    .spawn(SubAgentRequest {
                        task,
                        role,
                        parent_task_id,
                    })
                    .await
            },
            other => Err(GatewayError::MethodNotFound {
                method: other.to_string(),
            }),
        }
    }

    /// The active role's own memory store name.
    fn own_store(&self) -> GatewayResult<String> {
        self.current_role()
            .map(|role| role.to_string())
            .ok_or_else(|| GatewayError::InvalidParams {
                reason: "no active role".to_string(),
            })
    }

    /// The stores the active role may read, per its memory grant.
    async fn readable_stores(&self) -> GatewayResult<Vec<String>> {
        let own = self.own_store()?;
        let grant: MemoryGrant = self
            .visibility
            .lock()
            .map(|v| v.effective_memory())
            .unwrap_or_default();
        Ok(match grant.level {
            MemoryLevel::All => {
                let mut stores = self.memory.store_names().await;
                if !stores.contains(&own) {
                    stores.push(own);
                }
                stores
            },
            MemoryLevel::Team => {
                let mut stores = vec![own];
                stores.extend(grant.team_roles.iter().map(ToString::to_string));
                stores
            },
            _ => vec![own],
        })
    }

    fn audit_denied(
        &self,
        role: &RoleId,
        tool: &str,
        server: &str,
        args: &Value,
        reason: &str,
        thinking: Option<ReasoningSignature>,
    ) {
        let mut entry = AuditEntry::denied(
            self.session_id.clone(),
            role.clone(),
            tool,
            server,
            args.clone(),
            reason,
        );
        if let Some(thinking) = thinking {
            entry = entry.with_thinking(thinking);
        }
        self.audit.append(entry);
    }

    fn audit_error(
        &self,
        role: &RoleId,
        tool: &str,
        server: &str,
        args: &Value,
        reason: &str,
        thinking: Option<ReasoningSignature>,
    ) {
        let mut entry = AuditEntry::error(
            self.session_id.clone(),
            role.clone(),
            tool,
            server,
            args.clone(),
            reason,
        );
        if let Some(thinking) = thinking {
            entry = entry.with_thinking(thinking);
        }
        self.audit.append(entry);
    }

    /// Stop every backend and release their tables.
    pub async fn shutdown(&self) {
        self.supervisor.stop_all().await;
    }
}

fn require_str<'a>(args: &'a Value, field: &str) -> GatewayResult<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidParams {
            reason: format!("missing required field: {field}"),
        })
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("session", &self.session_id)
            .field("role", &self.current_role())
            .finish_non_exhaustive()
    }
}
