use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier::EventClassifier;
use crate::context::{BotContext, DispatchSettings};
use crate::correlator::ReplyCorrelator;
use crate::dispatcher::dispatch_channel;
use crate::plugin::Plugin;
use crate::registry::{PluginRegistry, RegistryError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    NotRunning,
    Running,
    Stopping,
    Stopped,
}

impl RuntimeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRunning => "not_running",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// A bot whose plugins are still being registered.
pub struct Bot {
    context: BotContext,
    settings: DispatchSettings,
    registry: PluginRegistry,
    state: watch::Sender<RuntimeState>,
}

impl Bot {
    pub fn new(context: BotContext, settings: DispatchSettings) -> Self {
        let registry = PluginRegistry::new(context.clone(), settings.handler_buffer);
        let (state, _) = watch::channel(RuntimeState::NotRunning);
        Self { context, settings, registry, state }
    }

    pub fn context(&self) -> &BotContext {
        &self.context
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    pub async fn register(&mut self, plugin: Plugin) -> Result<(), RegistryError> {
        self.registry.register(plugin).await
    }

    /// Freezes the registry and launches the dispatch loop.
    pub fn start(self) -> RunningBot {
        let Self { context, settings, registry, state } = self;
        let registry = Arc::new(registry);
        let (dispatcher, handle) = dispatch_channel(registry.clone(), settings.inbound_buffer);
        let dispatch_loop = tokio::spawn(dispatcher.run(context.shutdown.clone()));

        let correlator = ReplyCorrelator::new(
            handle,
            context.api.clone(),
            settings.command_timeout,
            settings.webhook_timeout,
        );
        let classifier = Arc::new(EventClassifier::new(context.clone(), correlator.clone()));

        state.send_replace(RuntimeState::Running);
        info!(
            event_name = "dispatch.runtime.started",
            plugins = registry.plugin_ids().len(),
            commands = registry.command_names().len(),
            webhooks = registry.webhook_names().len(),
            interactions = registry.interaction_names().len(),
            hooks = registry.hook_count(),
            reaction_hooks = registry.reaction_hook_count(),
            "bot runtime started"
        );

        RunningBot {
            context,
            registry,
            correlator,
            classifier,
            dispatch_loop: Some(dispatch_loop),
            state,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainReport {
    /// False when some handler was still running when the grace period ran out.
    pub drained: bool,
}

/// A started bot: the dispatch loop and every handler worker are live.
pub struct RunningBot {
    context: BotContext,
    registry: Arc<PluginRegistry>,
    correlator: ReplyCorrelator,
    classifier: Arc<EventClassifier>,
    dispatch_loop: Option<JoinHandle<()>>,
    state: watch::Sender<RuntimeState>,
}

impl RunningBot {
    pub fn context(&self) -> &BotContext {
        &self.context
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn correlator(&self) -> &ReplyCorrelator {
        &self.correlator
    }

    pub fn classifier(&self) -> &Arc<EventClassifier> {
        &self.classifier
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<RuntimeState> {
        self.state.subscribe()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.context.shutdown.clone()
    }

    /// Resolves once anything fires the shutdown signal.
    pub async fn stopped(&self) {
        self.context.shutdown.cancelled().await;
    }

    /// Cancels everything and waits up to `grace` for the handler workers to exit.
    pub async fn drain(&mut self, grace: Duration) -> DrainReport {
        self.state.send_replace(RuntimeState::Stopping);
        self.context.shutdown.cancel();

        if let Some(dispatch_loop) = self.dispatch_loop.take() {
            if let Err(error) = dispatch_loop.await {
                warn!(error = %error, "dispatch loop ended abnormally");
            }
        }

        let workers = self.registry.workers();
        workers.close();
        let drained = tokio::time::timeout(grace, workers.wait()).await.is_ok();
        if drained {
            info!(event_name = "dispatch.runtime.drained", "handler workers drained");
        } else {
            warn!(
                event_name = "dispatch.runtime.drain_timed_out",
                remaining = workers.len(),
                grace_ms = grace.as_millis() as u64,
                "handler workers still running after grace period"
            );
        }
        DrainReport { drained }
    }

    /// Closes persistence and marks the runtime stopped. Call after [`RunningBot::drain`].
    pub async fn close(self) {
        self.context.store.close().await;
        self.state.send_replace(RuntimeState::Stopped);
        info!(event_name = "dispatch.runtime.stopped", "bot runtime stopped");
    }

    /// Cancel, drain, then close persistence.
    pub async fn shutdown(mut self, grace: Duration) -> DrainReport {
        let report = self.drain(grace).await;
        self.close().await;
        report
    }
}
