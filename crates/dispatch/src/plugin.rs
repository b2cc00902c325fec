use std::future::Future;

use futures::future::BoxFuture;
use hivebot_db::StoreError;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::helper::PluginHelper;
use crate::messages::{CommandMsg, HookMsg, InteractionMsg, ReactionMsg, WebhookMsg};

pub type HandlerFuture = BoxFuture<'static, ()>;

type Runner<M> = Box<dyn FnOnce(CancellationToken, mpsc::Receiver<M>) -> HandlerFuture + Send>;

type LoadHook = Box<dyn FnOnce(PluginHelper) -> BoxFuture<'static, Result<(), LoadError>> + Send>;

/// Failure reported by a plugin's load hook.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct LoadError(String);

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<StoreError> for LoadError {
    fn from(error: StoreError) -> Self {
        Self(error.to_string())
    }
}

/// One long-lived worker owned by a plugin.
///
/// The registry hands each handler its own bounded queue and the shutdown token; the handler
/// runs until the queue closes or the token fires.
pub struct Handler<M> {
    name: Option<String>,
    runner: Runner<M>,
}

impl<M: Send + 'static> Handler<M> {
    /// A routed handler that processes one message at a time.
    pub fn named<F, Fut>(name: impl Into<String>, on_message: F) -> Self
    where
        F: FnMut(M) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_loop(Some(name.into()), message_loop(on_message))
    }

    /// A fan-out handler (hooks and reaction hooks) that processes one message at a time.
    pub fn anonymous<F, Fut>(on_message: F) -> Self
    where
        F: FnMut(M) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_loop(None, message_loop(on_message))
    }

    /// A handler that drives its own receive loop.
    pub fn with_loop<F, Fut>(name: Option<String>, run: F) -> Self
    where
        F: FnOnce(CancellationToken, mpsc::Receiver<M>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runner: Runner<M> =
            Box::new(move |cancel: CancellationToken, inbox: mpsc::Receiver<M>| -> HandlerFuture {
                Box::pin(run(cancel, inbox))
            });
        Self { name, runner }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Runner<M>) {
        (self.name, self.runner)
    }
}

fn message_loop<M, F, Fut>(
    mut on_message: F,
) -> impl FnOnce(CancellationToken, mpsc::Receiver<M>) -> HandlerFuture + Send + 'static
where
    M: Send + 'static,
    F: FnMut(M) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    move |cancel: CancellationToken, mut inbox: mpsc::Receiver<M>| -> HandlerFuture {
        Box::pin(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    message = inbox.recv() => match message {
                        Some(message) => on_message(message).await,
                        None => break,
                    },
                }
            }
        })
    }
}

/// A plugin descriptor: an id plus the handlers it contributes.
pub struct Plugin {
    pub(crate) id: String,
    pub(crate) commands: Vec<Handler<CommandMsg>>,
    pub(crate) hooks: Vec<Handler<HookMsg>>,
    pub(crate) reaction_hooks: Vec<Handler<ReactionMsg>>,
    pub(crate) webhooks: Vec<Handler<WebhookMsg>>,
    pub(crate) interactions: Vec<Handler<InteractionMsg>>,
    pub(crate) load: Option<LoadHook>,
}

impl Plugin {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            commands: Vec::new(),
            hooks: Vec::new(),
            reaction_hooks: Vec::new(),
            webhooks: Vec::new(),
            interactions: Vec::new(),
            load: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(mut self, handler: Handler<CommandMsg>) -> Self {
        self.commands.push(handler);
        self
    }

    pub fn hook(mut self, handler: Handler<HookMsg>) -> Self {
        self.hooks.push(handler);
        self
    }

    pub fn reaction_hook(mut self, handler: Handler<ReactionMsg>) -> Self {
        self.reaction_hooks.push(handler);
        self
    }

    pub fn webhook(mut self, handler: Handler<WebhookMsg>) -> Self {
        self.webhooks.push(handler);
        self
    }

    pub fn interaction(mut self, handler: Handler<InteractionMsg>) -> Self {
        self.interactions.push(handler);
        self
    }

    /// Runs once at registration, after the plugin's namespace exists and before any handler
    /// starts. A failure aborts the registration.
    pub fn on_load<F, Fut>(mut self, load: F) -> Self
    where
        F: FnOnce(PluginHelper) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), LoadError>> + Send + 'static,
    {
        let hook: LoadHook = Box::new(
            move |helper: PluginHelper| -> BoxFuture<'static, Result<(), LoadError>> {
                Box::pin(load(helper))
            },
        );
        self.load = Some(hook);
        self
    }

    pub fn command_names(&self) -> Vec<&str> {
        handler_names(&self.commands)
    }

    pub fn webhook_names(&self) -> Vec<&str> {
        handler_names(&self.webhooks)
    }

    pub fn interaction_names(&self) -> Vec<&str> {
        handler_names(&self.interactions)
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len() + self.reaction_hooks.len()
    }
}

fn handler_names<M: Send + 'static>(handlers: &[Handler<M>]) -> Vec<&str> {
    handlers.iter().filter_map(|handler| handler.name()).collect()
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Plugin")
            .field("id", &self.id)
            .field("commands", &self.command_names())
            .field("hooks", &self.hooks.len())
            .field("reaction_hooks", &self.reaction_hooks.len())
            .field("webhooks", &self.webhook_names())
            .field("interactions", &self.interaction_names())
            .field("has_load", &self.load.is_some())
            .finish()
    }
}
