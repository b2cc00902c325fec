use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use hivebot_db::StoreError;
use hivebot_slack::events::{MessageEvent, ReactionAddedEvent};
use hivebot_slack::{InteractionCallback, SlashCommand};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::context::BotContext;
use crate::helper::PluginHelper;
use crate::messages::{
    CommandMsg, HookMsg, InteractionMsg, ReactionMsg, ReplySender, WebhookMsg, WebhookRequest,
    WebhookResponse,
};
use crate::plugin::{Handler, LoadError, Plugin};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid plugin: {0}")]
    InvalidPlugin(String),
    #[error("{kind} `{name}` is already registered")]
    DuplicateName { kind: &'static str, name: String },
    #[error("plugin `{plugin_id}` failed to load: {source}")]
    Load {
        plugin_id: String,
        #[source]
        source: LoadError,
    },
    #[error("could not initialize storage for plugin `{plugin_id}`: {source}")]
    Store {
        plugin_id: String,
        #[source]
        source: StoreError,
    },
}

/// The sending side of one running handler.
pub struct Route<M> {
    plugin_id: String,
    name: Option<String>,
    sender: mpsc::Sender<M>,
}

impl<M> Route<M> {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Never waits; a full or closed queue drops the message.
    fn deliver(&self, kind: &'static str, message: M) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    event_name = "dispatch.handler.queue_full",
                    plugin_id = %self.plugin_id,
                    handler = self.name.as_deref().unwrap_or("-"),
                    kind,
                    "handler queue full; dropping message"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(
                    event_name = "dispatch.handler.closed",
                    plugin_id = %self.plugin_id,
                    handler = self.name.as_deref().unwrap_or("-"),
                    kind,
                    "handler is no longer running; dropping message"
                );
                false
            }
        }
    }
}

/// Every registered plugin and the routes to its handlers.
///
/// Registration takes `&mut self`, so all plugins are registered before the registry is shared
/// with the dispatch loop; afterwards routing only reads.
pub struct PluginRegistry {
    context: BotContext,
    handler_buffer: usize,
    workers: TaskTracker,
    plugins: Vec<String>,
    commands: HashMap<String, Route<CommandMsg>>,
    webhooks: HashMap<String, Route<WebhookMsg>>,
    interactions: HashMap<String, Route<InteractionMsg>>,
    hooks: Vec<Route<HookMsg>>,
    reaction_hooks: Vec<Route<ReactionMsg>>,
}

impl PluginRegistry {
    pub fn new(context: BotContext, handler_buffer: usize) -> Self {
        Self {
            context,
            handler_buffer: handler_buffer.max(1),
            workers: TaskTracker::new(),
            plugins: Vec::new(),
            commands: HashMap::new(),
            webhooks: HashMap::new(),
            interactions: HashMap::new(),
            hooks: Vec::new(),
            reaction_hooks: Vec::new(),
        }
    }

    /// Validates every name, prepares the plugin's storage, runs its load hook, then starts its
    /// handlers. Nothing is registered unless every step succeeds.
    pub async fn register(&mut self, plugin: Plugin) -> Result<(), RegistryError> {
        let Plugin { id, commands, hooks, reaction_hooks, webhooks, interactions, load } = plugin;

        if id.trim().is_empty() {
            return Err(RegistryError::InvalidPlugin("plugin id must not be empty".to_owned()));
        }
        if self.plugins.contains(&id) {
            return Err(RegistryError::DuplicateName { kind: "plugin", name: id });
        }
        check_names(&id, "command", &commands, &self.commands)?;
        check_names(&id, "webhook", &webhooks, &self.webhooks)?;
        check_names(&id, "interaction", &interactions, &self.interactions)?;

        self.context
            .store
            .init_namespace(&id)
            .await
            .map_err(|source| RegistryError::Store { plugin_id: id.clone(), source })?;

        if let Some(load) = load {
            load(PluginHelper::new(&self.context, &id))
                .await
                .map_err(|source| RegistryError::Load { plugin_id: id.clone(), source })?;
        }

        for handler in commands {
            let route = self.spawn(&id, "command", handler);
            self.commands.insert(route_key(&route), route);
        }
        for handler in webhooks {
            let route = self.spawn(&id, "webhook", handler);
            self.webhooks.insert(route_key(&route), route);
        }
        for handler in interactions {
            let route = self.spawn(&id, "interaction", handler);
            self.interactions.insert(route_key(&route), route);
        }
        for handler in hooks {
            let route = self.spawn(&id, "hook", handler);
            self.hooks.push(route);
        }
        for handler in reaction_hooks {
            let route = self.spawn(&id, "reaction_hook", handler);
            self.reaction_hooks.push(route);
        }

        info!(
            event_name = "dispatch.plugin.registered",
            plugin_id = %id,
            commands = self.commands.values().filter(|route| route.plugin_id == id).count(),
            "plugin registered"
        );
        self.plugins.push(id);
        Ok(())
    }

    fn spawn<M: Send + 'static>(
        &self,
        plugin_id: &str,
        kind: &'static str,
        handler: Handler<M>,
    ) -> Route<M> {
        let (name, runner) = handler.into_parts();
        let (sender, inbox) = mpsc::channel(self.handler_buffer);
        let task = runner(self.context.shutdown.clone(), inbox);

        let worker_plugin = plugin_id.to_owned();
        let worker_name = name.clone().unwrap_or_else(|| "-".to_owned());
        self.workers.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(()) => debug!(
                    event_name = "dispatch.handler.exited",
                    plugin_id = %worker_plugin,
                    handler = %worker_name,
                    kind,
                    "handler exited"
                ),
                Err(_) => error!(
                    event_name = "dispatch.handler.panicked",
                    plugin_id = %worker_plugin,
                    handler = %worker_name,
                    kind,
                    "handler panicked; its queue is closed"
                ),
            }
        });

        Route { plugin_id: plugin_id.to_owned(), name, sender }
    }

    pub fn context(&self) -> &BotContext {
        &self.context
    }

    /// Tracker over every handler task, used to drain them at shutdown.
    pub fn workers(&self) -> &TaskTracker {
        &self.workers
    }

    pub fn plugin_ids(&self) -> &[String] {
        &self.plugins
    }

    pub fn command(&self, name: &str) -> Option<&Route<CommandMsg>> {
        self.commands.get(name)
    }

    pub fn webhook(&self, name: &str) -> Option<&Route<WebhookMsg>> {
        self.webhooks.get(name)
    }

    pub fn interaction(&self, name: &str) -> Option<&Route<InteractionMsg>> {
        self.interactions.get(name)
    }

    pub fn command_names(&self) -> BTreeSet<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn webhook_names(&self) -> BTreeSet<&str> {
        self.webhooks.keys().map(String::as_str).collect()
    }

    pub fn interaction_names(&self) -> BTreeSet<&str> {
        self.interactions.keys().map(String::as_str).collect()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn reaction_hook_count(&self) -> usize {
        self.reaction_hooks.len()
    }

    pub(crate) fn route_command(&self, command: SlashCommand, reply: ReplySender) -> bool {
        let Some(route) = self.commands.get(&command.name) else {
            debug!(
                event_name = "dispatch.command.unknown",
                command = %command.name,
                "no plugin handles this command; dropping"
            );
            return false;
        };
        let helper = PluginHelper::new(&self.context, &route.plugin_id);
        route.deliver("command", CommandMsg::new(helper, command, reply))
    }

    pub(crate) fn route_webhook(
        &self,
        name: String,
        request: WebhookRequest,
        responder: oneshot::Sender<WebhookResponse>,
    ) -> bool {
        let Some(route) = self.webhooks.get(&name) else {
            debug!(
                event_name = "dispatch.webhook.unknown",
                webhook = %name,
                "no plugin handles this webhook; dropping"
            );
            return false;
        };
        let helper = PluginHelper::new(&self.context, &route.plugin_id);
        route.deliver("webhook", WebhookMsg::new(helper, name, request, responder))
    }

    pub(crate) fn route_interaction(&self, callback: InteractionCallback) -> bool {
        let route_name = callback.route_name();
        let Some(route) = self.interactions.get(route_name) else {
            debug!(
                event_name = "dispatch.interaction.unknown",
                callback_id = %callback.callback_id,
                "no plugin handles this interaction; dropping"
            );
            return false;
        };
        let helper = PluginHelper::new(&self.context, &route.plugin_id);
        route.deliver("interaction", InteractionMsg { helper, callback })
    }

    /// Offers the message to every hook; returns how many accepted it.
    pub fn fan_out_hooks(&self, message: &MessageEvent) -> usize {
        self.hooks
            .iter()
            .filter(|route| {
                let helper = PluginHelper::new(&self.context, &route.plugin_id);
                route.deliver("hook", HookMsg { helper, message: message.clone() })
            })
            .count()
    }

    pub fn fan_out_reactions(&self, reaction: &ReactionAddedEvent) -> usize {
        self.reaction_hooks
            .iter()
            .filter(|route| {
                let helper = PluginHelper::new(&self.context, &route.plugin_id);
                route.deliver("reaction_hook", ReactionMsg { helper, reaction: reaction.clone() })
            })
            .count()
    }
}

fn check_names<M: Send + 'static>(
    plugin_id: &str,
    kind: &'static str,
    handlers: &[Handler<M>],
    registered: &HashMap<String, Route<M>>,
) -> Result<(), RegistryError> {
    let mut seen = BTreeSet::new();
    for handler in handlers {
        let name = handler.name().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(RegistryError::InvalidPlugin(format!(
                "{kind} handler in plugin `{plugin_id}` has no name"
            )));
        }
        if registered.contains_key(name) || !seen.insert(name) {
            return Err(RegistryError::DuplicateName { kind, name: name.to_owned() });
        }
    }
    Ok(())
}

fn route_key<M>(route: &Route<M>) -> String {
    route.name.as_deref().map(str::trim).unwrap_or_default().to_owned()
}
