//! Plugin dispatch for hivebot.
//!
//! - **Plugins** (`plugin`) - descriptors and long-lived handler workers
//! - **Registry** (`registry`) - name validation, storage setup, worker spawning, routing
//! - **Dispatch loop** (`dispatcher`) - single consumer of commands, webhooks, interactions
//! - **Reply correlation** (`correlator`) - bounded waits and out-of-band late replies
//! - **Event classification** (`classifier`) - Events API payloads to hooks, commands, directory
//! - **Runtime** (`runtime`) - `NotRunning -> Running -> Stopping -> Stopped`
//!
//! Handlers never block each other: routing uses non-blocking sends into per-handler queues,
//! and a full queue drops the message with a warning.

pub mod classifier;
pub mod context;
pub mod correlator;
pub mod dispatcher;
pub mod helper;
pub mod messages;
pub mod plugin;
pub mod registry;
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use classifier::{Classification, EventClassifier};
pub use context::{BotContext, DispatchSettings};
pub use correlator::{CommandOutcome, ReplyCorrelator, WebhookOutcome};
pub use dispatcher::{dispatch_channel, DispatchError, DispatchHandle, Dispatcher};
pub use helper::PluginHelper;
pub use messages::{
    CommandMsg, HookMsg, InteractionMsg, ReactionMsg, ReplyStatus, WebhookMsg, WebhookRequest,
    WebhookResponse,
};
pub use plugin::{Handler, HandlerFuture, LoadError, Plugin};
pub use registry::{PluginRegistry, RegistryError, Route};
pub use runtime::{Bot, DrainReport, RunningBot, RuntimeState};
