//! Builtin plugins, linked into the server at build time.

use hivebot_core::config::PluginsConfig;
use hivebot_dispatch::Plugin;

pub mod echo;
pub mod karma;
pub mod random;

pub const BUILTIN_PLUGIN_IDS: [&str; 3] = [echo::PLUGIN_ID, karma::PLUGIN_ID, random::PLUGIN_ID];

/// Every builtin plugin.
pub fn all_plugins() -> Vec<Plugin> {
    vec![echo::plugin(), karma::plugin(), random::plugin()]
}

/// The builtin plugins the configuration enables, in registration order.
pub fn builtin_plugins(config: &PluginsConfig) -> Vec<Plugin> {
    all_plugins().into_iter().filter(|plugin| config.is_enabled(plugin.id())).collect()
}
