use hivebot_core::config::{AppConfig, LoadOptions, PluginsConfig};
use hivebot_plugins::all_plugins;
use serde::Serialize;

use crate::commands::{serialize_payload, CommandResult};

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub id: String,
    pub enabled: bool,
    pub commands: Vec<String>,
    pub webhooks: Vec<String>,
    pub interactions: Vec<String>,
    pub hooks: usize,
}

#[derive(Debug, Serialize)]
struct PluginListing {
    command: &'static str,
    status: &'static str,
    plugins: Vec<PluginSummary>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "plugins",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let listing =
        PluginListing { command: "plugins", status: "ok", plugins: catalogue(&config.plugins) };
    CommandResult { exit_code: 0, output: serialize_payload(&listing) }
}

/// Every builtin plugin, flagged with whether the configuration enables it.
pub fn catalogue(config: &PluginsConfig) -> Vec<PluginSummary> {
    let owned = |names: Vec<&str>| names.into_iter().map(str::to_owned).collect::<Vec<_>>();

    all_plugins()
        .iter()
        .map(|plugin| PluginSummary {
            id: plugin.id().to_owned(),
            enabled: config.is_enabled(plugin.id()),
            commands: owned(plugin.command_names()),
            webhooks: owned(plugin.webhook_names()),
            interactions: owned(plugin.interaction_names()),
            hooks: plugin.hook_count(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use hivebot_core::config::PluginsConfig;

    use super::catalogue;

    #[test]
    fn catalogue_lists_names_and_enablement() {
        let config = PluginsConfig { enabled: Some(vec!["karma".to_owned()]) };

        let plugins = catalogue(&config);

        let ids: Vec<&str> = plugins.iter().map(|plugin| plugin.id.as_str()).collect();
        assert_eq!(ids, ["echo", "karma", "random"]);

        let karma = &plugins[1];
        assert!(karma.enabled);
        assert_eq!(karma.commands, ["score"]);
        assert_eq!(karma.hooks, 1);

        let random = &plugins[2];
        assert!(!random.enabled);
        assert_eq!(random.commands, ["roll", "choose", "dice"]);
        assert!(random.webhooks.is_empty());
    }
}
