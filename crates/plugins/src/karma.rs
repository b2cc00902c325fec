use hivebot_db::StoreError;
use hivebot_dispatch::{CommandMsg, Handler, HookMsg, Plugin};
use hivebot_slack::CommandResponse;
use tracing::{error, warn};

pub const PLUGIN_ID: &str = "karma";

pub fn plugin() -> Plugin {
    Plugin::new(PLUGIN_ID)
        .command(Handler::named("score", score_command))
        .hook(Handler::anonymous(count_karma))
}

async fn score_command(mut msg: CommandMsg) {
    let name = msg.command.text.trim().to_owned();
    if name.is_empty() {
        msg.reply_with(CommandResponse::ephemeral("I need a name to look up the score for."));
        return;
    }

    let response = match msg.helper.store().get(&name).await {
        Ok(score) => {
            let score = score.map(|raw| String::from_utf8_lossy(&raw).into_owned());
            CommandResponse::in_channel(format!(
                "Score for {name} is {}",
                score.as_deref().unwrap_or("0")
            ))
        }
        Err(error) => {
            error!(plugin_id = PLUGIN_ID, name = %name, error = %error, "unable to read score");
            CommandResponse::ephemeral(format!("Unable to fetch score for {name}"))
        }
    };
    msg.reply_with(response);
}

async fn count_karma(msg: HookMsg) {
    for (item, delta) in karma_changes(&msg.message.text) {
        let result = msg
            .helper
            .store()
            .update(item, move |current| adjust(current, delta).map(Some))
            .await;
        if let Err(error) = result {
            warn!(plugin_id = PLUGIN_ID, item, delta, error = %error, "could not update karma");
        }
    }
}

/// Every `name++` or `name--` token in a message, in order.
pub fn karma_changes(text: &str) -> Vec<(&str, i64)> {
    text.split(' ')
        .filter_map(|token| {
            if let Some(item) = token.strip_suffix("++") {
                Some((item, 1))
            } else {
                token.strip_suffix("--").map(|item| (item, -1))
            }
        })
        .filter(|(item, _)| !item.is_empty())
        .collect()
}

/// Applies `delta` to a stored score; an absent score starts from zero.
pub fn adjust(current: Option<&[u8]>, delta: i64) -> Result<Vec<u8>, StoreError> {
    let score = match current {
        None => 0,
        Some(raw) => std::str::from_utf8(raw)
            .ok()
            .and_then(|text| text.parse::<i64>().ok())
            .ok_or_else(|| {
                StoreError::Codec(format!("karma `{}` is not a number", raw.escape_ascii()))
            })?,
    };
    Ok(score.saturating_add(delta).to_string().into_bytes())
}
