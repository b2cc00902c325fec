use hivebot_dispatch::{
    CommandMsg, Handler, InteractionMsg, Plugin, ReactionMsg, WebhookMsg, WebhookResponse,
};
use hivebot_slack::CommandResponse;
use tracing::warn;

pub const PLUGIN_ID: &str = "echo";

pub fn plugin() -> Plugin {
    Plugin::new(PLUGIN_ID)
        .command(Handler::named("echo", echo_command))
        .reaction_hook(Handler::anonymous(announce_reaction))
        .webhook(Handler::named("echo", echo_webhook))
        .interaction(Handler::named("echo", acknowledge_interaction))
}

async fn echo_command(mut msg: CommandMsg) {
    let text = msg.command.text.clone();
    msg.reply_with(CommandResponse::ephemeral(text));
}

async fn announce_reaction(msg: ReactionMsg) {
    let reaction = &msg.reaction;
    let Some(channel) = reaction.item.channel.as_deref() else {
        return;
    };
    let user = match msg.helper.user_name(&reaction.user) {
        Ok(user) => user,
        Err(error) => {
            warn!(plugin_id = PLUGIN_ID, error = %error, "reacting user not found");
            return;
        }
    };

    let text = format!("@{user} added a reaction! :{}:", reaction.reaction);
    if let Err(error) = msg.helper.say(channel, &text).await {
        warn!(plugin_id = PLUGIN_ID, error = %error, "could not announce reaction");
    }
}

async fn echo_webhook(mut msg: WebhookMsg) {
    let content_type = msg.request.header("content-type").map(str::to_owned);
    let response = WebhookResponse {
        status: 200,
        content_type: content_type.or_else(|| Some("text/plain; charset=utf-8".to_owned())),
        body: std::mem::take(&mut msg.request.body),
    };
    msg.respond(response);
}

async fn acknowledge_interaction(msg: InteractionMsg) {
    let callback = &msg.callback;
    let Some(response_url) = callback.response_url.as_deref() else {
        return;
    };
    let reply = CommandResponse::ephemeral(format!(
        "Got `{}` from `{}`",
        callback.interaction_type, callback.callback_id
    ));
    if let Err(error) = msg.helper.respond_to_slash_command(response_url, &reply).await {
        warn!(plugin_id = PLUGIN_ID, error = %error, "could not acknowledge interaction");
    }
}
