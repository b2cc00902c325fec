use hivebot_core::DirectoryCache;
use tracing::info;

use crate::api::{ApiError, Page, SlackApi};

/// Upper bound on pages fetched per listing, in case a cursor never terminates.
const MAX_PAGES: usize = 500;

/// Loads the bot identity and the full channel and user listings into `directory`.
pub async fn refresh_directory(
    api: &dyn SlackApi,
    directory: &DirectoryCache,
) -> Result<(), ApiError> {
    let identity = api.auth_test().await?;
    info!(
        event_name = "slack.directory.identity",
        user_id = %identity.user_id,
        bot_id = identity.bot_id.as_deref().unwrap_or("none"),
        "resolved bot identity"
    );
    directory.set_identity(identity);

    let channels = collect_pages(|cursor| async move { api.list_channels(cursor.as_deref()).await })
        .await?;
    let users =
        collect_pages(|cursor| async move { api.list_users(cursor.as_deref()).await }).await?;

    info!(
        event_name = "slack.directory.refreshed",
        channels = channels.len(),
        users = users.len(),
        "directory refreshed"
    );
    directory.replace_all(channels, users);
    Ok(())
}

async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, ApiError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: std::future::Future<Output = Result<Page<T>, ApiError>>,
{
    let mut items = Vec::new();
    let mut cursor = None;
    for _ in 0..MAX_PAGES {
        let page = fetch(cursor.take()).await?;
        items.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(items)
}
