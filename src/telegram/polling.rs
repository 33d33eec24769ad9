//! Long-polling deployment mode
//!
//! Drives the same dispatcher as the webhook endpoint from a supervised
//! loop, so both deployment modes share one conversation contract. The loop
//! runs until its cancellation token fires (session stop or teardown).

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::requests::Request as _;
use tokio_util::sync::CancellationToken;

use crate::core::config;
use crate::telegram::dispatcher::UpdateDispatcher;
use crate::telegram::update::InboundUpdate;

/// Fetches updates in a long-poll loop and feeds them to the dispatcher.
///
/// Each update is handled in its own task so one user's slow turn (ledger
/// writes, uploads) does not stall the rest of the batch.
pub async fn run_polling_loop(bot: Bot, dispatcher: Arc<UpdateDispatcher>, secret: String, cancel: CancellationToken) {
    let mut offset: i32 = 0;
    log::info!("Polling loop started");

    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(config::session::POLL_TIMEOUT_SECS)
            .send();

        let updates = tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Polling loop stopping (cancelled)");
                break;
            }
            result = request => match result {
                Ok(updates) => updates,
                Err(e) => {
                    log::error!("getUpdates failed: {}; retrying shortly", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(config::session::poll_retry_delay()) => continue,
                    }
                }
            },
        };

        for update in updates {
            offset = offset.max(i32::try_from(update.id.0).unwrap_or(i32::MAX).saturating_add(1));

            let Some(inbound) = InboundUpdate::from_telegram(&update) else {
                continue;
            };

            let dispatcher = Arc::clone(&dispatcher);
            let secret = secret.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher.handle(&secret, inbound).await {
                    log::error!("Polling dispatch failed: {}", e);
                }
            });
        }
    }
}
