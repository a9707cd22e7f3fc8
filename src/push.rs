//! Push channel supervisor.
//!
//! Keeps one push stream open for a page session and feeds its events to
//! the [`UiController`]. When a stream ends the connection is marked
//! disconnected and stays so until the controller requests a reconnect (the
//! page became visible again) or shutdown is signalled.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::PushChannel;
use crate::controller::UiController;

/// Run the supervisor until `shutdown` is cancelled.
pub async fn run_push_channel(
    controller: UiController,
    channel: Arc<dyn PushChannel>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = pump(&controller, channel.as_ref()) => {}
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = controller.reconnect_requested() => {
                info!(name: "push.reconnecting", session_id = %controller.session_id(), "Reconnecting push channel");
            }
        }
    }
    info!(name: "push.stopped", "Push supervisor stopped");
}

/// Connect once and drain the stream until it ends.
async fn pump(controller: &UiController, channel: &dyn PushChannel) {
    let mut stream = match channel.connect(controller.session_id()).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(name: "push.connect_failed", error = %err, "Failed to open push channel");
            controller.on_disconnect();
            return;
        }
    };
    controller.on_connect();

    if let Err(err) = controller.sync_automation_status().await {
        warn!(name: "automation.status_failed", error = %err, "Failed to fetch automation status");
    }

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => controller.handle_push(event),
            Err(err) if err.is_recoverable_push_error() => controller.report_unhandled_error(&err),
            Err(err) => {
                warn!(name: "push.stream_failed", error = %err, "Push stream failed");
                break;
            }
        }
    }
    controller.on_disconnect();
}
