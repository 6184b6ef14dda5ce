use std::{collections::HashSet, path::PathBuf};

use anyhow::Result;
use clap::Args;
use client::reconcile::Reconcilable;
use shared::models::ReceivedNotification;

use super::context::{AppContext, explain, follow};

#[derive(Args, Debug)]
#[command(about = "Follow your notifications until Ctrl+C")]
pub struct NotificationsArgs {
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

pub async fn handle_notifications(args: NotificationsArgs) -> Result<()> {
    let context = AppContext::signed_in(args.config)?;
    let hub = context.live();
    let pane = hub.open_notifications().await.map_err(explain)?;
    eprintln!("listening for notifications; press Ctrl+C to stop");

    let mut shown = HashSet::new();
    follow(pane.watch(), pane.finished(), |view: &[ReceivedNotification]| {
        for notification in view {
            if shown.insert(notification.id()) {
                println!("[{}] {}", notification.timestamp(), notification.headline());
            }
        }
    })
    .await;

    pane.stop().await;
    Ok(())
}
