use std::{collections::HashSet, path::PathBuf};

use anyhow::Result;
use clap::Args;
use shared::models::{ChatMessage, SendChatRequest};
use tracing::warn;

use super::context::{AppContext, explain, follow};

#[derive(Args, Debug)]
#[command(about = "Print a transaction's chat and optionally follow new messages")]
pub struct ChatArgs {
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Transaction whose chat to show
    #[arg(long, short)]
    pub transaction: i64,

    /// Number of history pages to load before printing
    #[arg(long, default_value_t = 1)]
    pub pages: u32,

    /// Send this message before printing the transcript
    #[arg(long)]
    pub send: Option<String>,

    /// Keep printing new messages until Ctrl+C
    #[arg(long, short)]
    pub follow: bool,
}

pub async fn handle_chat(args: ChatArgs) -> Result<()> {
    let context = AppContext::signed_in(args.config)?;
    let transaction_id = args.transaction;

    if let Some(text) = args.send {
        context
            .api
            .send_chat(&SendChatRequest::text(transaction_id, text))
            .await
            .map_err(explain)?;
    }

    let hub = context.live();
    let pane = hub.open_chat(transaction_id).await.map_err(explain)?;
    for _ in 1..args.pages {
        if !pane.has_more() {
            break;
        }
        pane.load_older().await.map_err(explain)?;
    }

    let mut printed = HashSet::new();
    print_new(&pane.view(), &mut printed);
    if let Err(err) = context.api.mark_read(transaction_id).await {
        warn!(error = %err, "failed to mark chat as read");
    }

    if args.follow {
        follow(pane.watch(), pane.finished(), |view| print_new(view, &mut printed)).await;
    }

    pane.stop().await;
    Ok(())
}

/// Prints messages not printed yet, in view order.
fn print_new(view: &[ChatMessage], printed: &mut HashSet<i64>) {
    for message in view {
        if printed.insert(message.id) {
            println!("{}", format_message(message));
        }
    }
}

fn format_message(message: &ChatMessage) -> String {
    let sender = message
        .sender_name
        .clone()
        .unwrap_or_else(|| format!("user {}", message.sender_id));
    format!("[{}] {sender}: {}", message.created_at, message.message)
}
