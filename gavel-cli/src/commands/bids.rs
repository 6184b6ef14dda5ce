use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use client::{
    live::{LeaderboardPane, ProductStatus},
    reconcile::LoadOutcome,
};
use shared::models::LeaderboardEntry;

use super::context::{AppContext, explain};

#[derive(Args, Debug)]
#[command(about = "Print a product's leaderboard and follow new bids")]
pub struct BidsArgs {
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Product whose bids to show
    #[arg(long, short)]
    pub product: i64,

    /// Place a bid of this amount first
    #[arg(long)]
    pub bid: Option<f64>,

    /// Number of entries to print
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Keep following until the auction closes or Ctrl+C
    #[arg(long, short)]
    pub follow: bool,
}

pub async fn handle_bids(args: BidsArgs) -> Result<()> {
    let context = AppContext::signed_in(args.config)?;

    if let Some(amount) = args.bid {
        let record = context
            .api
            .place_bid(args.product, amount)
            .await
            .map_err(explain)?;
        println!("bid {} accepted at {}", record.amount, record.created_at);
    }

    let hub = context.live();
    let pane = hub.open_leaderboard(args.product).await.map_err(explain)?;
    // The ranking arrives a page at a time.
    while pane.view().len() < args.top && pane.has_more() {
        match pane.load_older().await.map_err(explain)? {
            LoadOutcome::Loaded { .. } => {}
            LoadOutcome::Exhausted | LoadOutcome::InFlight => break,
        }
    }
    print_board(&pane.view(), args.top);

    if args.follow && pane.closed().is_none() {
        follow_board(&pane, args.top).await;
    }
    if let Some(closed) = pane.closed() {
        println!(
            "auction closed: {} won with {}",
            closed.winner_name, closed.final_amount
        );
    }

    pane.stop().await;
    Ok(())
}

async fn follow_board(pane: &LeaderboardPane, top: usize) {
    let mut entries = pane.watch();
    let mut status = pane.watch_status();
    let finished = pane.finished();
    tokio::pin!(finished);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut finished => {
                eprintln!("stream ended");
                break;
            }
            changed = entries.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = entries.borrow_and_update().clone();
                print_board(&view, top);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if let Some(line) = describe_status(&current) {
                    println!("{line}");
                }
                if current.closed.is_some() {
                    break;
                }
            }
        }
    }
}

fn describe_status(status: &ProductStatus) -> Option<String> {
    if status.closed.is_some() {
        return None;
    }
    status
        .latest_bid
        .as_ref()
        .map(|bid| format!("new bid: {} by {} at {}", bid.amount, bid.bidder_name, bid.timestamp))
}

fn print_board(view: &[LeaderboardEntry], top: usize) {
    if view.is_empty() {
        println!("no bids yet");
        return;
    }
    println!("{}", format_board(view, top));
}

fn format_board(view: &[LeaderboardEntry], top: usize) -> String {
    view.iter()
        .take(top)
        .enumerate()
        .map(|(rank, entry)| {
            let blocked = if entry.blocked { " (blocked)" } else { "" };
            format!(
                "{:>3}. {:<16} {:>12.2}  {}{blocked}",
                rank + 1,
                entry.masked_user_name,
                entry.amount,
                entry.created_at
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
