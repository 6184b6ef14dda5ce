use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use client::{
    api::AuctionApi,
    live::LiveHub,
    pipeline::RequestPipeline,
    session::Session,
    storage::FileSessionStorage,
    transport::HttpTransport,
};
use shared::config::Config;
use tokio::sync::watch;

/// Everything a command needs to talk to the backend.
#[derive(Debug)]
pub struct AppContext {
    pub config: Config,
    pub session_path: PathBuf,
    pub api: AuctionApi,
}

impl AppContext {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = crate::load_config(config_path)?;
        let session_path = config
            .session_path()
            .context("could not determine where to store the session; set session_file in the config")?;
        let session = Session::with_storage(
            Arc::new(FileSessionStorage::new(&session_path)),
            Duration::from_secs(config.expiry_skew_secs),
        );
        let pipeline = RequestPipeline::from_config(Arc::new(HttpTransport::new()), session, &config);
        let api = AuctionApi::from_config(pipeline, &config);
        Ok(Self {
            config,
            session_path,
            api,
        })
    }

    /// Like [`AppContext::load`], but refuses to continue without a stored session.
    pub fn signed_in(config_path: Option<PathBuf>) -> Result<Self> {
        let context = Self::load(config_path)?;
        if context.session().refresh_token().is_none() {
            bail!("not signed in; run `gavel login` first");
        }
        Ok(context)
    }

    pub fn session(&self) -> &Session {
        self.api.session()
    }

    pub fn live(&self) -> LiveHub {
        LiveHub::new(self.api.clone(), self.config.page_size)
    }
}

/// Maps authorization failures to a sign-in hint.
pub fn explain(err: client::error::PipelineError) -> anyhow::Error {
    if err.is_authorization() {
        anyhow::Error::new(err).context("session is no longer valid; run `gavel login` again")
    } else {
        anyhow::Error::new(err)
    }
}

/// Calls `on_view` with every published view until Ctrl+C or until
/// `finished` resolves.
pub async fn follow<T, F>(
    mut updates: watch::Receiver<Vec<T>>,
    finished: impl Future<Output = ()>,
    mut on_view: F,
) where
    T: Clone,
    F: FnMut(&[T]),
{
    tokio::pin!(finished);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut finished => {
                eprintln!("stream ended");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = updates.borrow_and_update().clone();
                on_view(&view);
            }
        }
    }
    let view = updates.borrow().clone();
    on_view(&view);
}
