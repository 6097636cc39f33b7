//! Run wiring shared by `plugin run` and `workflow run`: account, session and Ctrl-C.
use famp_core::api::{Account, CliError};
use famp_plugins::ReplaySession;
use tokio_util::sync::CancellationToken;

use crate::commands::cli::SessionArgs;
use crate::utils;

pub struct RunTarget {
    pub account: Account,
    pub session: ReplaySession,
}

#[tracing::instrument(name = "cli.open_session", skip_all, fields(replay = %args.replay.display()))]
pub async fn open_session(args: &SessionArgs) -> Result<RunTarget, CliError> {
    let account = utils::load_account(args)?;
    if !account.active {
        return Err(CliError::Config(format!(
            "account '{}' is marked inactive",
            account.account_id
        )));
    }
    let session = ReplaySession::from_file(&args.replay).await?;
    tracing::debug!(account = %account.account_id, "session opened");
    Ok(RunTarget { account, session })
}

/// Cancel `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    tracing::warn!("interrupt received, pausing run");
                    token.cancel();
                }
            }
            _ = token.cancelled() => {}
        }
    });
}
