//! Ctrl+C / SIGTERM handling.
//!
//! The first signal cancels the returned [`CancellationToken`]; `serve`
//! drains in-flight requests and a foreground `sync` stops polling. A second
//! signal exits the process immediately.

use anyhow::Context;
use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal interrupts shutdown.
const FORCED_EXIT_CODE: i32 = 130;

pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();

    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("registering SIGTERM listener")?;

    let cancel = token.clone();
    tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            #[cfg(unix)]
            let outcome = tokio::select! {
                res = tokio::signal::ctrl_c() => res,
                _ = terminate.recv() => Ok(()),
            };
            #[cfg(not(unix))]
            let outcome = tokio::signal::ctrl_c().await;

            if let Err(e) = outcome {
                tracing::warn!(error = %e, "Signal listener stopped");
                return;
            }

            received += 1;
            if received == 1 {
                tracing::info!("Shutting down (signal again to force)");
                cancel.cancel();
            } else {
                tracing::warn!("Second signal, exiting now");
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    });

    Ok(token)
}
