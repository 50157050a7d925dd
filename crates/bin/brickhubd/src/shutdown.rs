//! OS signal handling: the first termination signal cancels the run.
//!
//! On Unix SIGINT, SIGTERM and SIGQUIT are handled, with
//! [`tokio::signal::ctrl_c`] as a fallback. Elsewhere only ctrl-c is.

use tokio_util::sync::CancellationToken;

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancel `root` on the first shutdown signal. Returns early if `root` is
/// cancelled some other way.
pub async fn cancel_on_signal(root: CancellationToken) {
    tokio::select! {
        result = wait_for_shutdown_signal() => match result {
            Ok(()) => {
                tracing::info!("shutdown signal received, stopping hubs");
                root.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "unable to listen for shutdown signals"),
        },
        () = root.cancelled() => {}
    }
}
