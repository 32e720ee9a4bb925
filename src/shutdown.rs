use std::io;

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn signal() -> Result<(), io::Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                log::info!("Received Ctrl-C, shutting down");
            }
            _ = terminate.recv() => log::info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        log::info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}
