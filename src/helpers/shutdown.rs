use tokio::sync::watch;
use tracing::{error, info};

/// Flips to `true` on ctrl-c. Every long-running part of a process holds a
/// clone and stops once it observes the flag.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (sender, receiver) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for the shutdown signal due to: {}", e);
            // Keep the sender alive so receivers do not read this as a shutdown.
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, draining");
        let _ = sender.send(true);
    });
    receiver
}

pub async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::*;

    #[tokio::test]
    async fn wait_returns_once_flag_is_set() {
        let (sender, receiver) = watch::channel(false);
        let waiter = tokio::spawn(wait_for_shutdown(receiver));

        sender.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
