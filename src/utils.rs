use std::process;

/// Print error message and exit with error code
pub fn exit_with_error(message: &str, code: i32) -> ! {
    eprintln!("graphping: {}", message);
    process::exit(code);
}

/// Handle Ctrl+C signal for graceful shutdown
pub fn setup_signal_handler() -> tokio::sync::oneshot::Receiver<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                // Keep the sender alive so the receiver never fires
                std::future::pending::<()>().await;
                drop(tx);
            }
        }
    });

    rx
}
