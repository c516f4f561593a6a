mod cli;
mod utils;

use anyhow::Context;
use cli::Mode;
use graphping::display::{self, Sparkline};
use graphping::transport::icmp::IcmpTransport;
use graphping::{BatchConfig, BatchSession, ContinuousSession, SessionConfig};
use std::io::Write;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Enable debug logging if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let mode = match cli::parse_args() {
        Ok(mode) => mode,
        Err(e) => match e.downcast_ref::<clap::Error>() {
            Some(clap_err) => clap_err.exit(),
            None => utils::exit_with_error(&format!("argument error: {}", e), 1),
        },
    };

    let result = match mode {
        Mode::Watch(config) => watch(config).await,
        Mode::Batch(config) => batch(config).await,
    };

    if let Err(e) = result {
        utils::exit_with_error(&format!("{:#}", e), 1);
    }
}

async fn watch(config: SessionConfig) -> anyhow::Result<()> {
    let target = config.target.clone();
    let sparkline = Sparkline::new(&config.chart_color);
    let session = ContinuousSession::new(Arc::new(IcmpTransport::new()));

    let title = if target.trim().is_empty() {
        display::unset_title()
    } else {
        display::idle_title(&target)
    };
    println!("{}", title.replace('\n', " "));

    session
        .start(config, move |frame| {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "\r\x1b[2K{}", sparkline.status_line(frame));
            let _ = stdout.flush();
        })
        .with_context(|| format!("cannot start probing {}", target))?;

    let _ = utils::setup_signal_handler().await;
    session.stop();

    let frame = session.current_frame();
    let window = frame.window();
    println!();
    println!(
        "{}: last {} | {} samples in window, avg {:.2}ms, loss {:.2}%",
        target,
        display::running_title(&frame).replace('\n', " "),
        frame.history.len(),
        window.average_time(),
        window.loss_percentage()
    );
    Ok(())
}

async fn batch(config: BatchConfig) -> anyhow::Result<()> {
    let target = config.target.clone();
    let report = BatchSession::new(Arc::new(IcmpTransport::new()), config)
        .on_progress(|successful, total| {
            eprintln!("{}", display::batch_progress(successful, total).replace('\n', " "));
        })
        .run()
        .await
        .with_context(|| format!("batch against {} failed", target))?;

    println!("{}", display::batch_report(&report).replace('\n', " "));
    Ok(())
}
