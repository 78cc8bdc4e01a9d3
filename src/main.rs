//! bench-proto: peer-to-peer benchmark protocol node
//!
//! This node serves two stream protocols:
//! - `/test/hello`: logs a greeting string from the peer
//! - `/bench/data`: streams back a requested number of deterministic bytes
//!
//! Features:
//! - One task per inbound stream, no state shared between streams
//! - Reproducible payloads for benchmarking transports end to end
//! - Graceful shutdown on SIGINT/SIGTERM with a bounded drain
//! - Configuration via CLI arguments or TOML file

mod config;
mod host;
mod protocols;
mod shutdown;

use config::Config;
use host::tcp::RunningHost;
use host::{Host, TcpHost};
use shutdown::{ShutdownController, ShutdownReason};
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run_node() {
        eprintln!("{}", fatal_message(e.as_ref()));
        std::process::exit(1);
    }
}

fn run_node() -> Result<(), Box<dyn Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    shutdown::ignore_sigpipe();

    info!(
        listen = ?config.listen,
        workers = config.workers,
        max_streams = config.max_streams,
        chunk_size = config.chunk_size,
        stream_timeout = ?config.stream_timeout,
        "Starting bench-proto node"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

/// Serve streams until a termination signal arrives.
async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let controller = ShutdownController::install()?;

    let mut host = TcpHost::bind(&config.listen, config.max_streams)?;
    protocols::register_all(&mut host, Arc::new(config.protocol_settings()));

    for addr in host.addrs() {
        println!("{addr}");
    }

    let running = host.start();
    let reason = controller.wait().await;
    shut_down(running, reason, config.shutdown_grace, &mut io::stdout()).await?;

    Ok(())
}

/// Announce the shutdown reason, then drain the host for up to `grace`.
///
/// Returns whether every in-flight stream finished in time.
async fn shut_down<W: Write>(
    running: RunningHost,
    reason: ShutdownReason,
    grace: Duration,
    out: &mut W,
) -> io::Result<bool> {
    writeln!(out, "\nShutting down, reason: {reason}")?;
    out.flush()?;

    let drained = running.shutdown(grace).await;
    if !drained {
        warn!(grace = ?grace, "Abandoning streams still in flight");
    }
    Ok(drained)
}

fn fatal_message(err: &dyn Error) -> String {
    format!("error: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::host::{BoxFuture, StreamGuard};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn loopback_host() -> TcpHost {
        TcpHost::bind(&["127.0.0.1:0".to_string()], 8).unwrap()
    }

    #[test]
    fn test_fatal_message_uses_display() {
        let err = ConfigError::Invalid("chunk_size must be a non-zero multiple of 8");
        assert_eq!(
            fatal_message(&err),
            "error: chunk_size must be a non-zero multiple of 8"
        );
    }

    #[tokio::test]
    async fn test_shut_down_reports_reason_and_drains() {
        let mut host = loopback_host();
        protocols::register_all(&mut host, Arc::new(Default::default()));
        let addr = host.local_addrs().unwrap()[0];
        let running = host.start();

        // One finished hello stream before the signal.
        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket
            .write_all(format!("{}\n", protocols::HELLO_PROTOCOL).as_bytes())
            .await
            .unwrap();
        socket.write_all(&[0x64, b'p', b'i', b'n', b'g']).await.unwrap();
        let mut rest = Vec::new();
        socket.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, format!("{}\n", protocols::HELLO_PROTOCOL).as_bytes());

        let mut out = Vec::new();
        let drained = shut_down(
            running,
            ShutdownReason::Terminate,
            Duration::from_secs(5),
            &mut out,
        )
        .await
        .unwrap();

        assert!(drained);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nShutting down, reason: terminated\n"
        );
    }

    #[tokio::test]
    async fn test_shut_down_abandons_stuck_stream() {
        let mut host = loopback_host();
        host.register_handler(
            "/test/stuck",
            Arc::new(|mut stream: StreamGuard| -> BoxFuture {
                Box::pin(async move {
                    let _ = stream.io().read_u8().await;
                })
            }),
        );
        let addr = host.local_addrs().unwrap()[0];
        let running = host.start();

        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket.write_all(b"/test/stuck\n").await.unwrap();
        let mut ack = [0u8; 12];
        socket.read_exact(&mut ack).await.unwrap();

        let mut out = Vec::new();
        let drained = shut_down(
            running,
            ShutdownReason::Interrupt,
            Duration::from_millis(50),
            &mut out,
        )
        .await
        .unwrap();

        assert!(!drained);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nShutting down, reason: interrupt\n"
        );
    }
}
