//! Demo entry point: runs the sum-protocol example as either a server or
//! a client over the TCP transport. Logging setup uses a detailed layer
//! (file or stderr) plus an optional colorized stdout layer, both driven
//! off the same `-v` verbosity count.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rpcmux::cli::{Args, Command};
use rpcmux::transport::tcp::TcpTransport;
use rpcmux::{Client, Server};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

#[path = "../../demos/sum_protocol.rs"]
mod sum_protocol;
use sum_protocol::{server_descriptor, SumProtocol, SumReq};

use rpcmux::logging::ColorizedFormatter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;
    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path
                    .parent()
                    .unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("rpcmux-demo.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "rpcmux-demo.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(stdout_log)
        .init();
    let _log_guard = guard;

    match args.command.clone() {
        Command::Server => run_server(&args).await,
        Command::Client { a, b } => run_client(&args, a, b).await,
    }
}

async fn run_server(args: &Args) -> Result<()> {
    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("rpcmux demo server listening on {}", addr);

    let server = Server::new(server_descriptor(), rpcmux::defaults::WORKER_POOL_SIZE);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        let server = server.clone();
        tokio::spawn(async move {
            match TcpTransport::new(stream) {
                Ok(transport) => {
                    server
                        .serve_connection(Arc::new(transport), SumProtocol)
                        .await;
                }
                Err(e) => error!(error = %e, "failed to set up connection"),
            }
        });
    }
}

async fn run_client(args: &Args, a: i64, b: i64) -> Result<()> {
    let addr = format!("{}:{}", args.host, args.port);
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    let transport = TcpTransport::new(stream)?;

    let protocol = sum_protocol::client_descriptor(|result| match result {
        Ok(notif) => info!(
            "notification from server: msg='{}', descr='{}'",
            notif.msg, notif.descr
        ),
        Err(e) => error!(error = %e, "error while receiving notification"),
    });

    let client = Client::connect(Arc::new(transport), protocol, args.timeout);

    // Give the server's on_connect notification a moment to arrive before we
    // print the call result, matching the demo's intended reading order.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resp: sum_protocol::SumResp = client
        .call("Sum", SumReq { a, b })
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    println!("{} + {} = {}", a, b, resp.sum);

    client.close().await?;
    Ok(())
}
