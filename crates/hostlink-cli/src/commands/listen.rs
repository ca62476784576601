//! `hostlink listen` — Local sink that decodes reporter streams.
//!
//! Stands in for the analysis host while debugging: accepts connections,
//! checks the `BSON\n` marker and prints every document on stdout.

use std::io::{BufReader, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use clap::Args;
use hostlink_wire::frame::FrameReader;

use crate::output::render_document;

/// Arguments for the `listen` command.
#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to accept reporter connections on.
    #[arg(long, default_value = "127.0.0.1:2042")]
    pub bind: String,

    /// Exit once this many connections have been served.
    #[arg(long)]
    pub max_connections: Option<usize>,
}

/// Executes the `listen` command.
///
/// Runs until Ctrl+C, or until `--max-connections` streams have ended.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or accepting fails.
pub fn execute(args: ListenArgs) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&args.bind)
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {e}", args.bind))?;
    listener.set_nonblocking(true)?;
    eprintln!("  Listening on {}", listener.local_addr()?);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    while running.load(Ordering::SeqCst) {
        if args.max_connections.is_some_and(|max| workers.len() >= max) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                tracing::info!(%peer, "reporter connected");
                workers.push(std::thread::spawn(move || serve(stream, peer)));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(anyhow::anyhow!("accept failed: {e}")),
        }
    }

    if running.load(Ordering::SeqCst) {
        for worker in workers {
            let _ = worker.join();
        }
    }
    Ok(())
}

/// Prints every document of one connection until it closes.
fn serve(stream: TcpStream, peer: SocketAddr) {
    let mut reader = FrameReader::new(BufReader::new(stream));
    let mut seq = 0;
    loop {
        match reader.next_document() {
            Ok(Some(doc)) => {
                println!("{}", render_document(&peer, seq, doc));
                seq += 1;
            }
            Ok(None) => {
                tracing::info!(%peer, documents = seq, "reporter disconnected");
                return;
            }
            Err(e) => {
                tracing::warn!(%peer, documents = seq, error = %e, "dropping malformed stream");
                return;
            }
        }
    }
}
