//! # TCP Server
//!
//! Accept RESP2 connections, parse commands, and dispatch them to the store.
//! Every frame that arrived in one read is answered with one write, so a
//! pipelined batch costs a single round trip on this side too.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use skv_common::{RespError, RespParser, RespValue};
use skv_engine::Store;

/// How often a subscriber relay checks whether its client went away.
const RELAY_POLL: Duration = Duration::from_millis(200);

/// Accepts connections forever, serving each on its own task.
pub async fn serve(listener: TcpListener, store: Arc<Store>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");
        let store = store.clone();
        tokio::spawn(async move {
            match handle_connection(stream, store).await {
                Ok(()) => debug!(%peer, "connection closed"),
                Err(err) => warn!(%peer, error = %err, "connection failed"),
            }
        });
    }
}

/// Removes expired keys every `interval`.
pub fn spawn_purger(store: Arc<Store>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = store.engine().purge_expired();
            if removed > 0 {
                trace!(removed, "purged expired keys");
            }
        }
    })
}

/// Handles a single TCP client connection.
pub async fn handle_connection(mut stream: TcpStream, store: Arc<Store>) -> io::Result<()> {
    let _ = stream.set_nodelay(true);
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut parser = RespParser::new();
    let mut out = Vec::with_capacity(1024);

    loop {
        let bytes = stream.read_buf(&mut buffer).await?;
        if bytes == 0 {
            break;
        }

        loop {
            match parser.parse(&mut buffer) {
                Ok(Some(args)) if is_subscribe(&args) => {
                    stream.write_all(&out).await?;
                    return subscriber_mode(stream, store, args[1..].to_vec()).await;
                }
                Ok(Some(args)) => store.execute(&args).encode(&mut out),
                Ok(None) => break,
                Err(RespError::Protocol(reason)) => {
                    RespValue::error(reason).encode(&mut out);
                    stream.write_all(&out).await?;
                    return Ok(());
                }
                Err(RespError::Io(err)) => return Err(err),
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
            out.clear();
        }
    }

    Ok(())
}

fn is_subscribe(args: &[Vec<u8>]) -> bool {
    args.len() >= 2 && args[0].eq_ignore_ascii_case(b"SUBSCRIBE")
}

/// Pushes messages for `channels` until the client disconnects.
///
/// Further commands from the client are read and ignored.
async fn subscriber_mode(mut stream: TcpStream, store: Arc<Store>, channels: Vec<Vec<u8>>) -> io::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut out = Vec::new();

    for (count, channel) in channels.into_iter().enumerate() {
        let receiver = store.broker().subscribe(&channel);
        RespValue::Array(vec![
            RespValue::bulk(b"subscribe"),
            RespValue::bulk(&channel),
            RespValue::Integer(count as i64 + 1),
        ])
        .encode(&mut out);

        let tx = tx.clone();
        tokio::task::spawn_blocking(move || relay(receiver, channel, tx));
    }
    drop(tx);
    stream.write_all(&out).await?;

    let mut scratch = [0u8; 512];
    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some((channel, payload)) = message else {
                    return Ok(());
                };
                out.clear();
                RespValue::Array(vec![
                    RespValue::bulk(b"message"),
                    RespValue::bulk(&channel),
                    RespValue::bulk(&payload),
                ])
                .encode(&mut out);
                stream.write_all(&out).await?;
            }
            read = stream.read(&mut scratch) => {
                if read? == 0 {
                    return Ok(());
                }
            }
        }
    }
}

type Message = (Vec<u8>, Vec<u8>);

// Bridges a blocking broker receiver onto the connection task.
fn relay(receiver: Receiver<Vec<u8>>, channel: Vec<u8>, tx: mpsc::UnboundedSender<Message>) {
    loop {
        match receiver.recv_timeout(RELAY_POLL) {
            Ok(payload) => {
                if tx.send((channel.clone(), payload)).is_err() {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) if tx.is_closed() => return,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
