//! Line Stream Pump
//!
//! Decodes a byte stream into text chunks on a background task and hands
//! each chunk to a consumer until stopped or the stream ends. Used for the
//! CLI's stderr while the main loop reads stdout.

use log::{debug, error, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Bytes read per iteration
pub const CHUNK_SIZE: usize = 4096;

/// Incremental UTF-8 decoder that carries incomplete sequences across chunks
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode `bytes`, holding back a trailing partial character for the next call.
    /// Invalid sequences become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let buffer = std::mem::take(&mut self.pending);
        let mut rest = buffer.as_slice();
        let mut out = String::with_capacity(rest.len());

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more bytes
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left at end of stream
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Pump `reader` into `on_chunk` until `stop` fires or the stream ends.
///
/// Read errors and EOF end the pump quietly. A panicking consumer is logged
/// and the pump keeps going.
pub async fn pump_stream<R, F>(
    mut reader: R,
    mut stop: oneshot::Receiver<()>,
    prefix: Option<String>,
    mut on_chunk: F,
) where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut decoder = Utf8Decoder::default();
    let mut deliver = |text: String| {
        if text.is_empty() {
            return;
        }
        let text = match &prefix {
            Some(p) => format!("{}{}", p, text),
            None => text,
        };
        if catch_unwind(AssertUnwindSafe(|| on_chunk(text))).is_err() {
            error!("[pump] Consumer callback panicked, continuing");
        }
    };

    loop {
        let read = tokio::select! {
            _ = &mut stop => {
                debug!("[pump] Stop requested");
                return;
            }
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => break,
            Ok(n) => deliver(decoder.decode(&buffer[..n])),
            Err(e) => {
                debug!("[pump] Stream read ended: {}", e);
                break;
            }
        }
    }

    deliver(decoder.finish());
}

/// Handle to a pump running on its own task
pub struct PumpHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl PumpHandle {
    /// Spawn a pump over `reader`
    pub fn spawn<R, F>(reader: R, prefix: Option<String>, on_chunk: F) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        F: FnMut(String) + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(pump_stream(reader, stop_rx, prefix, on_chunk));
        Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal the pump to stop and wait up to `wait` for it; abort if it lingers
    pub async fn stop(&mut self, wait: Duration) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut join) = self.join.take() {
            if tokio::time::timeout(wait, &mut join).await.is_err() {
                warn!("[pump] Did not stop within {:?}, aborting", wait);
                join.abort();
            }
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
