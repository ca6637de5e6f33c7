//! Streaming pipeline: chunker → transformer → committer
//!
//! ```text
//!  AsyncRead ─▶ [chunker task] ─mpsc(1)─▶ [transformer task] ─mpsc(1)─▶ [committer] ─▶ AsyncWrite
//!                     │                          │                           │
//!                     └──────────────── ErrorSignal (first error wins) ──────┘
//! ```
//!
//! Stages hand chunks over bounded channels of capacity 1, so at most a few
//! chunks are in flight regardless of file size. The first stage to fail
//! stores its error and cancels the shared token; every stage selects on the
//! token around each send and receive, so nothing blocks after a failure.

use std::sync::{Arc, Mutex, PoisonError};

use pen_crypto::ChunkCipher;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::container::Framing;
use crate::error::{PenError, PenResult};
use crate::types::Mode;

/// Counters reported by a completed pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Chunks that passed through all three stages
    pub chunks: u64,
    /// Bytes consumed from the reader
    pub bytes_in: u64,
    /// Bytes committed to the writer
    pub bytes_out: u64,
}

/// Shared first-error slot plus the cancellation token every stage watches.
#[derive(Clone, Default)]
struct ErrorSignal {
    first: Arc<Mutex<Option<PenError>>>,
    cancel: CancellationToken,
}

impl ErrorSignal {
    fn raise(&self, stage: &'static str, err: PenError) {
        let mut slot = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            warn!(stage, error = %err, "pipeline stage failed");
            *slot = Some(err);
        } else {
            debug!(stage, error = %err, "later pipeline error dropped");
        }
        drop(slot);
        self.cancel.cancel();
    }

    fn take(&self) -> Option<PenError> {
        self.first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Run `reader` through the chunk cipher in `mode` and write the result to
/// `writer`.
///
/// Chunk order is preserved. On failure the writer holds an unspecified
/// prefix of the output and must be discarded by the caller.
pub async fn run<R, W>(
    reader: R,
    writer: &mut W,
    cipher: ChunkCipher,
    mode: Mode,
    framing: Framing,
) -> PenResult<PipelineStats>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let signal = ErrorSignal::default();
    // Stops the spawned stages if this future is dropped mid-run.
    let _stop_on_drop = signal.cancel.clone().drop_guard();

    let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(1);
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(1);

    let chunker = tokio::spawn(chunker(
        reader,
        framing.read_size(mode),
        chunk_tx,
        signal.clone(),
    ));
    let transformer = tokio::spawn(transformer(chunk_rx, out_tx, cipher, mode, signal.clone()));

    let (chunks, bytes_out) = committer(out_rx, writer, &signal).await;

    let bytes_in = match chunker.await {
        Ok(n) => n,
        Err(e) => {
            signal.raise("chunker", PenError::Pipeline(format!("chunker task failed: {e}")));
            0
        }
    };
    if let Err(e) = transformer.await {
        signal.raise(
            "transformer",
            PenError::Pipeline(format!("transformer task failed: {e}")),
        );
    }

    if let Some(err) = signal.take() {
        return Err(err);
    }

    debug!(
        %mode,
        chunk_size = framing.chunk_size(),
        chunks,
        bytes_in,
        bytes_out,
        "pipeline complete"
    );
    Ok(PipelineStats {
        chunks,
        bytes_in,
        bytes_out,
    })
}

/// Stage 1: split the input into `size`-byte chunks (the last may be short).
async fn chunker<R>(
    mut reader: R,
    size: usize,
    tx: mpsc::Sender<Vec<u8>>,
    signal: ErrorSignal,
) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut bytes_in = 0u64;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = signal.cancel.cancelled() => return bytes_in,
            res = read_chunk(&mut reader, size) => match res {
                Ok(chunk) => chunk,
                Err(e) => {
                    signal.raise("chunker", e.into());
                    return bytes_in;
                }
            },
        };
        if chunk.is_empty() {
            return bytes_in;
        }
        bytes_in += chunk.len() as u64;

        tokio::select! {
            biased;
            _ = signal.cancel.cancelled() => return bytes_in,
            sent = tx.send(chunk) => {
                if sent.is_err() {
                    return bytes_in;
                }
            }
        }
    }
}

/// Fill up to `size` bytes, tolerating short reads. Returns fewer bytes only
/// at end of stream.
async fn read_chunk<R>(reader: &mut R, size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Stage 2: seal or open each chunk in arrival order.
async fn transformer(
    mut rx: mpsc::Receiver<Vec<u8>>,
    tx: mpsc::Sender<Vec<u8>>,
    cipher: ChunkCipher,
    mode: Mode,
    signal: ErrorSignal,
) {
    let mut index = 0u64;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = signal.cancel.cancelled() => return,
            next = rx.recv() => match next {
                Some(chunk) => chunk,
                None => return,
            },
        };

        let result = match mode {
            Mode::Encrypt => cipher.seal(&chunk),
            Mode::Decrypt => cipher.open(&chunk),
        };
        let out = match result {
            Ok(out) => out,
            Err(e) => {
                debug!(chunk = index, "chunk transform failed");
                signal.raise("transformer", e.into());
                return;
            }
        };
        trace!(chunk = index, len = out.len(), "chunk transformed");
        index += 1;

        tokio::select! {
            biased;
            _ = signal.cancel.cancelled() => return,
            sent = tx.send(out) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

/// Stage 3: write chunks in arrival order, then flush. Returns
/// `(chunks, bytes_out)`.
async fn committer<W>(
    mut rx: mpsc::Receiver<Vec<u8>>,
    writer: &mut W,
    signal: &ErrorSignal,
) -> (u64, u64)
where
    W: AsyncWrite + Unpin,
{
    let mut chunks = 0u64;
    let mut bytes_out = 0u64;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = signal.cancel.cancelled() => return (chunks, bytes_out),
            next = rx.recv() => match next {
                Some(chunk) => chunk,
                None => break,
            },
        };
        if let Err(e) = writer.write_all(&chunk).await {
            signal.raise("committer", e.into());
            return (chunks, bytes_out);
        }
        chunks += 1;
        bytes_out += chunk.len() as u64;
    }

    if let Err(e) = writer.flush().await {
        signal.raise("committer", e.into());
    }
    (chunks, bytes_out)
}
