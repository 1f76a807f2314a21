//! DEFLATE/INFLATE compression shim (specification §4.4).
//!
//! Once enabled — per RFC 4978, after a successful `COMPRESS DEFLATE` — the
//! engine routes every inbound chunk through INFLATE before handing it to
//! the framer, and every outbound chunk through DEFLATE before writing it
//! to the transport. Both directions use raw DEFLATE streams (no zlib or
//! gzip framing), matching what `COMPRESS=DEFLATE` servers expect.
//!
//! Codec work can run inline on the connection task, or be offloaded to a
//! dedicated worker task reached over a channel (specification's "worker"
//! concept); [`Compression::spawn_worker`] selects the latter.

use flate2::{Compression as Level, FlushCompress, FlushDecompress, Status};
use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result};

/// A raw-DEFLATE encoder/decoder pair, one stream per direction.
struct Codec {
    inflater: flate2::Decompress,
    deflater: flate2::Compress,
}

impl Codec {
    fn new() -> Self {
        Self {
            inflater: flate2::Decompress::new(false),
            deflater: flate2::Compress::new(Level::default(), false),
        }
    }

    fn inflate(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        const CHUNK: usize = 8192;
        let mut output = Vec::with_capacity(input.len() * 2 + 64);
        let mut chunk = vec![0_u8; CHUNK];
        let mut consumed = 0;
        loop {
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = self
                .inflater
                .decompress(&input[consumed..], &mut chunk, FlushDecompress::Sync)
                .map_err(|e| Error::Worker(format!("inflate failed: {e}")))?;
            let produced = (self.inflater.total_out() - before_out) as usize;
            let advanced = (self.inflater.total_in() - before_in) as usize;
            output.extend_from_slice(&chunk[..produced]);
            consumed += advanced;

            if status == Status::StreamEnd || (consumed >= input.len() && produced < CHUNK) {
                break;
            }
            if advanced == 0 && produced == 0 {
                return Err(Error::Worker("inflate made no progress".to_string()));
            }
        }
        Ok(output)
    }

    fn deflate(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        const CHUNK: usize = 8192;
        let mut output = Vec::with_capacity(input.len() + 64);
        let mut chunk = vec![0_u8; CHUNK];
        let mut consumed = 0;
        loop {
            let before_in = self.deflater.total_in();
            let before_out = self.deflater.total_out();
            let status = self
                .deflater
                .compress(&input[consumed..], &mut chunk, FlushCompress::Sync)
                .map_err(|e| Error::Worker(format!("deflate failed: {e}")))?;
            let produced = (self.deflater.total_out() - before_out) as usize;
            let advanced = (self.deflater.total_in() - before_in) as usize;
            output.extend_from_slice(&chunk[..produced]);
            consumed += advanced;

            if status == Status::StreamEnd || (consumed >= input.len() && produced < CHUNK) {
                break;
            }
            if advanced == 0 && produced == 0 {
                return Err(Error::Worker("deflate made no progress".to_string()));
            }
        }
        Ok(output)
    }
}

enum WorkerRequest {
    Inflate(Vec<u8>, oneshot::Sender<Result<Vec<u8>>>),
    Deflate(Vec<u8>, oneshot::Sender<Result<Vec<u8>>>),
}

/// The DEFLATE/INFLATE shim; one instance per connection, created only
/// after `enable_compression()` (see [`crate::engine`]).
pub enum Compression {
    /// Codec runs inline on the connection task.
    Inline(Box<Codec>),
    /// Codec runs on a dedicated worker task, reached by channel.
    Worker(mpsc::UnboundedSender<WorkerRequest>),
}

impl Compression {
    /// Creates a shim that runs the codec inline, with no offload.
    #[must_use]
    pub fn inline() -> Self {
        Self::Inline(Box::new(Codec::new()))
    }

    /// Creates a shim backed by a dedicated worker task.
    ///
    /// An uncaught panic in the worker surfaces to the caller as
    /// [`Error::Worker`] the next time `inflate`/`deflate` is called.
    #[must_use]
    pub fn spawn_worker() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerRequest>();
        tokio::spawn(async move {
            let mut codec = Codec::new();
            while let Some(request) = rx.recv().await {
                match request {
                    WorkerRequest::Inflate(data, reply) => {
                        let _ = reply.send(codec.inflate(&data));
                    }
                    WorkerRequest::Deflate(data, reply) => {
                        let _ = reply.send(codec.deflate(&data));
                    }
                }
            }
        });
        Self::Worker(tx)
    }

    /// Decompresses one chunk of inbound bytes.
    ///
    /// # Errors
    /// Returns [`Error::Worker`] if the DEFLATE stream is malformed or the
    /// worker task is gone.
    pub async fn inflate(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Inline(codec) => codec.inflate(data),
            Self::Worker(tx) => Self::roundtrip(tx, WorkerRequest::Inflate, data).await,
        }
    }

    /// Compresses one chunk of outbound bytes.
    ///
    /// # Errors
    /// Returns [`Error::Worker`] if the worker task is gone.
    pub async fn deflate(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Inline(codec) => codec.deflate(data),
            Self::Worker(tx) => Self::roundtrip(tx, WorkerRequest::Deflate, data).await,
        }
    }

    async fn roundtrip(
        tx: &mpsc::UnboundedSender<WorkerRequest>,
        build: impl FnOnce(Vec<u8>, oneshot::Sender<Result<Vec<u8>>>) -> WorkerRequest,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(build(data.to_vec(), reply_tx))
            .map_err(|_| Error::Worker("compression worker channel closed".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Worker("compression worker task dropped".to_string()))?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_round_trips_plaintext() {
        let mut compression = Compression::inline();
        let original = b"* OK IMAP4rev1 Server ready\r\n".to_vec();
        let compressed = compression.deflate(&original).await.unwrap();
        assert_ne!(compressed, original);
        let decompressed = compression.inflate(&compressed).await.unwrap();
        assert_eq!(decompressed, original);
    }

    #[tokio::test]
    async fn worker_round_trips_plaintext() {
        let mut compression = Compression::spawn_worker();
        let original = b"A1 CAPABILITY\r\n".to_vec();
        let compressed = compression.deflate(&original).await.unwrap();
        let decompressed = compression.inflate(&compressed).await.unwrap();
        assert_eq!(decompressed, original);
    }

    #[tokio::test]
    async fn round_trips_data_split_across_multiple_calls() {
        let mut sender = Compression::inline();
        let mut receiver = Compression::inline();

        let part1 = b"* 1 FETCH (BODY[] {5}\r\n".to_vec();
        let part2 = b"hello)\r\nW1 OK fetched\r\n".to_vec();

        let mut plaintext = Vec::new();
        for part in [part1, part2] {
            let compressed = sender.deflate(&part).await.unwrap();
            plaintext.extend(receiver.inflate(&compressed).await.unwrap());
        }

        assert_eq!(plaintext, b"* 1 FETCH (BODY[] {5}\r\nhello)\r\nW1 OK fetched\r\n");
    }
}
