use crate::pane::OutputPane;
use crate::process::ByteStream;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decodes whatever bytes are available into text.
///
/// An incomplete trailing UTF-8 sequence is held back until the rest of it
/// arrives; invalid bytes are replaced rather than ending the stream.
struct Utf8Codec;

impl Decoder for Utf8Codec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let take = match std::str::from_utf8(&src[..]) {
            Ok(_) => src.len(),
            Err(e) => match e.error_len() {
                None if e.valid_up_to() == 0 => return Ok(None),
                None => e.valid_up_to(),
                Some(invalid) => e.valid_up_to() + invalid,
            },
        };

        let out = String::from_utf8_lossy(&src[..take]).into_owned();
        src.advance(take);
        Ok(Some(out))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(text) => Ok(Some(text)),
            None if src.is_empty() => Ok(None),
            None => {
                let out = String::from_utf8_lossy(src).into_owned();
                src.clear();
                Ok(Some(out))
            }
        }
    }
}

/// Output listeners of one run.
///
/// Each stream is forwarded by its own reader, so chunks keep their order
/// within a stream while stdout and stderr interleave freely.
pub struct Relay {
    cancel: CancellationToken,
    readers: Vec<JoinHandle<()>>,
}

/// Start forwarding `stdout` and `stderr` chunks to `sink`
pub fn attach(
    stdout: Option<ByteStream>,
    stderr: Option<ByteStream>,
    sink: Arc<dyn OutputPane>,
) -> Relay {
    let cancel = CancellationToken::new();
    let readers = [stdout, stderr]
        .into_iter()
        .flatten()
        .map(|io| tokio::spawn(forward(io, sink.clone(), cancel.clone())))
        .collect();

    Relay { cancel, readers }
}

impl Relay {
    /// Remove all listeners.
    ///
    /// Once this returns the sink receives nothing more. Output still
    /// buffered in the pipes at that point is dropped, not flushed.
    pub async fn detach(mut self) {
        self.cancel.cancel();
        for reader in std::mem::take(&mut self.readers) {
            if let Err(e) = reader.await {
                if e.is_panic() {
                    warn!(error = %e, "Output reader panicked");
                }
            }
        }
    }

    pub fn is_detached(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward(io: ByteStream, sink: Arc<dyn OutputPane>, cancel: CancellationToken) {
    let mut frames = FramedRead::with_capacity(io, Utf8Codec, 1024);
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(text)) => {
                if cancel.is_cancelled() {
                    break;
                }
                sink.append(&text).await;
            }
            Some(Err(e)) => {
                warn!(pane = %sink.title(), error = %e, "Output stream failed");
                break;
            }
            None => {
                debug!(pane = %sink.title(), "Output stream closed");
                break;
            }
        }
    }
}
