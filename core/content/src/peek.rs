//! Reading the head of a byte stream without losing it.

use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};

use filestore_common::{ByteStream, Result};

/// Read at least `len` bytes from the front of `source`, if available.
///
/// Returns the first `min(len, total)` bytes and a stream that replays every
/// chunk that was consumed, followed by the untouched remainder. Downstream
/// readers observe the original content byte for byte.
///
/// # Errors
/// - An error yielded by `source` while reading the head
pub async fn peek_prefix(mut source: ByteStream, len: usize) -> Result<(Bytes, ByteStream)> {
    let mut consumed: Vec<Bytes> = Vec::new();
    let mut total = 0;

    while total < len {
        match source.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                total += chunk.len();
                consumed.push(chunk);
            }
            None => break,
        }
    }

    let mut prefix = BytesMut::with_capacity(len.min(total));
    for chunk in &consumed {
        let remaining = len - prefix.len();
        if remaining == 0 {
            break;
        }
        prefix.extend_from_slice(&chunk[..remaining.min(chunk.len())]);
    }

    let replay = stream::iter(consumed.into_iter().map(Ok)).chain(source);
    Ok((prefix.freeze(), Box::pin(replay)))
}
