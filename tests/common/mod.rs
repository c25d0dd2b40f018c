// Shared helpers for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 13) as u8).collect()
}

/// Splits `data` into fragments whose sizes cycle through `sizes`.
pub fn fragmented(data: &[u8], sizes: &[usize]) -> Vec<Bytes> {
    let mut out = Vec::new();
    let mut at = 0;
    let mut i = 0;
    while at < data.len() {
        let len = sizes[i % sizes.len()].max(1).min(data.len() - at);
        out.push(Bytes::copy_from_slice(&data[at..at + len]));
        at += len;
        i += 1;
    }
    out
}

/// Infallible stream over prepared fragments.
pub fn ok_stream(parts: Vec<Bytes>) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    stream::iter(parts.into_iter().map(Ok))
}
