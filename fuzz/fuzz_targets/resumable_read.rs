#![no_main]

use std::sync::Arc;

use bytes::Bytes;
use chunkxfer::{ByteStream, ResumableReadStream, ResumeOptions, byte_stream};
use futures_util::{StreamExt, stream};
use libfuzzer_sys::fuzz_target;

// Each attempt delivers `cuts[attempt]` bytes of the remaining range
// (0 means the full remainder); the reader must either deliver the exact
// range or fail, never yield wrong bytes.
fuzz_target!(|input: (u8, Vec<u8>, Vec<u8>)| {
    let (max_retries, cuts, data) = input;
    let max_retries = u32::from(max_retries % 8);
    let data = Arc::new(data);
    let cuts = Arc::new(cuts);
    let count = data.len() as u64;

    let serve = {
        let data = data.clone();
        let cuts = cuts.clone();
        move |attempt: usize, from: u64| -> ByteStream {
            let remaining = data.len() - from as usize;
            let cut = cuts.get(attempt).copied().unwrap_or(0) as usize;
            let len = if cut == 0 { remaining } else { cut.min(remaining) };
            let part = Bytes::copy_from_slice(&data[from as usize..from as usize + len]);
            byte_stream(stream::iter(vec![Ok::<_, std::io::Error>(part)]))
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let initial = serve(0, 0);
        let mut attempt = 0;
        let mut reader = ResumableReadStream::new(
            initial,
            move |at| {
                attempt += 1;
                let stream = serve(attempt, at);
                async move { Ok::<_, std::io::Error>(stream) }
            },
            0,
            count,
            ResumeOptions::default().with_max_retries(max_retries),
        )
        .unwrap();

        let mut out = Vec::new();
        let mut failed = false;
        while let Some(item) = reader.next().await {
            match item {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(e) => {
                    assert!(e.is_data_corruption());
                    failed = true;
                }
            }
        }

        assert_eq!(&out[..], &data[..out.len()]);
        if !failed {
            assert_eq!(out.len(), data.len());
        }
        assert!(reader.retries() <= max_retries);
    });
});
