#![no_main]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chunkxfer::{ChunkBuffer, ChunkBufferScheduler, SchedulerConfig};
use futures_util::stream;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, u8, u8, Vec<u8>, Vec<u8>)| {
    let (buffer_size, max_buffers, parallelism, cuts, data) = input;
    let buffer_size = buffer_size as usize % 64 + 1;
    let max_buffers = max_buffers as usize % 4 + 1;
    let parallelism = parallelism as usize % 4 + 1;

    // Fragment boundaries come from the fuzzer too.
    let mut parts = Vec::new();
    let mut at = 0;
    for (i, cut) in cuts.iter().cycle().enumerate() {
        if at >= data.len() || i > data.len() {
            break;
        }
        let len = (*cut as usize).max(1).min(data.len() - at);
        parts.push(Bytes::copy_from_slice(&data[at..at + len]));
        at += len;
    }
    if at < data.len() {
        parts.push(Bytes::copy_from_slice(&data[at..]));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let stats = runtime.block_on(async move {
        let input = stream::iter(parts.into_iter().map(Ok::<_, std::io::Error>));
        let config = SchedulerConfig::new(buffer_size, max_buffers, parallelism).unwrap();
        let mut scheduler = ChunkBufferScheduler::new(input, config, move |chunk: ChunkBuffer| {
            sink.lock().unwrap().push((chunk.offset(), chunk.to_vec()));
            async { Ok::<_, std::io::Error>(()) }
        })
        .unwrap();
        scheduler.run().await.unwrap();
        scheduler.stats()
    });

    // Verify: memory bound
    assert!(stats.allocated_buffers <= max_buffers);

    // Verify: offsets are 0, B, 2B, ... and bytes match the input
    let mut chunks = seen.lock().unwrap().clone();
    chunks.sort_by_key(|(offset, _)| *offset);
    let mut expected_offset = 0usize;
    for (i, (offset, bytes)) in chunks.iter().enumerate() {
        assert_eq!(*offset as usize, expected_offset);
        if i + 1 < chunks.len() {
            assert_eq!(bytes.len(), buffer_size);
        }
        assert_eq!(&bytes[..], &data[expected_offset..expected_offset + bytes.len()]);
        expected_offset += bytes.len();
    }
    assert_eq!(expected_offset, data.len());
});
