// Integration tests for ResumableReadStream
// Tests cover: retry budget, resume offsets, corruption, cancellation, progress

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chunkxfer::{
    ByteStream, CancellationToken, CorruptionKind, ReadState, ResumableReadStream, ResumeOptions,
    TransferError, byte_stream,
};
use futures_util::{StreamExt, future, stream};
use tokio::io::AsyncReadExt;
use tokio_test::{assert_pending, assert_ready};

use common::{init_tracing, payload};

/// Stream over `data[from..upto]` in `piece`-byte fragments.
fn serve(data: &Arc<Vec<u8>>, from: u64, upto: u64, piece: usize) -> ByteStream {
    let slice = data[from as usize..upto as usize].to_vec();
    let parts: Vec<std::io::Result<Bytes>> = slice
        .chunks(piece)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    byte_stream(stream::iter(parts))
}

async fn drain(reader: &mut ResumableReadStream) -> (Vec<u8>, Option<TransferError>) {
    let mut out = Vec::new();
    while let Some(item) = reader.next().await {
        match item {
            Ok(chunk) => out.extend_from_slice(&chunk),
            Err(e) => return (out, Some(e)),
        }
    }
    (out, None)
}

// ============================================================================
// Retry Budget
// ============================================================================

#[tokio::test]
async fn test_stuck_source_fails_after_budget() {
    init_tracing();
    const RETRIES: u32 = 3;
    let data = Arc::new(payload(100));
    let attempts = Arc::new(AtomicUsize::new(1));

    // Every attempt stops at byte 50.
    let (source, counter) = (data.clone(), attempts.clone());
    let mut reader = ResumableReadStream::new(
        serve(&data, 0, 50, 16),
        move |at| {
            counter.fetch_add(1, Ordering::SeqCst);
            let stream = serve(&source, at, 50, 16);
            async move { Ok::<_, std::io::Error>(stream) }
        },
        0,
        100,
        ResumeOptions::default().with_max_retries(RETRIES),
    )
    .unwrap();

    let (out, err) = drain(&mut reader).await;
    assert_eq!(out, data[..50]);
    assert_eq!(attempts.load(Ordering::SeqCst), RETRIES as usize + 1);
    match err {
        Some(TransferError::DataCorruption {
            kind: CorruptionKind::Truncated,
            received,
            expected,
            retries,
        }) => {
            assert_eq!(received, 50);
            assert_eq!(expected, 100);
            assert_eq!(retries, RETRIES);
        }
        other => panic!("expected truncation, got {other:?}"),
    }
    assert_eq!(reader.state(), ReadState::Failed);
    assert!(reader.next().await.is_none(), "failed stream should stay ended");
}

#[tokio::test]
async fn test_zero_budget_fails_on_first_truncation() {
    let data = Arc::new(payload(10));
    let mut reader = ResumableReadStream::new(
        serve(&data, 0, 4, 4),
        |_at| future::ready(Err::<ByteStream, _>(std::io::Error::other("unreachable"))),
        0,
        10,
        ResumeOptions::default().with_max_retries(0),
    )
    .unwrap();

    let (_, err) = drain(&mut reader).await;
    assert!(err.unwrap().is_data_corruption());
    assert_eq!(reader.retries(), 0);
}

#[tokio::test]
async fn test_single_truncation_is_resumed() {
    let data = Arc::new(payload(100));
    let requested = Arc::new(Mutex::new(Vec::new()));

    let (source, log) = (data.clone(), requested.clone());
    let mut reader = ResumableReadStream::new(
        serve(&data, 0, 50, 7),
        move |at| {
            log.lock().unwrap().push(at);
            let stream = serve(&source, at, 100, 7);
            async move { Ok::<_, std::io::Error>(stream) }
        },
        0,
        100,
        ResumeOptions::default().with_max_retries(1),
    )
    .unwrap();

    let (out, err) = drain(&mut reader).await;
    assert!(err.is_none(), "unexpected error: {err:?}");
    assert_eq!(out, *data);
    assert_eq!(*requested.lock().unwrap(), vec![50]);
    assert_eq!(reader.offset(), reader.end());
    assert_eq!(reader.state(), ReadState::Done);
}

#[tokio::test]
async fn test_underlying_error_is_resumed() {
    let data = Arc::new(payload(64));
    let first = stream::iter(vec![
        Ok(Bytes::copy_from_slice(&data[..30])),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
    ]);

    let source = data.clone();
    let mut reader = ResumableReadStream::new(
        first,
        move |at| {
            let stream = serve(&source, at, 64, 64);
            async move { Ok::<_, std::io::Error>(stream) }
        },
        0,
        64,
        ResumeOptions::default(),
    )
    .unwrap();

    let (out, err) = drain(&mut reader).await;
    assert!(err.is_none());
    assert_eq!(out, *data);
    assert_eq!(reader.retries(), 1);
}

#[test]
fn test_stays_pending_until_continuation_arrives() {
    let data = Arc::new(payload(8));
    let (tx, rx) = tokio::sync::oneshot::channel::<ByteStream>();
    let mut rx = Some(rx);

    let reader = ResumableReadStream::new(
        serve(&data, 0, 4, 4),
        move |_at| {
            let rx = rx.take();
            async move {
                match rx {
                    Some(rx) => rx.await.map_err(std::io::Error::other),
                    None => Err(std::io::Error::other("continuation requested twice")),
                }
            }
        },
        0,
        8,
        ResumeOptions::default(),
    )
    .unwrap();
    let mut task = tokio_test::task::spawn(reader);

    assert_eq!(assert_ready!(task.poll_next()).unwrap().unwrap().len(), 4);
    assert_pending!(task.poll_next());
    assert_eq!(task.state(), ReadState::Retrying);

    assert!(tx.send(serve(&data, 4, 8, 4)).is_ok());
    assert!(task.is_woken());
    assert_eq!(assert_ready!(task.poll_next()).unwrap().unwrap().len(), 4);
    assert!(assert_ready!(task.poll_next()).is_none());
    assert_eq!(task.state(), ReadState::Done);
}

#[tokio::test]
async fn test_nonzero_start_offset() {
    let data = Arc::new(payload(500));
    let source = data.clone();
    let mut reader = ResumableReadStream::new(
        serve(&data, 200, 260, 25),
        move |at| {
            let stream = serve(&source, at, 300, 25);
            async move { Ok::<_, std::io::Error>(stream) }
        },
        200,
        100,
        ResumeOptions::default(),
    )
    .unwrap();

    let (out, err) = drain(&mut reader).await;
    assert!(err.is_none());
    assert_eq!(out, data[200..300]);
    assert_eq!(reader.offset(), 300);
}

// ============================================================================
// Corruption and Rejection
// ============================================================================

#[tokio::test]
async fn test_excess_byte_fails_without_retry() {
    let data = Arc::new(payload(11));
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let mut reader = ResumableReadStream::new(
        serve(&data, 0, 11, 11),
        move |_at| {
            counter.fetch_add(1, Ordering::SeqCst);
            future::ready(Err::<ByteStream, _>(std::io::Error::other("unused")))
        },
        0,
        10,
        ResumeOptions::default().with_max_retries(5),
    )
    .unwrap();

    let (out, err) = drain(&mut reader).await;
    assert!(out.is_empty(), "the overrunning fragment must not be forwarded");
    assert!(matches!(
        err,
        Some(TransferError::DataCorruption {
            kind: CorruptionKind::Overrun,
            received: 11,
            expected: 10,
            retries: 0,
        })
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_overrun_after_resume() {
    let data = Arc::new(payload(40));
    let source = data.clone();

    // The continuation ignores the requested end and sends too much.
    let mut reader = ResumableReadStream::new(
        serve(&data, 0, 10, 10),
        move |at| {
            let stream = serve(&source, at, 40, 40);
            async move { Ok::<_, std::io::Error>(stream) }
        },
        0,
        20,
        ResumeOptions::default(),
    )
    .unwrap();

    let (out, err) = drain(&mut reader).await;
    assert_eq!(out, data[..10]);
    let err = err.unwrap();
    assert!(err.is_data_corruption());
    assert!(err.to_string().contains("retries 1"), "{err}");
}

#[tokio::test]
async fn test_rejected_continuation_is_transport_error() {
    let data = Arc::new(payload(10));
    let mut reader = ResumableReadStream::new(
        serve(&data, 0, 5, 5),
        |_at| {
            future::ready(Err::<ByteStream, _>(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "token expired",
            )))
        },
        0,
        10,
        ResumeOptions::default(),
    )
    .unwrap();

    let (out, err) = drain(&mut reader).await;
    assert_eq!(out.len(), 5);
    let io: std::io::Error = err.unwrap().into();
    assert_eq!(io.kind(), std::io::ErrorKind::PermissionDenied);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_while_reading() {
    let token = CancellationToken::new();
    let first = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"abc"))])
        .chain(stream::pending());

    let mut reader = ResumableReadStream::new(
        first,
        |_at| future::pending::<std::io::Result<ByteStream>>(),
        0,
        10,
        ResumeOptions::default().with_cancellation(token.clone()),
    )
    .unwrap();

    assert_eq!(reader.next().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
    token.cancel();

    let err = reader.next().await.unwrap().unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(reader.retries(), 0);
    assert!(reader.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_continuation() {
    init_tracing();
    let token = CancellationToken::new();
    let data = Arc::new(payload(10));

    let mut reader = ResumableReadStream::new(
        serve(&data, 0, 4, 4),
        |_at| future::pending::<std::io::Result<ByteStream>>(),
        0,
        10,
        ResumeOptions::default().with_cancellation(token.clone()),
    )
    .unwrap();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    assert_eq!(reader.next().await.unwrap().unwrap().len(), 4);
    let err = reader.next().await.unwrap().unwrap_err();
    assert!(err.is_aborted(), "expected abort, got {err}");
    assert_eq!(reader.retries(), 1, "cancellation happened during the first retry");
}

#[tokio::test]
async fn test_cancelled_before_first_poll() {
    let token = CancellationToken::new();
    token.cancel();
    let data = Arc::new(payload(4));

    let mut reader = ResumableReadStream::new(
        serve(&data, 0, 4, 4),
        |_at| future::pending::<std::io::Result<ByteStream>>(),
        0,
        4,
        ResumeOptions::default().with_cancellation(token),
    )
    .unwrap();

    assert!(reader.next().await.unwrap().unwrap_err().is_aborted());
}

// ============================================================================
// Progress and Adapters
// ============================================================================

#[tokio::test]
async fn test_progress_is_relative_to_start() {
    let data = Arc::new(payload(100));
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();

    let source = data.clone();
    let mut reader = ResumableReadStream::new(
        serve(&data, 40, 60, 10),
        move |at| {
            let stream = serve(&source, at, 80, 10);
            async move { Ok::<_, std::io::Error>(stream) }
        },
        40,
        40,
        ResumeOptions::default().with_progress(move |loaded| sink.lock().unwrap().push(loaded)),
    )
    .unwrap();

    let (_, err) = drain(&mut reader).await;
    assert!(err.is_none());
    assert_eq!(*reports.lock().unwrap(), vec![10, 20, 30, 40]);
}

#[tokio::test]
async fn test_async_read_across_truncation() {
    let data = Arc::new(payload(300));
    let source = data.clone();
    let reader = ResumableReadStream::new(
        serve(&data, 0, 123, 50),
        move |at| {
            let stream = serve(&source, at, 300, 50);
            async move { Ok::<_, std::io::Error>(stream) }
        },
        0,
        300,
        ResumeOptions::default(),
    )
    .unwrap();

    let mut out = Vec::new();
    reader.into_async_read().read_to_end(&mut out).await.unwrap();
    assert_eq!(out, *data);
}

#[tokio::test]
async fn test_async_read_reports_truncation_as_eof_error() {
    let data = Arc::new(payload(8));
    let reader = ResumableReadStream::new(
        serve(&data, 0, 4, 4),
        |_at| {
            let empty = byte_stream(stream::empty::<std::io::Result<Bytes>>());
            future::ready(Ok::<_, std::io::Error>(empty))
        },
        0,
        8,
        ResumeOptions::default().with_max_retries(2),
    )
    .unwrap();

    let mut out = Vec::new();
    let err = reader.into_async_read().read_to_end(&mut out).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}
