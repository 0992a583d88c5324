use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::errors::StreamFailure;
use crate::event::{StreamEvent, decode_event};
use crate::sse::FrameAssembler;
use crate::transport::{QueryRequest, StreamTransport};

type ProgressFn = Box<dyn FnMut(&str, &str, &serde_json::Value) + Send>;
type CompleteFn = Box<dyn FnMut(serde_json::Value) + Send>;
type ErrorFn = Box<dyn FnMut(&str) + Send>;

/// The three callbacks a stream session dispatches into.
///
/// Callbacks run on the session task, synchronously and in arrival order.
/// Exactly one terminal callback (`on_complete` xor `on_error`) fires per
/// session, and none fire after cancellation.
pub struct StreamCallbacks {
    on_progress: ProgressFn,
    on_complete: CompleteFn,
    on_error: ErrorFn,
}

impl StreamCallbacks {
    /// Bundles progress/complete/error callbacks for a session.
    pub fn new<P, C, E>(on_progress: P, on_complete: C, on_error: E) -> Self
    where
        P: FnMut(&str, &str, &serde_json::Value) + Send + 'static,
        C: FnMut(serde_json::Value) + Send + 'static,
        E: FnMut(&str) + Send + 'static,
    {
        Self {
            on_progress: Box::new(on_progress),
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }
}

/// Handle used to request cancellation of a running session.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent.
    ///
    /// Cancellation aborts the in-flight read, suppresses every further
    /// callback (including frames already buffered), and resolves
    /// `QueryStream::finish` with `StreamFailure::Cancelled`.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Counters for a session that completed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    /// Number of callback dispatches (progress plus the terminal event).
    pub events_dispatched: u64,
    /// Number of frames dropped because their payload failed to decode.
    pub skipped_frames: u64,
}

/// Handle for one in-flight query stream.
///
/// Dropping the handle does not cancel the session; use `cancel_handle()`.
pub struct QueryStream {
    cancel: CancelHandle,
    done: oneshot::Receiver<Result<StreamSummary, StreamFailure>>,
}

impl QueryStream {
    /// Returns a handle that can cancel the session.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Waits for the session to terminate and returns its outcome.
    ///
    /// `Ok` carries dispatch counters after a `complete` event; every other
    /// termination (server error, transport failure, early end-of-stream,
    /// cancellation) is the matching `StreamFailure`.
    pub async fn finish(self) -> Result<StreamSummary, StreamFailure> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(StreamFailure::transport(
                "session task ended without a result",
            )),
        }
    }
}

/// Spawns the reader task for one query and returns its handle.
pub(crate) fn spawn_session(
    transport: Arc<dyn StreamTransport>,
    request: QueryRequest,
    callbacks: StreamCallbacks,
) -> QueryStream {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(session_task(transport, request, callbacks, cancel_rx, done_tx));
    QueryStream {
        cancel: CancelHandle { tx: cancel_tx },
        done: done_rx,
    }
}

enum Dispatch {
    Continue,
    Completed,
    Failed(StreamFailure),
}

async fn session_task(
    transport: Arc<dyn StreamTransport>,
    request: QueryRequest,
    mut callbacks: StreamCallbacks,
    mut cancel_rx: watch::Receiver<bool>,
    done_tx: oneshot::Sender<Result<StreamSummary, StreamFailure>>,
) {
    let opened = tokio::select! {
        _ = wait_for_cancel(&mut cancel_rx) => {
            let _ = done_tx.send(Err(StreamFailure::Cancelled));
            return;
        }
        opened = transport.open(&request) => opened,
    };
    let mut bytes = match opened {
        Ok(bytes) => bytes,
        Err(failure) => {
            (callbacks.on_error)(&failure.message());
            let _ = done_tx.send(Err(failure));
            return;
        }
    };
    debug!(question_len = request.question.len(), "query stream open");

    let mut assembler = FrameAssembler::default();
    let mut summary = StreamSummary::default();
    loop {
        let next = tokio::select! {
            _ = wait_for_cancel(&mut cancel_rx) => {
                let _ = done_tx.send(Err(StreamFailure::Cancelled));
                return;
            }
            next = bytes.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                for payload in assembler.feed(&chunk) {
                    // A cancel that raced the read still wins over frames
                    // already sitting in the buffer.
                    if *cancel_rx.borrow() {
                        let _ = done_tx.send(Err(StreamFailure::Cancelled));
                        return;
                    }
                    match dispatch_payload(&payload, &mut callbacks, &mut summary) {
                        Dispatch::Continue => {}
                        Dispatch::Completed => {
                            let _ = done_tx.send(Ok(summary));
                            return;
                        }
                        Dispatch::Failed(failure) => {
                            let _ = done_tx.send(Err(failure));
                            return;
                        }
                    }
                }
            }
            Some(Err(failure)) => {
                if *cancel_rx.borrow() {
                    let _ = done_tx.send(Err(StreamFailure::Cancelled));
                    return;
                }
                (callbacks.on_error)(&failure.message());
                let _ = done_tx.send(Err(failure));
                return;
            }
            None => {
                if *cancel_rx.borrow() {
                    let _ = done_tx.send(Err(StreamFailure::Cancelled));
                    return;
                }
                if let Some(payload) = assembler.flush() {
                    match dispatch_payload(&payload, &mut callbacks, &mut summary) {
                        Dispatch::Completed => {
                            let _ = done_tx.send(Ok(summary));
                            return;
                        }
                        Dispatch::Failed(failure) => {
                            let _ = done_tx.send(Err(failure));
                            return;
                        }
                        Dispatch::Continue => {}
                    }
                }
                debug!("stream closed without a terminal event");
                (callbacks.on_error)(&StreamFailure::EndedEarly.message());
                let _ = done_tx.send(Err(StreamFailure::EndedEarly));
                return;
            }
        }
    }
}

/// Resolves once cancellation is requested; never resolves if every
/// `CancelHandle` has been dropped.
async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

fn dispatch_payload(
    payload: &str,
    callbacks: &mut StreamCallbacks,
    summary: &mut StreamSummary,
) -> Dispatch {
    match decode_event(payload) {
        Ok(StreamEvent::Progress {
            stage,
            message,
            raw,
        }) => {
            debug!(%stage, "progress event");
            (callbacks.on_progress)(&stage, &message, &raw);
            summary.events_dispatched += 1;
            Dispatch::Continue
        }
        Ok(StreamEvent::Complete { result }) => {
            debug!("complete event");
            (callbacks.on_complete)(result);
            summary.events_dispatched += 1;
            Dispatch::Completed
        }
        Ok(StreamEvent::Error { message }) => {
            (callbacks.on_error)(&message);
            summary.events_dispatched += 1;
            Dispatch::Failed(StreamFailure::Server { message })
        }
        Err(err) => {
            warn!(error = %err, payload_len = payload.len(), "skipping undecodable frame");
            summary.skipped_frames += 1;
            Dispatch::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::transport::ByteStream;

    enum FakeBehavior {
        Chunks(Vec<Result<Bytes, StreamFailure>>),
        ChunksThenPending(Vec<Bytes>),
        OpenFailure(StreamFailure),
    }

    struct FakeTransport {
        behavior: FakeBehavior,
    }

    #[async_trait::async_trait]
    impl StreamTransport for FakeTransport {
        async fn open(&self, _request: &QueryRequest) -> Result<ByteStream, StreamFailure> {
            match &self.behavior {
                FakeBehavior::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks.clone()))),
                FakeBehavior::ChunksThenPending(chunks) => {
                    let head =
                        stream::iter(chunks.clone().into_iter().map(Ok::<_, StreamFailure>));
                    Ok(Box::pin(head.chain(stream::pending())))
                }
                FakeBehavior::OpenFailure(failure) => Err(failure.clone()),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, call: String) {
            self.calls.lock().expect("recorder lock").push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("recorder lock").clone()
        }
    }

    fn recording_callbacks(recorder: &Arc<Recorder>) -> StreamCallbacks {
        let progress_rec = recorder.clone();
        let complete_rec = recorder.clone();
        let error_rec = recorder.clone();
        StreamCallbacks::new(
            move |stage, message, _raw| progress_rec.push(format!("progress:{stage}:{message}")),
            move |result| complete_rec.push(format!("complete:{result}")),
            move |message| error_rec.push(format!("error:{message}")),
        )
    }

    fn start(behavior: FakeBehavior, recorder: &Arc<Recorder>) -> QueryStream {
        spawn_session(
            Arc::new(FakeTransport { behavior }),
            QueryRequest::new("what is in the docs?"),
            recording_callbacks(recorder),
        )
    }

    async fn wait_for_calls(recorder: &Arc<Recorder>, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.calls().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expected callback count was never reached");
    }

    #[tokio::test]
    async fn dispatches_progress_then_complete_in_order() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(
            FakeBehavior::Chunks(vec![
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"progress\",\"stage\":\"planning\",\"message\":\"Planning\"}\n\n",
                )),
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"complete\",\"result\":{\"answer\":\"42\"}}\n\n",
                )),
            ]),
            &recorder,
        );

        let summary = stream.finish().await.expect("finish");
        assert_eq!(
            recorder.calls(),
            vec![
                "progress:planning:Planning".to_string(),
                "complete:{\"answer\":\"42\"}".to_string(),
            ]
        );
        assert_eq!(summary.events_dispatched, 2);
        assert_eq!(summary.skipped_frames, 0);
    }

    #[tokio::test]
    async fn frames_split_across_chunks_dispatch_once() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(
            FakeBehavior::Chunks(vec![
                Ok(Bytes::from_static(b"da")),
                Ok(Bytes::from_static(
                    b"ta: {\"type\":\"progress\",\"stage\":\"retrieving\",\"mess",
                )),
                Ok(Bytes::from_static(b"age\":\"Fetching\"}\n")),
                Ok(Bytes::from_static(
                    b"\ndata: {\"type\":\"complete\",\"result\":null}\n\n",
                )),
            ]),
            &recorder,
        );

        let summary = stream.finish().await.expect("finish");
        assert_eq!(
            recorder.calls(),
            vec![
                "progress:retrieving:Fetching".to_string(),
                "complete:null".to_string(),
            ]
        );
        assert_eq!(summary.events_dispatched, 2);
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped_without_terminating() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(
            FakeBehavior::Chunks(vec![
                Ok(Bytes::from_static(b"data: {broken\n\n")),
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"progress\",\"stage\":\"planning\",\"message\":\"ok\"}\n\n",
                )),
                Ok(Bytes::from_static(b"data: {\"type\":\"heartbeat\"}\n\n")),
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"complete\",\"result\":{\"answer\":\"done\"}}\n\n",
                )),
            ]),
            &recorder,
        );

        let summary = stream.finish().await.expect("finish");
        assert_eq!(
            recorder.calls(),
            vec![
                "progress:planning:ok".to_string(),
                "complete:{\"answer\":\"done\"}".to_string(),
            ]
        );
        assert_eq!(summary.skipped_frames, 2);
        assert_eq!(summary.events_dispatched, 2);
    }

    #[tokio::test]
    async fn eof_without_terminal_event_reports_early_end() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(
            FakeBehavior::Chunks(vec![Ok(Bytes::from_static(
                b"data: {\"type\":\"progress\",\"stage\":\"planning\",\"message\":\"ok\"}\n\n",
            ))]),
            &recorder,
        );

        let result = stream.finish().await;
        assert_eq!(result, Err(StreamFailure::EndedEarly));
        assert_eq!(
            recorder.calls(),
            vec![
                "progress:planning:ok".to_string(),
                "error:stream ended unexpectedly".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn server_error_event_is_terminal() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(
            FakeBehavior::Chunks(vec![
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"error\",\"message\":\"planner failed\"}\n\n",
                )),
                // Nothing after the terminal event may be dispatched.
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"progress\",\"stage\":\"late\",\"message\":\"no\"}\n\n",
                )),
            ]),
            &recorder,
        );

        let result = stream.finish().await;
        assert_eq!(
            result,
            Err(StreamFailure::Server {
                message: "planner failed".into()
            })
        );
        assert_eq!(recorder.calls(), vec!["error:planner failed".to_string()]);
    }

    #[tokio::test]
    async fn open_failure_invokes_on_error_once() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(
            FakeBehavior::OpenFailure(StreamFailure::transport("connection refused")),
            &recorder,
        );

        let result = stream.finish().await;
        assert!(matches!(result, Err(StreamFailure::Transport { .. })));
        assert_eq!(
            recorder.calls(),
            vec!["error:transport failure: connection refused".to_string()]
        );
    }

    #[tokio::test]
    async fn mid_stream_read_failure_is_translated() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(
            FakeBehavior::Chunks(vec![
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"progress\",\"stage\":\"planning\",\"message\":\"ok\"}\n\n",
                )),
                Err(StreamFailure::transport("connection reset")),
            ]),
            &recorder,
        );

        let result = stream.finish().await;
        assert_eq!(
            result,
            Err(StreamFailure::Transport {
                message: "connection reset".into()
            })
        );
        assert_eq!(
            recorder.calls(),
            vec![
                "progress:planning:ok".to_string(),
                "error:transport failure: connection reset".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn cancel_suppresses_buffered_frames_and_further_callbacks() {
        let recorder = Arc::new(Recorder::default());
        // One complete progress frame plus the unterminated start of a
        // complete frame, then the transport hangs.
        let stream = start(
            FakeBehavior::ChunksThenPending(vec![Bytes::from_static(
                b"data: {\"type\":\"progress\",\"stage\":\"planning\",\"message\":\"ok\"}\n\ndata: {\"type\":\"complete\",\"result\"",
            )]),
            &recorder,
        );
        wait_for_calls(&recorder, 1).await;

        let cancel = stream.cancel_handle();
        cancel.cancel();
        cancel.cancel();

        let result = stream.finish().await;
        assert_eq!(result, Err(StreamFailure::Cancelled));
        // No on_error for cancellation, and nothing flushed after it.
        assert_eq!(recorder.calls(), vec!["progress:planning:ok".to_string()]);
    }

    #[tokio::test]
    async fn cancel_before_any_chunk_fires_no_callbacks() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(FakeBehavior::ChunksThenPending(vec![]), &recorder);

        stream.cancel_handle().cancel();
        let result = stream.finish().await;
        assert_eq!(result, Err(StreamFailure::Cancelled));
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn trailing_unterminated_terminal_frame_is_flushed() {
        let recorder = Arc::new(Recorder::default());
        let stream = start(
            FakeBehavior::Chunks(vec![
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"progress\",\"stage\":\"verifying\",\"message\":\"ok\"}\n\n",
                )),
                // Terminal frame without a trailing blank line before EOF.
                Ok(Bytes::from_static(
                    b"data: {\"type\":\"complete\",\"result\":{\"answer\":\"x\"}}",
                )),
            ]),
            &recorder,
        );

        let summary = stream.finish().await.expect("finish");
        assert_eq!(
            recorder.calls(),
            vec![
                "progress:verifying:ok".to_string(),
                "complete:{\"answer\":\"x\"}".to_string(),
            ]
        );
        assert_eq!(summary.events_dispatched, 2);
    }

    #[tokio::test]
    async fn concurrent_sessions_are_independent() {
        let first_rec = Arc::new(Recorder::default());
        let second_rec = Arc::new(Recorder::default());
        let first = start(
            FakeBehavior::Chunks(vec![Ok(Bytes::from_static(
                b"data: {\"type\":\"complete\",\"result\":\"a\"}\n\n",
            ))]),
            &first_rec,
        );
        let second = start(
            FakeBehavior::Chunks(vec![Ok(Bytes::from_static(
                b"data: {\"type\":\"complete\",\"result\":\"b\"}\n\n",
            ))]),
            &second_rec,
        );

        let (first, second) = tokio::join!(first.finish(), second.finish());
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(first_rec.calls(), vec!["complete:\"a\"".to_string()]);
        assert_eq!(second_rec.calls(), vec!["complete:\"b\"".to_string()]);
    }
}
