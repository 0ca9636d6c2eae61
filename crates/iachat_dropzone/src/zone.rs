use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use iachat_contract::{decode_reply, ReplyError, UploadReply, UPLOAD_FIELD, UPLOAD_PATH};
use thiserror::Error;
use tracing::{debug, warn};

use crate::dom::{DragEvent, DragEventKind, DropTarget, DroppedFile, LogView, DRAG_OVER_CLASS};
use crate::transport::{TransportError, UploadTransport};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] ReplyError),
}

#[derive(Debug)]
pub enum DropOutcome {
    /// Enter, over or leave: only drag state changed.
    Tracked,
    /// A drop without files.
    Ignored,
    Uploaded(UploadReply),
    /// Already reported in the log view.
    Failed(UploadError),
}

/// Optional hooks around an upload. Both default to doing nothing.
pub trait UploadObserver: Send + Sync {
    fn on_upload_start(&self, _file_count: usize) {}
    fn on_upload_done(&self, _reply: &UploadReply) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

/// One wired drop target. Each zone owns its own drag state, so several
/// zones can share a page without interfering.
pub struct DropZone {
    target: Arc<dyn DropTarget>,
    log: Arc<dyn LogView>,
    transport: Arc<dyn UploadTransport>,
    observer: Arc<dyn UploadObserver>,
    dragging: AtomicBool,
}

impl DropZone {
    pub fn new(
        target: Arc<dyn DropTarget>,
        log: Arc<dyn LogView>,
        transport: Arc<dyn UploadTransport>,
    ) -> Self {
        Self {
            target,
            log,
            transport,
            observer: Arc::new(NoopObserver),
            dragging: AtomicBool::new(false),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.load(Ordering::SeqCst)
    }

    /// Handles one drag event. Default handling and propagation are
    /// suppressed for every kind before anything else happens; otherwise the
    /// browser would open the dropped file instead of uploading it.
    ///
    /// Upload failures are written to the log view and returned, never
    /// propagated, so the zone keeps accepting drops afterwards.
    pub async fn handle_event(&self, event: &dyn DragEvent) -> DropOutcome {
        event.prevent_default();
        event.stop_propagation();

        match event.kind() {
            DragEventKind::Enter => {
                self.dragging.store(true, Ordering::SeqCst);
                self.target.add_class(DRAG_OVER_CLASS);
                DropOutcome::Tracked
            }
            DragEventKind::Over => DropOutcome::Tracked,
            DragEventKind::Leave => {
                self.clear_drag_state();
                DropOutcome::Tracked
            }
            DragEventKind::Drop => {
                self.clear_drag_state();
                self.handle_drop(event.files()).await
            }
        }
    }

    async fn handle_drop(&self, files: &[DroppedFile]) -> DropOutcome {
        if files.is_empty() {
            debug!("drop without files ignored");
            return DropOutcome::Ignored;
        }

        self.log_line(&format!("# Soltados {} archivo(s)...", files.len()));
        for file in files {
            self.log_line(&format!(
                "# Archivo agregado: {} ({} bytes)",
                file.name,
                file.size()
            ));
        }

        self.observer.on_upload_start(files.len());

        match self.submit(files).await {
            Ok(reply) => {
                self.log_line(&format!("# Subida completada (HTTP {})", reply.status));
                self.observer.on_upload_done(&reply);
                DropOutcome::Uploaded(reply)
            }
            Err(err) => {
                warn!(error = %err, files = files.len(), "upload failed");
                self.log_line(&format!("# Error: {err}"));
                DropOutcome::Failed(err)
            }
        }
    }

    async fn submit(&self, files: &[DroppedFile]) -> Result<UploadReply, UploadError> {
        let response = self
            .transport
            .post_multipart(UPLOAD_PATH, UPLOAD_FIELD, files)
            .await?;
        Ok(decode_reply(response.status, &response.body)?)
    }

    fn clear_drag_state(&self) {
        self.dragging.store(false, Ordering::SeqCst);
        self.target.remove_class(DRAG_OVER_CLASS);
    }

    fn log_line(&self, line: &str) {
        self.log.append_line(line);
        self.log.scroll_to_bottom();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use iachat_contract::UploadReply;
    use serde_json::json;

    use super::{DropOutcome, DropZone, UploadError, UploadObserver};
    use crate::dom::{
        BufferedLog, ClassList, DragEvent, DragEventKind, DropTarget, DroppedFile, LogView,
        SyntheticDragEvent, DRAG_OVER_CLASS,
    };
    use crate::transport::{RawResponse, TransportError, UploadTransport};

    type Timeline = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        requests: Mutex<Vec<(String, String, Vec<DroppedFile>)>>,
        timeline: Timeline,
    }

    impl ScriptedTransport {
        fn answering(responses: Vec<Result<RawResponse, TransportError>>, timeline: Timeline) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                timeline,
            }
        }

        fn requests(&self) -> Vec<(String, String, Vec<DroppedFile>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UploadTransport for ScriptedTransport {
        async fn post_multipart(
            &self,
            path: &str,
            field: &str,
            files: &[DroppedFile],
        ) -> Result<RawResponse, TransportError> {
            self.timeline.lock().unwrap().push("post".to_string());
            self.requests
                .lock()
                .unwrap()
                .push((path.to_string(), field.to_string(), files.to_vec()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Request("connection refused".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        starts: Mutex<Vec<usize>>,
        dones: Mutex<Vec<UploadReply>>,
        timeline: Timeline,
    }

    impl UploadObserver for RecordingObserver {
        fn on_upload_start(&self, file_count: usize) {
            self.timeline.lock().unwrap().push(format!("start:{file_count}"));
            self.starts.lock().unwrap().push(file_count);
        }

        fn on_upload_done(&self, reply: &UploadReply) {
            self.timeline.lock().unwrap().push("done".to_string());
            self.dones.lock().unwrap().push(reply.clone());
        }
    }

    struct TimelineLog {
        inner: BufferedLog,
        timeline: Timeline,
    }

    impl LogView for TimelineLog {
        fn append_line(&self, line: &str) {
            self.timeline.lock().unwrap().push(format!("log:{line}"));
            self.inner.append_line(line);
        }

        fn scroll_to_bottom(&self) {
            self.inner.scroll_to_bottom();
        }
    }

    struct Harness {
        zone: DropZone,
        target: Arc<ClassList>,
        log: Arc<TimelineLog>,
        transport: Arc<ScriptedTransport>,
        observer: Arc<RecordingObserver>,
        timeline: Timeline,
    }

    impl Harness {
        fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
            let timeline: Timeline = Arc::default();
            let target = Arc::new(ClassList::new());
            let log = Arc::new(TimelineLog {
                inner: BufferedLog::new(),
                timeline: timeline.clone(),
            });
            let transport = Arc::new(ScriptedTransport::answering(responses, timeline.clone()));
            let observer = Arc::new(RecordingObserver {
                timeline: timeline.clone(),
                ..Default::default()
            });
            let zone = DropZone::new(target.clone(), log.clone(), transport.clone())
                .with_observer(observer.clone());
            Self {
                zone,
                target,
                log,
                transport,
                observer,
                timeline,
            }
        }

        fn lines(&self) -> Vec<String> {
            self.log.inner.lines()
        }
    }

    fn json_response(status: u16, body: serde_json::Value) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            body: serde_json::to_vec(&body).unwrap(),
        })
    }

    fn two_files() -> Vec<DroppedFile> {
        vec![
            DroppedFile::new("a.txt", vec![b'a'; 12]),
            DroppedFile::new("b.png", vec![0u8; 300]),
        ]
    }

    #[tokio::test]
    async fn drag_marker_follows_enter_leave_and_drop() {
        let h = Harness::new(vec![]);

        h.zone.handle_event(&SyntheticDragEvent::new(DragEventKind::Enter)).await;
        assert!(h.target.has_class(DRAG_OVER_CLASS));
        assert!(h.zone.is_dragging());

        h.zone.handle_event(&SyntheticDragEvent::new(DragEventKind::Over)).await;
        assert!(h.target.has_class(DRAG_OVER_CLASS));

        h.zone.handle_event(&SyntheticDragEvent::new(DragEventKind::Leave)).await;
        assert!(!h.target.has_class(DRAG_OVER_CLASS));
        assert!(!h.zone.is_dragging());

        h.zone.handle_event(&SyntheticDragEvent::new(DragEventKind::Enter)).await;
        h.zone.handle_event(&SyntheticDragEvent::drop_files(Vec::new())).await;
        assert!(!h.target.has_class(DRAG_OVER_CLASS));
        assert!(!h.zone.is_dragging());
    }

    #[tokio::test]
    async fn every_event_kind_suppresses_default_handling() {
        let h = Harness::new(vec![json_response(200, json!({ "ok": true }))]);

        let events = [
            SyntheticDragEvent::new(DragEventKind::Enter),
            SyntheticDragEvent::new(DragEventKind::Over),
            SyntheticDragEvent::new(DragEventKind::Leave),
            SyntheticDragEvent::drop_files(Vec::new()),
            SyntheticDragEvent::drop_files(vec![DroppedFile::new("x.txt", "x")]),
        ];
        for event in &events {
            h.zone.handle_event(event).await;
            assert!(event.default_prevented(), "{:?}", event.kind());
            assert!(event.propagation_stopped(), "{:?}", event.kind());
        }
    }

    #[tokio::test]
    async fn empty_drop_is_silent() {
        let h = Harness::new(vec![]);

        let outcome = h.zone.handle_event(&SyntheticDragEvent::drop_files(Vec::new())).await;

        assert!(matches!(outcome, DropOutcome::Ignored));
        assert!(h.lines().is_empty());
        assert!(h.transport.requests().is_empty());
        assert!(h.observer.starts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_file_drop_logs_then_posts_once() {
        let h = Harness::new(vec![json_response(200, json!({ "ok": true }))]);

        let outcome = h.zone.handle_event(&SyntheticDragEvent::drop_files(two_files())).await;

        assert_eq!(
            h.lines(),
            vec![
                "# Soltados 2 archivo(s)...",
                "# Archivo agregado: a.txt (12 bytes)",
                "# Archivo agregado: b.png (300 bytes)",
                "# Subida completada (HTTP 200)",
            ]
        );

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        let (path, field, files) = &requests[0];
        assert_eq!(path, "/upload");
        assert_eq!(field, "file");
        assert_eq!(files, &two_files());

        let expected = UploadReply {
            status: 200,
            body: json!({ "ok": true }),
        };
        assert_eq!(*h.observer.starts.lock().unwrap(), vec![2]);
        assert_eq!(*h.observer.dones.lock().unwrap(), vec![expected.clone()]);
        match outcome {
            DropOutcome::Uploaded(reply) => assert_eq!(reply, expected),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn log_lines_precede_start_which_precedes_post() {
        let h = Harness::new(vec![json_response(200, json!({ "ok": true }))]);

        h.zone.handle_event(&SyntheticDragEvent::drop_files(two_files())).await;

        let timeline = h.timeline.lock().unwrap().clone();
        assert_eq!(
            timeline,
            vec![
                "log:# Soltados 2 archivo(s)...",
                "log:# Archivo agregado: a.txt (12 bytes)",
                "log:# Archivo agregado: b.png (300 bytes)",
                "start:2",
                "post",
                "log:# Subida completada (HTTP 200)",
                "done",
            ]
        );
    }

    #[tokio::test]
    async fn every_line_scrolls_the_log() {
        let log = Arc::new(BufferedLog::new());
        let transport = Arc::new(ScriptedTransport::answering(
            vec![json_response(200, json!({}))],
            Timeline::default(),
        ));
        let zone = DropZone::new(Arc::new(ClassList::new()), log.clone(), transport);

        zone.handle_event(&SyntheticDragEvent::drop_files(two_files())).await;

        assert_eq!(log.lines().len(), 4);
        assert!(log.is_scrolled_to_bottom());
    }

    #[tokio::test]
    async fn network_failure_logs_one_error_and_zone_stays_usable() {
        let h = Harness::new(vec![
            Err(TransportError::Request("connection refused".to_string())),
            json_response(200, json!({ "ok": true })),
        ]);

        let outcome = h
            .zone
            .handle_event(&SyntheticDragEvent::drop_files(vec![DroppedFile::new("a.txt", "hola")]))
            .await;
        assert!(matches!(outcome, DropOutcome::Failed(UploadError::Transport(_))));

        let errors: Vec<_> = h.lines().into_iter().filter(|l| l.starts_with("# Error:")).collect();
        assert_eq!(errors, vec!["# Error: upload request failed: connection refused"]);
        assert!(h.observer.dones.lock().unwrap().is_empty());

        let outcome = h
            .zone
            .handle_event(&SyntheticDragEvent::drop_files(vec![DroppedFile::new("a.txt", "hola")]))
            .await;
        assert!(matches!(outcome, DropOutcome::Uploaded(_)));
        assert_eq!(h.transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn non_json_body_takes_the_error_path() {
        let h = Harness::new(vec![Ok(RawResponse {
            status: 502,
            body: b"<html>Bad Gateway</html>".to_vec(),
        })]);

        let outcome = h
            .zone
            .handle_event(&SyntheticDragEvent::drop_files(vec![DroppedFile::new("a.txt", "x")]))
            .await;

        assert!(matches!(outcome, DropOutcome::Failed(UploadError::Decode(_))));
        let lines = h.lines();
        assert_eq!(lines.iter().filter(|l| l.starts_with("# Error:")).count(), 1);
        assert!(lines.last().unwrap().starts_with("# Error: response body is not valid JSON"));
        assert!(h.observer.dones.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_status_with_json_body_counts_as_done() {
        let h = Harness::new(vec![json_response(
            400,
            json!({ "ok": false, "error": "no_files" }),
        )]);

        let outcome = h
            .zone
            .handle_event(&SyntheticDragEvent::drop_files(vec![DroppedFile::new("a.txt", "x")]))
            .await;

        match outcome {
            DropOutcome::Uploaded(reply) => {
                assert_eq!(reply.status, 400);
                assert!(!reply.is_success_status());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.observer.dones.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zones_do_not_share_drag_state() {
        let first = Harness::new(vec![]);
        let second = Harness::new(vec![]);

        first.zone.handle_event(&SyntheticDragEvent::new(DragEventKind::Enter)).await;

        assert!(first.target.has_class(DRAG_OVER_CLASS));
        assert!(!second.target.has_class(DRAG_OVER_CLASS));
        assert!(!second.zone.is_dragging());
    }

    #[tokio::test]
    async fn overlapping_drops_each_post() {
        let h = Harness::new(vec![
            json_response(200, json!({ "n": 1 })),
            json_response(200, json!({ "n": 2 })),
        ]);

        let first = SyntheticDragEvent::drop_files(vec![DroppedFile::new("a.txt", "a")]);
        let second = SyntheticDragEvent::drop_files(vec![DroppedFile::new("b.txt", "b")]);
        let (a, b) = tokio::join!(h.zone.handle_event(&first), h.zone.handle_event(&second));

        assert!(matches!(a, DropOutcome::Uploaded(_)));
        assert!(matches!(b, DropOutcome::Uploaded(_)));
        assert_eq!(h.transport.requests().len(), 2);
        assert_eq!(h.observer.dones.lock().unwrap().len(), 2);
    }
}
