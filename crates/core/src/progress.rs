//! ProgressReporter — structured progress events consumed by callers
//! (spec.md §2, §4.7 "Progress").

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum Phase {
    Discovering,
    Diffing,
    Deleting,
    Chunking,
    Embedding,
    IndexingFiles,
    Verifying,
    Persisting,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, current: usize, total: usize) -> Self {
        Self { phase, current, total, detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.current as f64 / self.total as f64) * 100.0
        }
    }
}

/// A sink for progress events. Sending is best-effort: if the caller dropped
/// the receiving end, the run proceeds without reporting — progress is an
/// observability aid, not part of the correctness contract.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    /// A reporter that discards every event, for callers that don't care.
    pub fn noop() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_100_for_zero_total() {
        let e = ProgressEvent::new(Phase::Done, 0, 0);
        assert_eq!(e.percentage(), 100.0);
    }

    #[test]
    fn percentage_scales_linearly() {
        let e = ProgressEvent::new(Phase::Embedding, 5, 20);
        assert_eq!(e.percentage(), 25.0);
    }

    #[tokio::test]
    async fn noop_reporter_never_panics_on_emit() {
        let reporter = ProgressReporter::noop();
        reporter.emit(ProgressEvent::new(Phase::Discovering, 0, 0));
    }

    #[tokio::test]
    async fn emits_are_received_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        reporter.emit(ProgressEvent::new(Phase::Discovering, 0, 1));
        reporter.emit(ProgressEvent::new(Phase::Diffing, 1, 1));
        drop(reporter);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.phase, Phase::Discovering);
        assert_eq!(second.phase, Phase::Diffing);
        assert!(rx.recv().await.is_none());
    }
}
