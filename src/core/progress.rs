//! Progress reporting and cooperative cancellation.
//!
//! Stages push [`ProgressEvent`]s into a [`ProgressSink`]; any closure or an
//! `mpsc::Sender` works as a sink. A [`CancelToken`] is checked between
//! download chunks, between bands and between groups.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use serde::Serialize;
use tracing::debug;

use crate::types::Band;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Query,
    Search,
    Coverage,
    Download,
    Mosaic,
    Clip,
    Indices,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub scene_id: Option<String>,
    pub band: Option<Band>,
    /// 0..=100 when the total is known
    pub percent: Option<f32>,
    pub message: String,
}

impl ProgressEvent {
    pub fn new<S: Into<String>>(stage: Stage, message: S) -> Self {
        Self {
            stage,
            scene_id: None,
            band: None,
            percent: None,
            message: message.into(),
        }
    }

    pub fn scene<S: Into<String>>(mut self, scene_id: S) -> Self {
        self.scene_id = Some(scene_id.into());
        self
    }

    pub fn band(mut self, band: Band) -> Self {
        self.band = Some(band);
        self
    }

    pub fn percent(mut self, percent: f32) -> Self {
        self.percent = Some(percent.clamp(0.0, 100.0));
        self
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for Sender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.send(event);
    }
}

/// Sink that only traces events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        debug!(
            "[{:?}] {}{}{}",
            event.stage,
            event.message,
            event
                .scene_id
                .as_deref()
                .map(|s| format!(" scene={}", s))
                .unwrap_or_default(),
            event.band.map(|b| format!(" band={}", b)).unwrap_or_default()
        );
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc::channel;

    #[test]
    fn closure_sink_receives_events() {
        let seen = Mutex::new(Vec::new());
        let sink = |e: ProgressEvent| seen.lock().unwrap().push(e.stage);
        sink.emit(ProgressEvent::new(Stage::Mosaic, "building"));
        sink.emit(ProgressEvent::new(Stage::Clip, "clipping").band(Band::B4));
        assert_eq!(*seen.lock().unwrap(), vec![Stage::Mosaic, Stage::Clip]);
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (tx, rx) = channel();
        tx.emit(ProgressEvent::new(Stage::Download, "x").percent(150.0));
        assert_eq!(rx.recv().unwrap().percent, Some(100.0));
        drop(rx);
        tx.emit(ProgressEvent::new(Stage::Done, "done"));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
