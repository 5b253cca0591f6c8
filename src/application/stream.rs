//! Helpers for building server-driven datastar SSE responses.

use std::convert::Infallible;

use async_stream::stream;
use axum::response::{
    IntoResponse, Response,
    sse::{Event, Sse},
};
use datastar::prelude::{ElementPatchMode, ExecuteScript, PatchElements, PatchSignals};
use tokio::sync::mpsc;

fn patch_event(html: String, selector: &str, mode: ElementPatchMode) -> Event {
    PatchElements::new(html)
        .selector(selector)
        .mode(mode)
        .write_as_axum_sse_event()
}

fn signals_event(payload: &str) -> Event {
    PatchSignals::new(payload).write_as_axum_sse_event()
}

fn script_event(script: String) -> Event {
    ExecuteScript::new(script).write_as_axum_sse_event()
}

/// Quote `text` as a JavaScript string literal.
pub fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

pub fn alert_script(message: &str) -> String {
    format!("alert({})", js_string(message))
}

/// Builder for composing datastar-compatible SSE responses whose events are all
/// known up front.
pub struct StreamBuilder {
    events: Vec<Event>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append an element patch targeting the supplied selector.
    pub fn push_patch(
        &mut self,
        html: String,
        selector: &str,
        mode: ElementPatchMode,
    ) -> &mut Self {
        self.events.push(patch_event(html, selector, mode));
        self
    }

    /// Merge the JSON object `payload` into the client's signals.
    pub fn push_signals(&mut self, payload: &str) -> &mut Self {
        self.events.push(signals_event(payload));
        self
    }

    /// Queue an inline script for execution on the client.
    pub fn push_script(&mut self, script: String) -> &mut Self {
        self.events.push(script_event(script));
        self
    }

    pub fn push_alert(&mut self, message: &str) -> &mut Self {
        self.push_script(alert_script(message))
    }

    /// Finalise the builder into an Axum response.
    pub fn into_response(self) -> Response {
        let stream = stream! {
            for event in self.events {
                yield Ok::<Event, Infallible>(event);
            }
        };
        Sse::new(stream).into_response()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending half of a stream that stays open while work is in progress.
///
/// Sends after the client disconnects are silently dropped.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    pub fn patch(&self, html: String, selector: &str, mode: ElementPatchMode) {
        let _ = self.tx.send(patch_event(html, selector, mode));
    }

    pub fn signals(&self, payload: &str) {
        let _ = self.tx.send(signals_event(payload));
    }

    pub fn script(&self, script: String) {
        let _ = self.tx.send(script_event(script));
    }

    pub fn alert(&self, message: &str) {
        self.script(alert_script(message));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Open a live SSE response. The stream ends once every [`EventSender`] is dropped.
pub fn live_stream() -> (EventSender, Response) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let stream = stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<Event, Infallible>(event);
        }
    };
    (EventSender { tx }, Sse::new(stream).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_strings_are_escaped() {
        assert_eq!(js_string("a\"b\n"), r#""a\"b\n""#);
        assert_eq!(alert_script("报告"), "alert(\"报告\")");
    }

    #[test]
    fn builder_counts_events() {
        let mut builder = StreamBuilder::new();
        assert!(builder.is_empty());
        builder
            .push_patch("<p>x</p>".into(), "#x", ElementPatchMode::Outer)
            .push_signals(r#"{"loading": false}"#)
            .push_alert("done");
        assert_eq!(builder.len(), 3);
    }

    #[tokio::test]
    async fn live_sender_reports_closed_when_response_dropped() {
        let (sender, response) = live_stream();
        assert!(!sender.is_closed());
        drop(response);
        assert!(sender.is_closed());
        sender.alert("ignored");
    }
}
