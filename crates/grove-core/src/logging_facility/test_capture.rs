//! In-memory capture of log events for tests
//!
//! Engine operations emit start/end/end_error events; tests install the
//! capture layer once per process and query what was recorded.

use grove_core_types::schema::{EVENT_END_ERROR, FIELD_ERR_CODE, FIELD_EVENT, FIELD_OP};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// One recorded event, every field rendered as a string
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub op: Option<String>,
    pub event: Option<String>,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn is(&self, op: &str, event: &str) -> bool {
        self.op.as_deref() == Some(op) && self.event.as_deref() == Some(event)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

struct FieldRecorder<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldRecorder<'_> {
    // Strings are stored unquoted; numbers and bools render the same
    // through Debug as through Display.
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

type Buffer = Arc<Mutex<Vec<CapturedEvent>>>;

struct CaptureLayer {
    buffer: Buffer,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut FieldRecorder(&mut fields));

        self.buffer.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            op: fields.get(FIELD_OP).cloned(),
            event: fields.get(FIELD_EVENT).cloned(),
            fields,
        });
    }
}

/// Handle onto the process-wide capture buffer
#[derive(Clone)]
pub struct TestCapture {
    buffer: Buffer,
}

impl TestCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.buffer.lock().clone()
    }

    /// Events recorded for `op`, in emission order
    pub fn events_for(&self, op: &str) -> Vec<CapturedEvent> {
        self.buffer
            .lock()
            .iter()
            .filter(|e| e.op.as_deref() == Some(op))
            .cloned()
            .collect()
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CapturedEvent) -> bool,
    {
        self.buffer.lock().iter().filter(|e| predicate(e)).count()
    }

    /// # Panics
    /// If no `(op, event)` pair was recorded.
    pub fn assert_event_exists(&self, op: &str, event: &str) {
        let seen = self.events_for(op);
        assert!(
            seen.iter().any(|e| e.is(op, event)),
            "no {} event for op '{}' ({} events recorded for it)",
            event,
            op,
            seen.len()
        );
    }

    /// # Panics
    /// If `op` never failed with `err_code`.
    pub fn assert_error_code(&self, op: &str, err_code: &str) {
        let found = self.count_events(|e| {
            e.is(op, EVENT_END_ERROR) && e.field(FIELD_ERR_CODE) == Some(err_code)
        });
        assert!(found > 0, "op '{}' never failed with {}", op, err_code);
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

static CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer as the global subscriber (first call only) and
/// return a handle to the shared buffer.
///
/// Every test in the process shares the buffer; filter on an op name or a
/// field value unique to the test.
///
/// ```
/// use grove_core::logging_facility::test_capture::init_test_capture;
/// use grove_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("doc_example");
/// capture.assert_event_exists("doc_example", "start");
/// ```
pub fn init_test_capture() -> TestCapture {
    CAPTURE
        .get_or_init(|| {
            let buffer = Buffer::default();
            tracing_subscriber::registry()
                .with(CaptureLayer {
                    buffer: Arc::clone(&buffer),
                })
                .init();
            TestCapture { buffer }
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_event_matching() {
        let event = CapturedEvent {
            level: Level::ERROR,
            op: Some("context_save".to_string()),
            event: Some("end_error".to_string()),
            fields: HashMap::from([("err_code".to_string(), "ERR_VALIDATION".to_string())]),
        };

        assert!(event.is("context_save", "end_error"));
        assert!(!event.is("context_save", "end"));
        assert_eq!(event.field("err_code"), Some("ERR_VALIDATION"));
        assert_eq!(event.field("duration_ms"), None);
    }
}
