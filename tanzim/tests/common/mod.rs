#![allow(dead_code)]

use std::sync::{Arc, Once};

use parking_lot::Mutex;

static TRACING: Once = Once::new();

/// Routes container logs through the test harness's captured output.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("tanzim=trace,tanzim_container=trace")
            .with_test_writer()
            .try_init();
    });
}

/// Shared record of events written by factories and teardown hooks.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}
