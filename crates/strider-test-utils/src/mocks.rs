//! Stream transports for driving a controller in tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use strider_core::traits::StreamTransport;
use strider_core::types::{StreamInput, Telemetry};

// ---------------------------------------------------------------------------
// ConstantTransport
// ---------------------------------------------------------------------------

/// Delivers the same desired values every tick and drops telemetry.
#[derive(Debug, Clone)]
pub struct ConstantTransport {
    input: StreamInput,
}

impl ConstantTransport {
    pub const fn new(input: StreamInput) -> Self {
        Self { input }
    }
}

impl StreamTransport for ConstantTransport {
    fn read_inputs(&mut self) -> Option<StreamInput> {
        Some(self.input.clone())
    }

    fn publish(&mut self, _telemetry: &Telemetry) {}
}

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// Plays back a queue of inputs (then nothing) and records every published
/// telemetry record.
///
/// Clones share the same log, so a clone kept by the test sees what the
/// control thread published.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inputs: Arc<Mutex<VecDeque<StreamInput>>>,
    published: Arc<Mutex<Vec<Telemetry>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an input for a later tick.
    pub fn push_input(&self, input: StreamInput) {
        self.inputs.lock().push_back(input);
    }

    pub fn published(&self) -> Vec<Telemetry> {
        self.published.lock().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn last(&self) -> Option<Telemetry> {
        self.published.lock().last().cloned()
    }
}

impl StreamTransport for RecordingTransport {
    fn read_inputs(&mut self) -> Option<StreamInput> {
        self.inputs.lock().pop_front()
    }

    fn publish(&mut self, telemetry: &Telemetry) {
        self.published.lock().push(telemetry.clone());
    }
}
