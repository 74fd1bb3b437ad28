//! Diagnostics collaborator: a one-way sink the pass reports through.
//!
//! Nothing here aborts the pass; a failed field simply does not receive
//! replication behavior and processing of siblings continues.

use tracing::{error, warn};

/// One-way diagnostics sink.
pub trait DiagnosticSink {
    fn error(&mut self, message: String);
    fn warning(&mut self, message: String);
}

/// Sink that forwards to the `tracing` facade. Used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn error(&mut self, message: String) {
        error!(target: "syncweave", "{message}");
    }

    fn warning(&mut self, message: String) {
        warn!(target: "syncweave", "{message}");
    }
}

/// Sink that collects messages for later inspection. Used by tests and by the
/// CLI's `--deny-diagnostics` mode.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }
}
