use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Trace,
    Fault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Receives per-instruction trace records and execution faults.
pub trait DiagnosticSink {
    fn record(&mut self, diag: Diagnostic);

    fn trace(&mut self, message: String) {
        self.record(Diagnostic {
            severity: Severity::Trace,
            message,
        });
    }

    fn fault(&mut self, message: String) {
        self.record(Diagnostic {
            severity: Severity::Fault,
            message,
        });
    }
}

/// In-memory buffer of everything recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Fault)
    }

    pub fn traces(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Trace)
    }

    pub fn has_fault(&self) -> bool {
        self.faults().next().is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl DiagnosticSink for Diagnostics {
    fn record(&mut self, diag: Diagnostic) {
        self.entries.push(diag);
    }
}

/// Forwards records to `tracing` instead of keeping them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Trace => tracing::trace!(target: "pc8086::exec", "{}", diag.message),
            Severity::Fault => tracing::warn!(target: "pc8086::exec", "{}", diag.message),
        }
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn record(&mut self, diag: Diagnostic) {
        (**self).record(diag)
    }
}
