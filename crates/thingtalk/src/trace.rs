//! Tracing hooks for the schema retriever.
//!
//! The retriever calls into a [`SchemaTracer`] at its interesting events:
//! cache hits and misses, batched upstream calls, and invalidation. The
//! default [`NoopTracer`] discards everything; [`StderrTracer`] prints a
//! human-readable log; [`RecordingTracer`] keeps events for assertions in
//! tests.

/// An event emitted by the schema retriever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaEvent {
    CacheHit { kind: String },
    CacheMiss { kind: String },
    /// One upstream request covering every kind queued in the current tick.
    BatchFlush { kinds: Vec<String>, with_metadata: bool },
    Invalidate { kind: Option<String> },
}

/// Receiver for [`SchemaEvent`]s.
pub trait SchemaTracer {
    fn record(&mut self, event: SchemaEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl SchemaTracer for NoopTracer {
    fn record(&mut self, _event: SchemaEvent) {}
}

/// Prints every event to stderr, one line each.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTracer;

impl SchemaTracer for StderrTracer {
    fn record(&mut self, event: SchemaEvent) {
        match event {
            SchemaEvent::CacheHit { kind } => eprintln!("schema: cache hit for {kind}"),
            SchemaEvent::CacheMiss { kind } => eprintln!("schema: cache miss for {kind}"),
            SchemaEvent::BatchFlush { kinds, with_metadata } => {
                eprintln!("schema: fetching [{}] (metadata: {with_metadata})", kinds.join(", "));
            }
            SchemaEvent::Invalidate { kind: Some(kind) } => eprintln!("schema: invalidated {kind}"),
            SchemaEvent::Invalidate { kind: None } => eprintln!("schema: invalidated all"),
        }
    }
}

/// Keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<SchemaEvent>,
}

impl SchemaTracer for RecordingTracer {
    fn record(&mut self, event: SchemaEvent) {
        self.events.push(event);
    }
}
