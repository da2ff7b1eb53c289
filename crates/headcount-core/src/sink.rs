//! Storage collaborator seam.
//!
//! A [`TelemetrySink`] receives one batch per flush. The write is
//! all-or-nothing from the recorder's point of view: `Ok` means every event in
//! the slice was accepted, `Err` means none are assumed stored.

use std::io::Write;

use crate::error::SinkError;
use crate::event::TelemetryEvent;
use crate::line_protocol::LineFormat;

/// Trait that every storage backend implements.
pub trait TelemetrySink {
    /// Short name for logs and banners.
    fn name(&self) -> &'static str;

    /// Write one batch. Called only with a non-empty slice.
    fn write_batch(&mut self, batch: &[TelemetryEvent]) -> Result<(), SinkError>;

    /// Release the connection or file handles. Further writes fail.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn write_batch(&mut self, batch: &[TelemetryEvent]) -> Result<(), SinkError> {
        (**self).write_batch(batch)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

// ---------------------------------------------------------------------------
// In-memory sink
// ---------------------------------------------------------------------------

/// Keeps every written batch. Useful for tests and for embedding the
/// recorder in a host that persists data itself.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Vec<Vec<TelemetryEvent>>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> &[Vec<TelemetryEvent>] {
        &self.batches
    }

    /// All written events, flattened in write order.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.batches.iter().flatten().copied().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl TelemetrySink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_batch(&mut self, batch: &[TelemetryEvent]) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.batches.push(batch.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Line protocol to any writer
// ---------------------------------------------------------------------------

/// Writes line protocol to an `io::Write` (stdout for dry runs).
pub struct WriterSink<W: Write> {
    out: W,
    format: LineFormat,
}

impl<W: Write> WriterSink<W> {
    pub fn new(out: W, format: LineFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TelemetrySink for WriterSink<W> {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn write_batch(&mut self, batch: &[TelemetryEvent]) -> Result<(), SinkError> {
        self.out.write_all(self.format.encode(batch).as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Timestamp;
    use std::collections::BTreeMap;

    fn ev(count: u32, ns: u64) -> TelemetryEvent {
        TelemetryEvent {
            count,
            timestamp: Timestamp::from_nanos(ns),
        }
    }

    #[test]
    fn memory_sink_keeps_batches_in_order() {
        let mut sink = MemorySink::new();
        sink.write_batch(&[ev(1, 1), ev(2, 2)]).unwrap();
        sink.write_batch(&[ev(0, 3)]).unwrap();
        assert_eq!(sink.batches().len(), 2);
        assert_eq!(
            sink.events().iter().map(|e| e.count).collect::<Vec<_>>(),
            [1, 2, 0]
        );
    }

    #[test]
    fn memory_sink_rejects_after_close() {
        let mut sink = MemorySink::new();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(matches!(
            sink.write_batch(&[ev(1, 1)]),
            Err(SinkError::Closed)
        ));
    }

    #[test]
    fn writer_sink_emits_line_protocol() {
        let format = LineFormat::new("occupancy_count", &BTreeMap::new());
        let mut sink = WriterSink::new(Vec::new(), format);
        sink.write_batch(&[ev(4, 100)]).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "occupancy_count count=4i 100\n");
    }

    #[test]
    fn boxed_sink_delegates() {
        let mut sink: Box<dyn TelemetrySink> = Box::new(MemorySink::new());
        assert_eq!(sink.name(), "memory");
        sink.write_batch(&[ev(1, 1)]).unwrap();
        sink.close().unwrap();
        assert!(sink.write_batch(&[ev(1, 2)]).is_err());
    }
}
