//! Downstream sinks for combined records.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::{CombineError, Result};
use crate::event::Record;

/// One combined record handed downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emission {
    pub tag: String,
    /// Wall-clock epoch seconds at emission.
    pub time: i64,
    pub record: Record,
}

/// Receives combined records. A failure aborts the current batch.
pub trait Emitter: Send + Sync {
    fn emit(&self, emission: Emission) -> Result<()>;
}

/// Keeps every emission in memory.
#[derive(Debug, Default)]
pub struct CollectingEmitter {
    emitted: Mutex<Vec<Emission>>,
}

impl CollectingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Emission>> {
        self.emitted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove and return everything emitted so far.
    pub fn take(&self) -> Vec<Emission> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Emitter for CollectingEmitter {
    fn emit(&self, emission: Emission) -> Result<()> {
        self.lock().push(emission);
        Ok(())
    }
}

/// Writes each emission as one JSON document per line.
#[derive(Debug)]
pub struct JsonLinesEmitter<W> {
    out: Mutex<W>,
    pretty: bool,
}

impl<W: Write + Send> JsonLinesEmitter<W> {
    pub fn new(out: W, pretty: bool) -> Self {
        JsonLinesEmitter {
            out: Mutex::new(out),
            pretty,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Emitter for JsonLinesEmitter<W> {
    fn emit(&self, emission: Emission) -> Result<()> {
        let line = if self.pretty {
            serde_json::to_string_pretty(&emission)?
        } else {
            serde_json::to_string(&emission)?
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| CombineError::Emit(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn emission() -> Emission {
        Emission {
            tag: "query_combiner".into(),
            time: 1700000000,
            record: json!({"id": "a", "n": 1}).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_collecting_emitter() {
        let sink = CollectingEmitter::new();
        assert!(sink.is_empty());
        sink.emit(emission()).unwrap();
        sink.emit(emission()).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_json_lines_output() {
        let sink = JsonLinesEmitter::new(Vec::new(), false);
        sink.emit(emission()).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "{\"tag\":\"query_combiner\",\"time\":1700000000,\"record\":{\"id\":\"a\",\"n\":1}}\n"
        );
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_emit_error() {
        let sink = JsonLinesEmitter::new(BrokenPipe, false);
        let err = sink.emit(emission()).unwrap_err();
        assert!(matches!(err, CombineError::Emit(_)), "got: {err}");
    }
}
