//! Time-windowed chunking of live migration output.
//!
//! [`LogStreamBuffer`] turns an unbounded output stream into a bounded
//! sequence of [`LogChunk`] messages:
//!
//! - Every write is appended to the pending chunk. If more than the window
//!   has passed since the last emission, the pending chunk is emitted and
//!   cleared. Emission is driven by writes, not by a timer: a quiet stream
//!   emits nothing until new output arrives.
//! - When the stream closes, a non-empty pending chunk is emitted once more,
//!   so no output is dropped.
//! - Independently, the last `max_tail` characters of all output are kept
//!   as the retained tail used in failure reports.

use std::mem;
use std::time::{Duration, Instant};

use shipyard_types::{tail, LogChunk, LOG_LAG_TIME, MAX_LOG_LENGTH};
use tracing::trace;

use crate::sink::OutputSink;

/// An [`OutputSink`] that emits windowed [`LogChunk`]s through `emit`.
pub struct LogStreamBuffer<F>
where
    F: FnMut(LogChunk),
{
    migration: String,
    window: Duration,
    max_tail: usize,
    chunk: String,
    last_flush: Instant,
    /// Holds at least the last `max_tail` characters; compacted lazily.
    retained: String,
    retained_chars: usize,
    emitted: usize,
    emit: F,
}

impl<F> LogStreamBuffer<F>
where
    F: FnMut(LogChunk),
{
    /// Create a buffer with the standard window and tail bound.
    pub fn new(migration: impl Into<String>, emit: F) -> Self {
        Self::with_limits(migration, LOG_LAG_TIME, MAX_LOG_LENGTH, emit)
    }

    /// Create a buffer with an explicit window and tail bound.
    pub fn with_limits(
        migration: impl Into<String>,
        window: Duration,
        max_tail: usize,
        emit: F,
    ) -> Self {
        Self {
            migration: migration.into(),
            window,
            max_tail,
            chunk: String::new(),
            last_flush: Instant::now(),
            retained: String::new(),
            retained_chars: 0,
            emitted: 0,
            emit,
        }
    }

    /// The last `max_tail` characters of everything written so far.
    pub fn tail(&self) -> &str {
        tail(&self.retained, self.max_tail)
    }

    /// Number of chunks emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Emit the pending chunk now, if any.
    pub fn flush(&mut self) {
        if self.chunk.is_empty() {
            return;
        }
        let text = mem::take(&mut self.chunk);
        trace!(migration = %self.migration, len = text.len(), "emitting log chunk");
        (self.emit)(LogChunk::new(self.migration.clone(), text));
        self.emitted += 1;
        self.last_flush = Instant::now();
    }

    fn retain(&mut self, text: &str) {
        self.retained.push_str(text);
        self.retained_chars += text.chars().count();
        if self.retained_chars > self.max_tail.saturating_mul(2) {
            let keep = tail(&self.retained, self.max_tail).to_string();
            self.retained = keep;
            self.retained_chars = self.max_tail;
        }
    }
}

impl<F> OutputSink for LogStreamBuffer<F>
where
    F: FnMut(LogChunk),
{
    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.chunk.push_str(text);
        self.retain(text);
        if self.last_flush.elapsed() > self.window {
            self.flush();
        }
    }

    fn finish(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect(
        window: Duration,
        max_tail: usize,
        writes: &[String],
    ) -> (Vec<LogChunk>, String) {
        let mut chunks = Vec::new();
        let tail_text;
        {
            let mut buffer =
                LogStreamBuffer::with_limits("m-1", window, max_tail, |c| chunks.push(c));
            for w in writes {
                buffer.write(w);
            }
            buffer.finish();
            tail_text = buffer.tail().to_string();
        }
        (chunks, tail_text)
    }

    #[test]
    fn burst_within_window_is_coalesced() {
        let writes: Vec<String> = (0..50).map(|i| format!("line {i}\n")).collect();
        let (chunks, _) = collect(Duration::from_secs(3600), MAX_LOG_LENGTH, &writes);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, writes.concat());
        assert_eq!(chunks[0].migration, "m-1");
    }

    #[test]
    fn elapsed_window_flushes_on_next_write() {
        let mut chunks = Vec::new();
        {
            let mut buffer = LogStreamBuffer::with_limits(
                "m-2",
                Duration::from_millis(20),
                MAX_LOG_LENGTH,
                |c| chunks.push(c),
            );
            buffer.write("first");
            std::thread::sleep(Duration::from_millis(40));
            buffer.write(" second");
            assert_eq!(buffer.emitted(), 1);
            buffer.write(" third");
            buffer.finish();
        }
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "first second");
        assert_eq!(chunks[1].text, " third");
    }

    #[test]
    fn quiet_stream_emits_nothing() {
        let mut count = 0;
        {
            let mut buffer = LogStreamBuffer::with_limits(
                "m-3",
                Duration::ZERO,
                MAX_LOG_LENGTH,
                |_| count += 1,
            );
            std::thread::sleep(Duration::from_millis(5));
            buffer.finish();
        }
        assert_eq!(count, 0);
    }

    #[test]
    fn tail_is_bounded_to_the_suffix() {
        let writes = vec!["abcdef".to_string(), "ghij".to_string()];
        let (_, tail_text) = collect(Duration::from_secs(3600), 4, &writes);
        assert_eq!(tail_text, "ghij");
    }

    proptest! {
        #[test]
        fn chunks_reassemble_the_stream(
            writes in prop::collection::vec(".{0,12}", 0..40),
            window_ms in prop::sample::select(vec![0u64, 1, 3600_000]),
        ) {
            let (chunks, _) = collect(Duration::from_millis(window_ms), MAX_LOG_LENGTH, &writes);
            let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
            prop_assert_eq!(joined, writes.concat());
            prop_assert!(chunks.iter().all(|c| !c.text.is_empty()));
        }

        #[test]
        fn retained_tail_is_a_bounded_suffix(
            writes in prop::collection::vec(".{0,20}", 0..60),
            max_tail in 1usize..64,
        ) {
            let (_, tail_text) = collect(Duration::ZERO, max_tail, &writes);
            let all = writes.concat();
            prop_assert!(tail_text.chars().count() <= max_tail);
            prop_assert!(all.ends_with(&tail_text));
            prop_assert_eq!(tail_text.chars().count(), all.chars().count().min(max_tail));
        }
    }
}
