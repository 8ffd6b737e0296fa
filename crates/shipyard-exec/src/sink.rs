//! The [`OutputSink`] trait: where live process output goes.
//!
//! A runner writes decoded combined stdout/stderr into the sink the caller
//! passes in, synchronously and in arrival order, then calls
//! [`OutputSink::finish`] once the streams close.

/// Receiver of live process output.
pub trait OutputSink {
    /// Receive the next piece of output.
    fn write(&mut self, text: &str);

    /// Called once when the output streams are closed.
    fn finish(&mut self) {}
}

/// Discards all output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&mut self, _text: &str) {}
}

impl OutputSink for String {
    fn write(&mut self, text: &str) {
        self.push_str(text);
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn write(&mut self, text: &str) {
        (**self).write(text);
    }

    fn finish(&mut self) {
        (**self).finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_sink_accumulates() {
        let mut out = String::new();
        {
            let sink: &mut dyn OutputSink = &mut out;
            sink.write("a");
            sink.write("b");
            sink.finish();
        }
        assert_eq!(out, "ab");
    }
}
