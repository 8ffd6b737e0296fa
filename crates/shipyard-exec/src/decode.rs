/// Incremental UTF-8 decoder for raw pipe reads.
///
/// A read may end in the middle of a multi-byte character; the incomplete
/// bytes are held back until the next read completes them. Invalid
/// sequences are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Stream {
    pending: Vec<u8>,
}

impl Utf8Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, returning every complete character available so far.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&self.pending[..valid]) {
                        out.push_str(prefix);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            // Incomplete character at the end; wait for more bytes.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back once the stream has ended.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut stream = Utf8Stream::new();
        assert_eq!(stream.push(b"hello"), "hello");
        assert_eq!(stream.finish(), "");
    }

    #[test]
    fn split_character_is_reassembled() {
        let bytes = "привет".as_bytes();
        let mut stream = Utf8Stream::new();
        let first = stream.push(&bytes[..3]);
        let second = stream.push(&bytes[3..]);
        assert_eq!(format!("{first}{second}"), "привет");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut stream = Utf8Stream::new();
        assert_eq!(stream.push(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn dangling_prefix_is_flushed_lossily() {
        let mut stream = Utf8Stream::new();
        assert_eq!(stream.push(&[b'x', 0xd0]), "x");
        assert_eq!(stream.finish(), "\u{FFFD}");
    }
}
