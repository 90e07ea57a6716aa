//! Inbound byte accumulation and read framing.
//!
//! Bytes read from the socket accumulate in an [`InboundBuffer`] until the
//! head read operation's [`Termination`] is satisfied. Whatever follows a
//! delimiter match stays buffered and is served to the next queued read
//! before the socket is touched again.

use crate::operation::Termination;

use bytes::{Bytes, BytesMut};

/// Returns the offset of the first occurrence of `needle` in `haystack`.
///
/// An empty needle never matches.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    let first = needle[0];
    let last_start = haystack.len() - needle.len();

    (0..=last_start).find(|&i| haystack[i] == first && &haystack[i..i + needle.len()] == needle)
}

/// Growable buffer of received, not yet delivered bytes.
#[derive(Debug, Default)]
pub(crate) struct InboundBuffer {
    buf: BytesMut,
}

impl InboundBuffer {
    /// Creates an empty buffer with the given initial capacity.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends freshly read bytes.
    pub(crate) fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    #[cfg(test)]
    pub(crate) fn data(&self) -> &[u8] {
        &self.buf[..]
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Detaches and returns everything buffered.
    pub(crate) fn take_all(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Tries to satisfy a read terminated by `termination`.
    ///
    /// Returns the payload to deliver, or `None` if more bytes are needed.
    /// With `at_eof` set no more bytes will arrive, so any non-empty buffer
    /// satisfies the read: a delimiter match still delivers only its
    /// prefix, anything else delivers the whole buffer.
    ///
    /// A delimiter is consumed but never part of the payload; the bytes
    /// after it stay buffered at the front.
    pub(crate) fn satisfy(&mut self, termination: &Termination, at_eof: bool) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }

        match termination {
            Termination::Available => Some(self.take_all()),
            Termination::WholeOnly if at_eof => Some(self.take_all()),
            Termination::WholeOnly => None,
            Termination::Delimiter(pattern) => match find(&self.buf, pattern) {
                Some(pos) => {
                    let payload = self.buf.split_to(pos).freeze();
                    let _ = self.buf.split_to(pattern.len());
                    Some(payload)
                }
                None if at_eof => Some(self.take_all()),
                None => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn delimiter(p: &'static str) -> Termination {
        Termination::Delimiter(Bytes::from_static(p.as_bytes()))
    }

    #[test]
    fn find_locates_first_occurrence() {
        assert_eq!(find(b"abc\r\nxyz\r\n", b"\r\n"), Some(3));
        assert_eq!(find(b"aaab", b"ab"), Some(2));
        assert_eq!(find(b"abc", b"abcd"), None);
        assert_eq!(find(b"abc", b""), None);
        assert_eq!(find(b"", b"a"), None);
    }

    #[test]
    fn delimiter_delivers_prefix_and_keeps_leftover() {
        let mut buffer = InboundBuffer::with_capacity(16);
        buffer.append(b"abc\r\n.\r\nxyz");

        let payload = buffer.satisfy(&delimiter("\r\n.\r\n"), false);
        assert_eq!(payload.as_deref(), Some(&b"abc"[..]));
        assert_eq!(buffer.data(), b"xyz");
    }

    #[test]
    fn delimiter_at_end_clears_buffer() {
        let mut buffer = InboundBuffer::default();
        buffer.append(b"OK\n");

        assert_eq!(buffer.satisfy(&delimiter("\n"), false).as_deref(), Some(&b"OK"[..]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn delimiter_waits_for_more_bytes() {
        let mut buffer = InboundBuffer::default();
        buffer.append(b"partial\r");

        assert!(buffer.satisfy(&delimiter("\r\n"), false).is_none());
        assert_eq!(buffer.len(), 8);

        buffer.append(b"\nrest");
        assert_eq!(
            buffer.satisfy(&delimiter("\r\n"), false).as_deref(),
            Some(&b"partial"[..])
        );
        assert_eq!(buffer.data(), b"rest");
    }

    #[test]
    fn eof_without_match_delivers_everything() {
        let mut buffer = InboundBuffer::default();
        buffer.append(b"no terminator");

        assert!(buffer.satisfy(&delimiter("\n"), false).is_none());
        assert_eq!(
            buffer.satisfy(&delimiter("\n"), true).as_deref(),
            Some(&b"no terminator"[..])
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn whole_only_waits_for_eof() {
        let mut buffer = InboundBuffer::default();
        buffer.append(b"part one, ");
        assert!(buffer.satisfy(&Termination::WholeOnly, false).is_none());

        buffer.append(b"part two");
        assert_eq!(
            buffer.satisfy(&Termination::WholeOnly, true).as_deref(),
            Some(&b"part one, part two"[..])
        );
    }

    #[test]
    fn available_delivers_immediately() {
        let mut buffer = InboundBuffer::default();
        assert!(buffer.satisfy(&Termination::Available, false).is_none());

        buffer.append(b"chunk");
        assert_eq!(
            buffer.satisfy(&Termination::Available, false).as_deref(),
            Some(&b"chunk"[..])
        );
    }

    proptest! {
        #[test]
        fn split_stream_yields_same_frames(
            frames in prop::collection::vec("[a-z]{0,12}", 1..8),
            cut in 1usize..7,
        ) {
            let stream: Vec<u8> = frames
                .iter()
                .flat_map(|f| f.bytes().chain(b"||".iter().copied()))
                .collect();

            let termination = delimiter("||");
            let mut buffer = InboundBuffer::default();
            let mut seen = Vec::new();

            for chunk in stream.chunks(cut) {
                buffer.append(chunk);
                while let Some(payload) = buffer.satisfy(&termination, false) {
                    seen.push(String::from_utf8(payload.to_vec()).unwrap());
                }
            }

            prop_assert_eq!(seen, frames);
            prop_assert!(buffer.is_empty());
        }
    }
}
