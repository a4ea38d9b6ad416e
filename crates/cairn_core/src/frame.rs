//! Versioned stream framing for uploaded and restored item bodies.
//!
//! Every item body placed in a snapshot is prefixed with a 4-byte big-endian
//! version word. [`FrameWriter`] injects the word on the way in;
//! [`FrameReader`] consumes and validates it on the way out. Future format
//! changes bump [`SERIALIZATION_VERSION`] and old readers reject the stream
//! instead of misparsing it.

use std::io::{self, Read};

/// Version word written ahead of every item body.
pub const SERIALIZATION_VERSION: u32 = 1;

/// Size of the version word in bytes.
pub const VERSION_SIZE: usize = 4;

/// Payload of the I/O error raised on a frame version mismatch.
///
/// Callers that need the typed mismatch downcast the error's inner payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameVersionError {
    /// The version the reader accepts.
    pub expected: u32,
    /// The version found on the stream.
    pub got: u32,
}

impl std::fmt::Display for FrameVersionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unexpected data format {}, expected {}",
            self.got, self.expected
        )
    }
}

impl std::error::Error for FrameVersionError {}

/// Extracts the typed mismatch from an I/O error, if that is what it holds.
#[must_use]
pub fn version_mismatch(err: &io::Error) -> Option<FrameVersionError> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<FrameVersionError>())
        .copied()
}

struct WriterState {
    header: io::Cursor<[u8; VERSION_SIZE]>,
    inner: Box<dyn Read + Send>,
}

/// Prefixes an item reader with the version word.
///
/// Closing drops the underlying reader exactly once; reads after close fail
/// with a closed-stream error.
pub struct FrameWriter {
    state: Option<WriterState>,
}

impl FrameWriter {
    /// Wraps an item reader, framing it with the given version.
    #[must_use]
    pub fn new(version: u32, inner: Box<dyn Read + Send>) -> Self {
        Self {
            state: Some(WriterState {
                header: io::Cursor::new(version.to_be_bytes()),
                inner,
            }),
        }
    }

    /// Releases the underlying reader. Idempotent.
    pub fn close(&mut self) {
        self.state = None;
    }
}

impl Read for FrameWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(state) = &mut self.state else {
            return Err(io::Error::other("read on closed frame stream"));
        };

        let n = state.header.read(buf)?;
        if n > 0 {
            return Ok(n);
        }

        state.inner.read(buf)
    }
}

enum ReaderState {
    Unverified,
    Verified,
    Poisoned(io::ErrorKind, String),
}

/// Strips and validates the version word from a restored stream.
///
/// The word is checked exactly once, on the first read. A reader that
/// observed a mismatch (or failed to read the word) is poisoned: every
/// subsequent read repeats the failure.
pub struct FrameReader {
    inner: Box<dyn Read + Send>,
    expected: u32,
    state: ReaderState,
}

impl FrameReader {
    /// Wraps a restored stream, expecting the given version.
    #[must_use]
    pub fn new(expected: u32, inner: Box<dyn Read + Send>) -> Self {
        Self {
            inner,
            expected,
            state: ReaderState::Unverified,
        }
    }

    fn check_version(&mut self) -> io::Result<()> {
        let mut word = [0u8; VERSION_SIZE];
        let mut filled = 0;

        while filled < VERSION_SIZE {
            match self.inner.read(&mut word[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended inside data format version",
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        let version = u32::from_be_bytes(word);

        if version != self.expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                FrameVersionError {
                    expected: self.expected,
                    got: version,
                },
            ));
        }

        Ok(())
    }
}

impl Read for FrameReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let ReaderState::Poisoned(kind, message) = &self.state {
            return Err(io::Error::new(*kind, message.clone()));
        }

        if matches!(self.state, ReaderState::Unverified) {
            if let Err(e) = self.check_version() {
                self.state = ReaderState::Poisoned(e.kind(), e.to_string());
                return Err(e);
            }

            self.state = ReaderState::Verified;
        }

        self.inner.read(buf)
    }
}

/// Frames a byte buffer with the version word.
#[must_use]
pub fn frame_bytes(version: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(VERSION_SIZE + data.len());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// Reads a framed stream to its end, validating the version word.
pub fn read_framed(expected: u32, inner: Box<dyn Read + Send>) -> io::Result<Vec<u8>> {
    let mut reader = FrameReader::new(expected, inner);
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn body(bytes: &[u8]) -> Box<dyn Read + Send> {
        Box::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn writer_then_reader_roundtrip() {
        let mut writer = FrameWriter::new(SERIALIZATION_VERSION, body(b"payload"));
        let mut framed = Vec::new();
        writer.read_to_end(&mut framed).unwrap();
        assert_eq!(framed.len(), VERSION_SIZE + 7);

        let restored = read_framed(SERIALIZATION_VERSION, body(&framed)).unwrap();
        assert_eq!(restored, b"payload");
    }

    #[test]
    fn roundtrip_with_one_byte_reads() {
        let framed = frame_bytes(SERIALIZATION_VERSION, b"abc");
        let mut reader = FrameReader::new(SERIALIZATION_VERSION, body(&framed));

        let mut out = Vec::new();
        let mut one = [0u8; 1];
        loop {
            match reader.read(&mut one).unwrap() {
                0 => break,
                n => out.extend_from_slice(&one[..n]),
            }
        }

        assert_eq!(out, b"abc");
    }

    #[test]
    fn empty_body_roundtrip() {
        let framed = frame_bytes(SERIALIZATION_VERSION, b"");
        assert_eq!(read_framed(SERIALIZATION_VERSION, body(&framed)).unwrap(), b"");
    }

    #[test]
    fn version_mismatch_poisons_reader() {
        let framed = frame_bytes(SERIALIZATION_VERSION + 1, b"payload");
        let mut reader = FrameReader::new(SERIALIZATION_VERSION, body(&framed));

        let mut buf = [0u8; 8];
        let first = reader.read(&mut buf).unwrap_err();
        assert_eq!(first.kind(), io::ErrorKind::InvalidData);

        let mismatch = version_mismatch(&first).unwrap();
        assert_eq!(mismatch.expected, SERIALIZATION_VERSION);
        assert_eq!(mismatch.got, SERIALIZATION_VERSION + 1);

        // Every subsequent read repeats the failure.
        for _ in 0..3 {
            let again = reader.read(&mut buf).unwrap_err();
            assert_eq!(again.kind(), io::ErrorKind::InvalidData);
        }
    }

    #[test]
    fn truncated_version_word_fails_and_poisons() {
        let mut reader = FrameReader::new(SERIALIZATION_VERSION, body(&[0, 0]));

        let mut buf = [0u8; 8];
        let first = reader.read(&mut buf).unwrap_err();
        assert_eq!(first.kind(), io::ErrorKind::UnexpectedEof);

        let again = reader.read(&mut buf).unwrap_err();
        assert_eq!(again.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn closed_writer_rejects_reads() {
        let mut writer = FrameWriter::new(SERIALIZATION_VERSION, body(b"payload"));
        writer.close();
        writer.close(); // second close is a no-op

        let mut buf = [0u8; 4];
        assert!(writer.read(&mut buf).is_err());
    }
}
