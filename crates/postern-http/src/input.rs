//! Buffered input streams over blocking sources.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use postern_core::ByteStream;

/// Default refill buffer size: 16 KiB.
pub const DEFAULT_BUF_SIZE: usize = 16 * 1024;

/// A [`ByteStream`] over any blocking [`Read`] source.
///
/// Reads into an owned buffer of configured size and exposes the populated
/// prefix through `peek`. Closing drops the source; a closed stream reads as
/// end-of-stream and closing again is a no-op.
#[derive(Debug)]
pub struct ReaderStream<R> {
    source: Option<R>,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    eof: bool,
}

impl<R: Read> ReaderStream<R> {
    /// Wrap a source with the default buffer size.
    #[must_use]
    pub fn new(source: R) -> Self {
        Self::with_capacity(DEFAULT_BUF_SIZE, source)
    }

    /// Wrap a source with a refill buffer of `cap` bytes.
    #[must_use]
    pub fn with_capacity(cap: usize, source: R) -> Self {
        Self {
            source: Some(source),
            buf: vec![0; cap.max(1)],
            start: 0,
            end: 0,
            eof: false,
        }
    }

    /// Give back the source, abandoning any buffered-but-unconsumed bytes.
    #[must_use]
    pub fn into_inner(self) -> Option<R> {
        self.source
    }

    fn fill(&mut self) -> io::Result<()> {
        let Some(source) = self.source.as_mut() else {
            self.eof = true;
            return Ok(());
        };
        self.start = 0;
        self.end = 0;
        loop {
            match source.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.end = n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read + std::fmt::Debug> ByteStream for ReaderStream<R> {
    fn peek(&mut self) -> io::Result<&[u8]> {
        if self.start == self.end && !self.eof {
            self.fill()?;
        }
        Ok(&self.buf[self.start..self.end])
    }

    fn consume(&mut self, n: usize) {
        assert!(n <= self.end - self.start, "consume past the peeked window");
        self.start += n;
    }

    fn close(&mut self) {
        self.source = None;
        self.start = 0;
        self.end = 0;
    }
}

/// Open `path` and run `f` with a buffered stream over it.
///
/// The file is closed on every exit path, whether `f` succeeds or fails.
pub fn read_file_with<T, E, F>(path: impl AsRef<Path>, buf_size: usize, f: F) -> Result<T, E>
where
    F: FnOnce(&mut ReaderStream<File>) -> Result<T, E>,
    E: From<io::Error>,
{
    let file = File::open(path)?;
    let mut stream = ReaderStream::with_capacity(buf_size, file);
    let result = f(&mut stream);
    stream.close();
    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use postern_core::{read_all, Buffer};
    use std::io::Write;

    /// A reader that yields its script one entry per read call.
    #[derive(Debug)]
    struct ScriptedReader {
        script: Vec<io::Result<Vec<u8>>>,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.script.is_empty() {
                return Ok(0);
            }
            match self.script.remove(0) {
                Ok(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Err(e) => Err(e),
            }
        }
    }

    #[test]
    fn delivers_source_bytes_in_order() {
        let reader = ScriptedReader {
            script: vec![Ok(b"hel".to_vec()), Ok(b"lo".to_vec())],
        };
        let mut stream = ReaderStream::with_capacity(8, reader);
        let mut out = Buffer::new();
        read_all(&mut stream, &mut out).unwrap();
        assert_eq!(out.as_slice(), b"hello");
    }

    #[test]
    fn peek_is_stable_until_consume() {
        let reader = ScriptedReader {
            script: vec![Ok(b"abcd".to_vec())],
        };
        let mut stream = ReaderStream::with_capacity(8, reader);
        assert_eq!(stream.peek().unwrap(), b"abcd");
        assert_eq!(stream.peek().unwrap(), b"abcd");
        stream.consume(2);
        assert_eq!(stream.peek().unwrap(), b"cd");
    }

    #[test]
    fn eof_is_sticky() {
        let reader = ScriptedReader { script: vec![] };
        let mut stream = ReaderStream::with_capacity(8, reader);
        assert!(stream.peek().unwrap().is_empty());
        assert!(stream.peek().unwrap().is_empty());
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let reader = ScriptedReader {
            script: vec![
                Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
                Ok(b"ok".to_vec()),
            ],
        };
        let mut stream = ReaderStream::with_capacity(8, reader);
        assert_eq!(stream.peek().unwrap(), b"ok");
    }

    #[test]
    fn close_is_idempotent_and_reads_as_eof() {
        let reader = ScriptedReader {
            script: vec![Ok(b"leftover".to_vec())],
        };
        let mut stream = ReaderStream::with_capacity(8, reader);
        stream.close();
        stream.close();
        assert!(stream.peek().unwrap().is_empty());
    }

    #[test]
    fn small_buffer_still_delivers_everything() {
        let reader = ScriptedReader {
            script: (0..3).map(|_| Ok(b"0123456789".to_vec())).collect(),
        };
        let mut stream = ReaderStream::with_capacity(4, reader);
        let mut out = Buffer::new();
        read_all(&mut stream, &mut out).unwrap();
        assert_eq!(out.len(), 12); // 4 bytes accepted per scripted read
    }

    #[test]
    fn file_scoped_stream_reads_and_closes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"file contents").unwrap();

        let contents: Result<Vec<u8>, io::Error> =
            read_file_with(tmp.path(), 8, |stream| {
                let mut out = Buffer::new();
                read_all(stream, &mut out)?;
                Ok(out.into_bytes())
            });
        assert_eq!(contents.unwrap(), b"file contents");
    }

    #[test]
    fn file_scoped_stream_propagates_open_errors() {
        let result: Result<(), io::Error> =
            read_file_with("/definitely/not/a/real/path", 8, |_stream| Ok(()));
        assert!(result.is_err());
    }

    #[test]
    fn file_scoped_stream_closes_on_client_failure() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"data").unwrap();

        let result: Result<(), io::Error> = read_file_with(tmp.path(), 8, |_stream| {
            Err(io::Error::new(io::ErrorKind::Other, "client bailed"))
        });
        assert!(result.is_err());
    }
}
