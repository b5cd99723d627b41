//! Newline framing for the record stream
//!
//! Bytes arrive in arbitrary chunks (socket reads, serial reads with a short
//! timeout). [`LineDecoder`] accumulates them and hands out complete records,
//! keeping any unterminated tail for the next read.
//!
//! Consumed records only advance a read offset; the buffer is compacted once per
//! `feed` instead of shifting the remaining bytes after every record.

/// Record delimiter
pub const DELIMITER: u8 = b'\n';

/// Incremental line decoder
///
/// Never fails and never drops bytes. An unterminated record grows the
/// buffer without bound; the caller decides when that is a protocol failure
/// (see [`LineDecoder::pending_len`]).
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    /// Start of the first unconsumed byte
    read_pos: usize,
    /// Bytes before this offset are known to contain no delimiter
    scan_pos: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and iterate the records it completes
    ///
    /// The iterator is lazy: records not pulled before it is dropped stay
    /// buffered and are yielded by the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Records<'_> {
        self.compact();
        self.buf.extend_from_slice(bytes);
        Records { decoder: self }
    }

    /// Iterate records already buffered without adding bytes
    pub fn drain(&mut self) -> Records<'_> {
        self.feed(&[])
    }

    /// Bytes received but not yet terminated by a delimiter
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.buf.len() - self.read_pos
    }

    /// Discard everything buffered
    pub fn reset(&mut self) {
        self.buf.clear();
        self.read_pos = 0;
        self.scan_pos = 0;
    }

    fn compact(&mut self) {
        if self.read_pos > 0 {
            self.buf.drain(..self.read_pos);
            self.scan_pos -= self.read_pos;
            self.read_pos = 0;
        }
    }

    fn next_record(&mut self) -> Option<String> {
        let offset = self.buf[self.scan_pos..]
            .iter()
            .position(|&b| b == DELIMITER);

        match offset {
            Some(offset) => {
                let end = self.scan_pos + offset;
                let record = String::from_utf8_lossy(&self.buf[self.read_pos..end])
                    .trim()
                    .to_string();
                self.read_pos = end + 1;
                self.scan_pos = self.read_pos;
                Some(record)
            }
            None => {
                self.scan_pos = self.buf.len();
                None
            }
        }
    }
}

/// Records completed by the bytes fed so far
pub struct Records<'a> {
    decoder: &'a mut LineDecoder,
}

impl Iterator for Records<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.decoder.next_record()
    }
}
