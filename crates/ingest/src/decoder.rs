//! Incremental decoder for a concatenated stream of JSON values.
//!
//! Reads the input in chunks and parses one value per [`StreamDecoder::next`]
//! call from the buffered bytes. Values need no delimiter beyond valid JSON
//! syntax boundaries: `{"a":1}{"a":2}`, newline separated records and bare
//! scalars separated by whitespace all decode.

use std::io::{ErrorKind, Read};

use serde_json::Value;
use tracing::trace;

use bmo_core::Sequence;

use crate::error::DecodeError;

const READ_CHUNK: usize = 64 * 1024;

/// Raw bytes quoted in parse errors.
const CONTEXT_BYTES: usize = 64;

enum Step {
    Value { value: Value, consumed: usize, available: usize },
    Failed(serde_json::Error),
    Blank,
}

pub struct StreamDecoder<R> {
    reader: R,
    buf: Vec<u8>,
    /// Start of the unparsed region of `buf`.
    pos: usize,
    /// Absolute stream offset of `buf[0]`.
    base: u64,
    decoded: Sequence,
    /// Refills performed so far.
    fills: u64,
    eof: bool,
    done: bool,
}

impl<R: Read> StreamDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            pos: 0,
            base: 0,
            decoded: 0,
            fills: 0,
            eof: false,
            done: false,
        }
    }

    /// Number of values decoded so far.
    pub fn decoded(&self) -> Sequence {
        self.decoded
    }

    /// Decode the next value.
    ///
    /// Returns `Ok(None)` once the input is exhausted at a clean value
    /// boundary. After an error or end of stream, further calls return
    /// `Ok(None)` without reading.
    pub fn next(&mut self) -> Result<Option<Value>, DecodeError> {
        if self.done {
            return Ok(None);
        }

        loop {
            let step = {
                let pending = &self.buf[self.pos..];
                let mut stream = serde_json::Deserializer::from_slice(pending).into_iter::<Value>();
                match stream.next() {
                    Some(Ok(value)) => Step::Value {
                        value,
                        consumed: stream.byte_offset(),
                        available: pending.len(),
                    },
                    Some(Err(e)) => Step::Failed(e),
                    None => Step::Blank,
                }
            };

            match step {
                // A value that ends exactly at the end of the buffer may
                // continue in the next chunk (e.g. the digits of a number).
                Step::Value { consumed, available, .. } if consumed == available && !self.eof => {
                    self.fill()?;
                }
                Step::Value { value, consumed, .. } => {
                    self.pos += consumed;
                    self.decoded += 1;
                    return Ok(Some(value));
                }
                Step::Failed(e) if e.is_eof() && !self.eof => {
                    self.fill()?;
                }
                Step::Failed(e) => {
                    self.done = true;
                    return Err(self.parse_error(e));
                }
                Step::Blank if !self.eof => {
                    self.pos = self.buf.len();
                    self.fill()?;
                }
                Step::Blank => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Drop consumed bytes and append the next chunk of input.
    ///
    /// The window is at least as large as what is already buffered and is
    /// read until full or end of input, so a value spanning many reads is
    /// re-parsed a logarithmic number of times.
    fn fill(&mut self) -> Result<(), DecodeError> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.base += self.pos as u64;
            self.pos = 0;
        }

        let start = self.buf.len();
        let want = READ_CHUNK.max(start);
        self.buf.resize(start + want, 0);

        let mut filled = start;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.buf.truncate(filled);
                    self.done = true;
                    return Err(DecodeError::Io {
                        index: self.decoded,
                        source,
                    });
                }
            }
        }
        self.buf.truncate(filled);
        self.fills += 1;
        trace!(fills = self.fills, buffered = filled, eof = self.eof, "input refilled");
        Ok(())
    }

    fn parse_error(&self, source: serde_json::Error) -> DecodeError {
        let pending = &self.buf[self.pos..];
        let skipped = pending
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        let value_start = &pending[skipped..];
        let context =
            String::from_utf8_lossy(&value_start[..value_start.len().min(CONTEXT_BYTES)]).into_owned();
        let offset = self.base + (self.pos + skipped) as u64;

        if source.is_eof() {
            DecodeError::Truncated {
                index: self.decoded,
                offset,
                context,
                source,
            }
        } else {
            DecodeError::Malformed {
                index: self.decoded,
                offset,
                context,
                source,
            }
        }
    }
}
