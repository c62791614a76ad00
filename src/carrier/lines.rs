//! Text lines as a carrier, one chunk per line.
//!
//! Lines are split on `\n` and trailing whitespace is trimmed before the
//! line's bytes are read as a chunk, so a chunk that is not whole bytes,
//! contains a newline or ends in ASCII whitespace cannot be read back. The
//! sender refuses such transmissions before writing anything. Encode
//! arbitrary data (e.g. base64) before sending it this way.

use super::{prepare_chunks, Accumulator, Flow, ReceiveAdapter, SendAdapter};
use crate::bits::BitSeq;
use crate::error::{Error, Result};
use crate::protocol::{MicroProtocolReceive, MicroProtocolSend, TransmissionState};
use std::io::{BufRead, Write};
use tracing::{debug, info};

/// Writes each chunk's bytes followed by a newline.
pub struct LineSendAdapter<W: Write> {
    writer: W,
    protocol: Option<Box<dyn MicroProtocolSend>>,
}

impl<W: Write> LineSendAdapter<W> {
    pub fn new(writer: W, protocol: Option<Box<dyn MicroProtocolSend>>) -> Self {
        Self { writer, protocol }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Bytes of a chunk that survives the trip through one line.
fn line_bytes(index: usize, chunk: &BitSeq) -> Result<Vec<u8>> {
    let line_error = |reason| Error::LineChunk { index, reason };
    if chunk.len() % 8 != 0 {
        return Err(line_error("not a whole number of bytes"));
    }
    let bytes = chunk.to_bytes()?;
    if bytes.contains(&b'\n') {
        return Err(line_error("contains a newline"));
    }
    if bytes.last().is_some_and(u8::is_ascii_whitespace) {
        return Err(line_error("ends in whitespace"));
    }
    Ok(bytes)
}

impl<W: Write> SendAdapter for LineSendAdapter<W> {
    /// # Errors
    /// `Error::LineChunk` if any chunk would not read back intact. Nothing
    /// is written in that case.
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let chunks = prepare_chunks(self.protocol.as_deref(), data);
        info!(bytes = data.len(), chunks = chunks.len(), "sending lines");
        let lines = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| line_bytes(index, chunk))
            .collect::<Result<Vec<_>>>()?;

        for (chunk, line) in chunks.iter().zip(&lines) {
            debug!(chunk = %chunk, "writing line");
            self.writer.write_all(line)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads lines until the transmission finishes or input ends.
pub struct LineReceiveAdapter<R: BufRead> {
    reader: R,
    accumulator: Accumulator,
}

impl<R: BufRead> LineReceiveAdapter<R> {
    pub fn new(reader: R, protocol: Option<Box<dyn MicroProtocolReceive>>) -> Self {
        Self {
            reader,
            accumulator: Accumulator::new(protocol),
        }
    }

    pub fn state(&self) -> Option<TransmissionState> {
        self.accumulator.state()
    }
}

impl<R: BufRead> ReceiveAdapter for LineReceiveAdapter<R> {
    fn receive(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut lines = 0usize;
        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            lines += 1;

            let trimmed = line.trim_ascii_end();
            if self.accumulator.accumulate(&BitSeq::from_bytes(trimmed))? == Flow::Stop {
                break;
            }
        }

        let received = self.accumulator.take();
        info!(lines, bits = received.len(), "receive finished");
        Ok(received.into_padded_bytes())
    }
}
