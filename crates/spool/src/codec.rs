//! Frame encoding for queued events
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! u32 body_len | body | u32 header_count | (u16 key_len | key | u16 value_len | value)*
//! ```
//!
//! Header keys and values are UTF-8 and keep their insertion order.

use spool_core::{Event, Headers, Result, SpoolError};

/// Serialize an event into a frame
pub fn encode(event: &Event) -> Result<Vec<u8>> {
    let body_len = u32::try_from(event.body.len())
        .map_err(|_| SpoolError::Encode(format!("body too large: {} bytes", event.body.len())))?;
    let header_count = u32::try_from(event.headers.len())
        .map_err(|_| SpoolError::Encode("too many headers".into()))?;

    let headers_len: usize = event
        .headers
        .iter()
        .map(|(k, v)| 4 + k.len() + v.len())
        .sum();
    let mut buf = Vec::with_capacity(8 + event.body.len() + headers_len);

    buf.extend_from_slice(&body_len.to_be_bytes());
    buf.extend_from_slice(&event.body);
    buf.extend_from_slice(&header_count.to_be_bytes());
    for (key, value) in event.headers.iter() {
        put_str(&mut buf, key)?;
        put_str(&mut buf, value)?;
    }

    Ok(buf)
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| {
        SpoolError::Encode(format!("header field too long: {} bytes", s.len()))
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Parse a frame back into an event
///
/// Fails with [`SpoolError::CorruptFrame`] when a length field points past
/// the end of the buffer, a header is not UTF-8, or bytes are left over.
pub fn decode(frame: &[u8]) -> Result<Event> {
    let mut reader = FrameReader { buf: frame, pos: 0 };

    let body_len = reader.read_u32()? as usize;
    let body = reader.take(body_len)?.to_vec();

    let header_count = reader.read_u32()? as usize;
    // Each header needs at least 4 bytes; cap the allocation by what remains
    let mut headers = Headers::with_capacity(header_count.min(reader.remaining() / 4));
    for _ in 0..header_count {
        let key = reader.read_str()?;
        let value = reader.read_str()?;
        headers.insert(key, value);
    }

    if reader.remaining() != 0 {
        return Err(SpoolError::CorruptFrame(format!(
            "{} trailing bytes after headers",
            reader.remaining()
        )));
    }

    Ok(Event::from_parts(body, headers))
}

struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(SpoolError::CorruptFrame(format!(
                "length {} at offset {} exceeds frame of {} bytes",
                len,
                self.pos,
                self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SpoolError::CorruptFrame(format!("header is not UTF-8: {}", e)))
    }
}
