//! Stream framing: the `BSON\n` marker followed by length-prefixed documents.
//!
//! Every BSON document starts with its own little-endian `i32` total length,
//! so the stream needs no extra framing once the marker has been consumed.

use std::io::{ErrorKind, Read};

use bson::Document;
use hostlink_common::constants::{MAX_DOCUMENT_SIZE, WIRE_MAGIC};
use hostlink_common::error::{HostlinkError, Result};

use crate::record::{ApiDescription, CallRecord};

/// Smallest possible document: length prefix plus terminating NUL.
const MIN_DOCUMENT_SIZE: usize = 5;

/// A decoded document from a reporter stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// An API description.
    Description(ApiDescription),
    /// A call record.
    Call(CallRecord),
}

impl Message {
    /// Classifies a document by its fields: descriptions carry `name`,
    /// calls carry `T`.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Protocol`] if the document is neither shape.
    pub fn from_document(doc: &Document) -> Result<Self> {
        if doc.contains_key("name") {
            ApiDescription::from_document(doc).map(Self::Description)
        } else if doc.contains_key("T") {
            CallRecord::from_document(doc).map(Self::Call)
        } else {
            Err(HostlinkError::protocol(
                "document is neither a description nor a call",
            ))
        }
    }

    /// Lookup index carried by the message.
    #[must_use]
    pub const fn index(&self) -> u32 {
        match self {
            Self::Description(d) => d.index,
            Self::Call(c) => c.index,
        }
    }
}

/// Decodes a reporter stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    magic_seen: bool,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a byte source positioned at the start of a connection.
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            magic_seen: false,
        }
    }

    /// Consumes and checks the protocol marker.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Protocol`] if the stream does not begin with
    /// `BSON\n`.
    pub fn read_magic(&mut self) -> Result<()> {
        let mut magic = [0u8; WIRE_MAGIC.len()];
        self.reader
            .read_exact(&mut magic)
            .map_err(|e| HostlinkError::protocol(format!("reading marker: {e}")))?;
        if &magic[..] != WIRE_MAGIC {
            return Err(HostlinkError::protocol(format!(
                "bad marker: {:?}",
                String::from_utf8_lossy(&magic)
            )));
        }
        self.magic_seen = true;
        Ok(())
    }

    /// Reads the next raw document, or `None` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Protocol`] on a bad marker, a truncated or
    /// oversized document, or bytes that do not parse as BSON.
    pub fn next_document(&mut self) -> Result<Option<Document>> {
        if !self.magic_seen {
            self.read_magic()?;
        }

        let mut prefix = [0u8; 4];
        if !self.fill_or_eof(&mut prefix)? {
            return Ok(None);
        }
        let declared = i32::from_le_bytes(prefix);
        let size = usize::try_from(declared)
            .ok()
            .filter(|s| (MIN_DOCUMENT_SIZE..=MAX_DOCUMENT_SIZE).contains(s))
            .ok_or_else(|| HostlinkError::protocol(format!("bad document length {declared}")))?;

        let mut raw = vec![0u8; size];
        raw[..4].copy_from_slice(&prefix);
        self.reader
            .read_exact(&mut raw[4..])
            .map_err(|e| HostlinkError::protocol(format!("truncated document: {e}")))?;

        Document::from_reader(&mut raw.as_slice())
            .map(Some)
            .map_err(|e| HostlinkError::protocol(format!("malformed document: {e}")))
    }

    /// Reads and classifies the next document.
    ///
    /// # Errors
    ///
    /// See [`Self::next_document`] and [`Message::from_document`].
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        self.next_document()?
            .map(|doc| Message::from_document(&doc))
            .transpose()
    }

    /// Fills `buf` completely, or returns `false` if the stream ended before
    /// the first byte.
    fn fill_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(HostlinkError::protocol("truncated length prefix")),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(HostlinkError::protocol(format!("read failed: {e}"))),
            }
        }
        Ok(true)
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

#[cfg(test)]
mod tests {
    use bson::Bson;
    use hostlink_common::types::{ApiEvent, ProcessId, ProcessInfo};

    use super::*;

    fn handshake() -> Vec<u8> {
        let mut buf = WIRE_MAGIC.to_vec();
        ApiDescription::process().encode_into(&mut buf).unwrap();
        CallRecord::process(&ProcessInfo::placeholder(ProcessId::new(100)))
            .encode_into(&mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn reads_handshake_then_stops_cleanly() {
        let bytes = handshake();
        let messages: Vec<Message> = FrameReader::new(bytes.as_slice())
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], Message::Description(d) if d.name == "__process__"));
        match &messages[1] {
            Message::Call(c) => assert_eq!(c.args[4], Bson::Int32(100)),
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn classifies_api_records() {
        let mut bytes = handshake();
        let ev = ApiEvent::new(100, 7, "open", 3, vec![]);
        ApiDescription::for_api(1, "open", 0)
            .encode_into(&mut bytes)
            .unwrap();
        CallRecord::for_event(1, &ev)
            .unwrap()
            .encode_into(&mut bytes)
            .unwrap();

        let indices: Vec<u32> = FrameReader::new(bytes.as_slice())
            .map(|m| m.unwrap().index())
            .collect();
        assert_eq!(indices, vec![0, 0, 1, 1]);
    }

    #[test]
    fn rejects_wrong_marker() {
        let mut reader = FrameReader::new(&b"JSON\n"[..]);
        assert!(matches!(
            reader.next_document(),
            Err(HostlinkError::Protocol { .. })
        ));
    }

    #[test]
    fn truncated_document_is_an_error() {
        let mut bytes = handshake();
        bytes.truncate(bytes.len() - 3);
        let mut reader = FrameReader::new(bytes.as_slice());
        assert!(reader.next_document().unwrap().is_some());
        assert!(reader.next_document().is_err());
    }

    #[test]
    fn absurd_length_is_rejected() {
        let mut bytes = WIRE_MAGIC.to_vec();
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        let mut reader = FrameReader::new(bytes.as_slice());
        assert!(reader.next_document().is_err());
    }
}
