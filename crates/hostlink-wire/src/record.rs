//! Description and call records.
//!
//! Both records map onto flat BSON documents. Field names are single
//! letters where the host's parser expects them (`I`, `T`, `t`).

use bson::{Bson, Document, doc};
use hostlink_common::constants::{
    DEFAULT_CATEGORY, DESCRIPTION_TYPE, FIXED_ARG_LABELS, MAX_DOCUMENT_SIZE, PROCESS_API_NAME,
    PROCESS_ARG_LABELS, PROCESS_LOOKUP_INDEX,
};
use hostlink_common::error::{HostlinkError, Result};
use hostlink_common::types::{ApiEvent, ProcessInfo};

use crate::value::{encode_args, int_bson, uint_bson};

/// Returns the argument labels for an API taking `arg_count` arguments:
/// `["is_success", "retval", "arg0", ..., "arg{n-1}"]`.
#[must_use]
pub fn arg_labels(arg_count: usize) -> Vec<String> {
    FIXED_ARG_LABELS
        .iter()
        .map(|s| (*s).to_owned())
        .chain((0..arg_count).map(|i| format!("arg{i}")))
        .collect()
}

/// Serializes `doc` onto the end of `buf`.
///
/// On failure `buf` is left exactly as it was.
///
/// # Errors
///
/// Returns [`HostlinkError::Encoding`] if serialization fails or the
/// document exceeds [`MAX_DOCUMENT_SIZE`].
pub fn encode_document(doc: &Document, buf: &mut Vec<u8>) -> Result<()> {
    let start = buf.len();
    if let Err(e) = doc.to_writer(&mut *buf) {
        buf.truncate(start);
        return Err(HostlinkError::encoding(e.to_string()));
    }
    let size = buf.len() - start;
    if size > MAX_DOCUMENT_SIZE {
        buf.truncate(start);
        return Err(HostlinkError::encoding(format!(
            "document of {size} bytes exceeds the {MAX_DOCUMENT_SIZE} byte limit"
        )));
    }
    Ok(())
}

/// Announces an API's name and argument layout under a lookup index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDescription {
    /// Lookup index later referenced by call records.
    pub index: u32,
    /// API name.
    pub name: String,
    /// API category.
    pub category: String,
    /// Argument labels, starting with `is_success` and `retval`.
    pub args: Vec<String>,
}

impl ApiDescription {
    /// Describes an API with `arg_count` positional arguments.
    pub fn for_api(index: u32, name: impl Into<String>, arg_count: usize) -> Self {
        Self {
            index,
            name: name.into(),
            category: DEFAULT_CATEGORY.to_owned(),
            args: arg_labels(arg_count),
        }
    }

    /// The fixed `__process__` description sent in every handshake.
    #[must_use]
    pub fn process() -> Self {
        Self {
            index: PROCESS_LOOKUP_INDEX,
            name: PROCESS_API_NAME.to_owned(),
            category: DEFAULT_CATEGORY.to_owned(),
            args: PROCESS_ARG_LABELS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Builds the BSON document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let index = int_bson(i64::from(self.index));
        let labels: Vec<Bson> = self.args.iter().cloned().map(Bson::String).collect();
        doc! {
            "I": index,
            "name": self.name.as_str(),
            "type": DESCRIPTION_TYPE,
            "category": self.category.as_str(),
            "args": labels,
        }
    }

    /// Appends the encoded document to `buf`.
    ///
    /// # Errors
    ///
    /// See [`encode_document`].
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        encode_document(&self.to_document(), buf)
    }

    /// Parses a description document.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Protocol`] if a field is missing or mistyped.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let index = index_field(doc)?;
        let name = str_field(doc, "name")?;
        let category = str_field(doc, "category")?;
        let args = array_field(doc, "args")?
            .iter()
            .map(|b| {
                b.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| HostlinkError::protocol("description label is not a string"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            index,
            name,
            category,
            args,
        })
    }
}

/// One call occurrence referencing a described API.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    /// Lookup index of the API's description.
    pub index: u32,
    /// Calling thread.
    pub thread_id: u32,
    /// Milliseconds since process launch.
    pub elapsed_ms: u64,
    /// `[success, retval, args...]`.
    pub args: Vec<Bson>,
}

impl CallRecord {
    /// Builds the record for an event.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Encoding`] if an argument cannot be encoded.
    pub fn for_event(index: u32, event: &ApiEvent) -> Result<Self> {
        Ok(Self::with_args(index, event, encode_args(event)?))
    }

    /// Builds the record for an event whose arguments were already encoded.
    #[must_use]
    pub fn with_args(index: u32, event: &ApiEvent, args: Vec<Bson>) -> Self {
        Self {
            index,
            thread_id: event.tid.as_u32(),
            elapsed_ms: event.elapsed_ms,
            args,
        }
    }

    /// The call record that follows the `__process__` description.
    #[must_use]
    pub fn process(info: &ProcessInfo) -> Self {
        Self {
            index: PROCESS_LOOKUP_INDEX,
            thread_id: 0,
            elapsed_ms: 0,
            args: vec![
                int_bson(1),
                int_bson(0),
                int_bson(i64::from(info.time_low())),
                int_bson(i64::from(info.time_high())),
                int_bson(i64::from(info.pid.as_u32())),
                int_bson(i64::from(info.parent_pid)),
                Bson::String(info.module_path.clone()),
            ],
        }
    }

    /// Builds the BSON document.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Encoding`] if the elapsed time overflows int64.
    pub fn to_document(&self) -> Result<Document> {
        let index = int_bson(i64::from(self.index));
        let thread = int_bson(i64::from(self.thread_id));
        let elapsed = uint_bson(self.elapsed_ms)?;
        Ok(doc! {
            "I": index,
            "T": thread,
            "t": elapsed,
            "args": self.args.clone(),
        })
    }

    /// Appends the encoded document to `buf`.
    ///
    /// # Errors
    ///
    /// See [`encode_document`].
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        encode_document(&self.to_document()?, buf)
    }

    /// Parses a call document.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Protocol`] if a field is missing or mistyped.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let index = index_field(doc)?;
        let thread_id = u32::try_from(int_field(doc, "T")?)
            .map_err(|_| HostlinkError::protocol("thread id out of range"))?;
        let elapsed_ms = u64::try_from(int_field(doc, "t")?)
            .map_err(|_| HostlinkError::protocol("negative elapsed time"))?;
        let args = array_field(doc, "args")?.clone();
        Ok(Self {
            index,
            thread_id,
            elapsed_ms,
            args,
        })
    }
}

/// An event's description and call documents, encoded once and checked
/// against every encoding limit before its lookup index is known.
///
/// Checking uses the widest possible index, so [`Self::encode`] with any
/// real index cannot fail on size.
#[derive(Debug, Clone)]
pub struct PreparedEvent {
    description: Document,
    call: Document,
}

impl PreparedEvent {
    /// Builds and checks both documents for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Encoding`] if an argument or the elapsed time
    /// cannot be encoded, or a document exceeds [`MAX_DOCUMENT_SIZE`].
    pub fn prepare(event: &ApiEvent) -> Result<Self> {
        let description =
            ApiDescription::for_api(u32::MAX, event.api.as_str(), event.arg_count()).to_document();
        let call = CallRecord::for_event(u32::MAX, event)?.to_document()?;

        let mut scratch = Vec::new();
        encode_document(&description, &mut scratch)?;
        scratch.clear();
        encode_document(&call, &mut scratch)?;
        Ok(Self { description, call })
    }

    /// Encodes the call under `index`, preceded by the description when
    /// `describe` is set, as one buffer.
    ///
    /// # Errors
    ///
    /// See [`encode_document`].
    pub fn encode(&self, index: u32, describe: bool) -> Result<Vec<u8>> {
        let index = int_bson(i64::from(index));
        let mut buf = Vec::new();
        if describe {
            let mut description = self.description.clone();
            let _ = description.insert("I", index.clone());
            encode_document(&description, &mut buf)?;
        }
        let mut call = self.call.clone();
        let _ = call.insert("I", index);
        encode_document(&call, &mut buf)?;
        Ok(buf)
    }
}

fn int_field(doc: &Document, key: &str) -> Result<i64> {
    match doc.get(key) {
        Some(Bson::Int32(v)) => Ok(i64::from(*v)),
        Some(Bson::Int64(v)) => Ok(*v),
        Some(other) => Err(HostlinkError::protocol(format!(
            "field {key} has type {:?}, expected integer",
            other.element_type()
        ))),
        None => Err(HostlinkError::protocol(format!("missing field {key}"))),
    }
}

fn index_field(doc: &Document) -> Result<u32> {
    u32::try_from(int_field(doc, "I")?)
        .map_err(|_| HostlinkError::protocol("lookup index out of range"))
}

fn str_field(doc: &Document, key: &str) -> Result<String> {
    doc.get_str(key)
        .map(str::to_owned)
        .map_err(|e| HostlinkError::protocol(format!("field {key}: {e}")))
}

fn array_field<'a>(doc: &'a Document, key: &str) -> Result<&'a Vec<Bson>> {
    doc.get_array(key)
        .map_err(|e| HostlinkError::protocol(format!("field {key}: {e}")))
}
