//! # hostlink-wire
//!
//! The document model spoken between a reporter and the analysis host.
//!
//! A connection carries the `BSON\n` marker followed by a stream of
//! self-delimiting BSON documents of two shapes:
//! - [`ApiDescription`](record::ApiDescription): announces an API's argument
//!   layout under a lookup index.
//! - [`CallRecord`](record::CallRecord): one call referencing a lookup index.
//!
//! [`FrameReader`](frame::FrameReader) decodes such a stream back into
//! [`Message`](frame::Message)s.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod frame;
pub mod record;
pub mod value;
