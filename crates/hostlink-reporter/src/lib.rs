//! # hostlink-reporter
//!
//! Streams intercepted API calls to a remote analysis host.
//!
//! Provides the following entry points:
//! - [`EventReporter`](reporter::EventReporter): reports [`ApiEvent`]s,
//!   registering each API's description before its first call.
//! - [`ConnectionRegistry`](registry::ConnectionRegistry): one connection per
//!   monitored process, handshaking on first use.
//! - [`EventSource`](source::EventSource): pull-based supply of events that the
//!   reporter can drain.
//!
//! # Example
//!
//! ```rust,no_run
//! use hostlink_common::types::ApiEvent;
//! use hostlink_reporter::reporter::EventReporter;
//!
//! let reporter = EventReporter::new("192.168.56.1", 2042);
//! let event = ApiEvent::new(100, 7, "open", 3, vec!["/tmp/x".into(), 0.into()]);
//! reporter.report_event(&event)?;
//! # Ok::<(), hostlink_common::error::HostlinkError>(())
//! ```
//!
//! [`ApiEvent`]: hostlink_common::types::ApiEvent

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod lookup;
pub mod registry;
pub mod reporter;
pub mod source;
pub mod transport;
