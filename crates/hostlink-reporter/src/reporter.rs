//! The event reporter: turns [`ApiEvent`]s into records on the right
//! connection.

use hostlink_common::config::{HostEndpoint, HostlinkConfig};
use hostlink_common::error::Result;
use hostlink_common::types::{ApiEvent, DescriptionPolicy, ProcessId, ProcessInfo};
use hostlink_wire::record::PreparedEvent;

use crate::registry::ConnectionRegistry;
use crate::source::EventSource;
use crate::transport::{Connector, TcpConnector};

/// Outcome of draining an [`EventSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Events written to the host.
    pub reported: usize,
    /// Events that failed to report.
    pub failed: usize,
}

/// Reports intercepted calls to the analysis host.
///
/// Owns the connection registry for one analysis session. Safe to share
/// between threads; events of one process are serialized, events of
/// different processes are not.
pub struct EventReporter<C: Connector = TcpConnector> {
    registry: ConnectionRegistry<C>,
    policy: DescriptionPolicy,
}

impl EventReporter<TcpConnector> {
    /// Creates a TCP reporter for `host_ip:host_port`.
    pub fn new(host_ip: impl Into<String>, host_port: u16) -> Self {
        Self::with_connector(
            HostEndpoint::new(host_ip, host_port),
            TcpConnector,
            DescriptionPolicy::default(),
        )
    }

    /// Creates a TCP reporter from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &HostlinkConfig) -> Self {
        Self::with_connector(
            config.endpoint.clone(),
            TcpConnector,
            config.description_policy,
        )
    }
}

impl<C: Connector> EventReporter<C> {
    /// Creates a reporter over a custom transport.
    pub fn with_connector(endpoint: HostEndpoint, connector: C, policy: DescriptionPolicy) -> Self {
        Self {
            registry: ConnectionRegistry::new(endpoint, connector),
            policy,
        }
    }

    /// The underlying connection registry.
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    /// When API descriptions are sent.
    #[must_use]
    pub const fn policy(&self) -> DescriptionPolicy {
        self.policy
    }

    /// Reports one call.
    ///
    /// Connects and handshakes on the first event of a process. Sends the
    /// API's description when the connection has not seen it yet (or on every
    /// call under [`DescriptionPolicy::EveryCall`]), then the call record.
    /// Description and call go out in a single write.
    ///
    /// # Errors
    ///
    /// - [`HostlinkError::Encoding`] if a value cannot be encoded; nothing is
    ///   sent and no connection is opened.
    /// - [`HostlinkError::TransportUnavailable`] if the host cannot be reached.
    /// - [`HostlinkError::WriteFailure`] if the send fails; the connection is
    ///   dropped and the next event for this process reconnects.
    ///
    /// [`HostlinkError::Encoding`]: hostlink_common::error::HostlinkError::Encoding
    /// [`HostlinkError::TransportUnavailable`]: hostlink_common::error::HostlinkError::TransportUnavailable
    /// [`HostlinkError::WriteFailure`]: hostlink_common::error::HostlinkError::WriteFailure
    pub fn report_event(&self, event: &ApiEvent) -> Result<()> {
        let prepared = PreparedEvent::prepare(event)?;
        let arg_count = event.arg_count();

        self.registry.with_session(event.pid, |session| {
            let lookup = session.table_mut().resolve(&event.api, arg_count)?;
            let describe = !lookup.described || self.policy == DescriptionPolicy::EveryCall;

            let buf = prepared.encode(lookup.index, describe)?;
            session.send(&buf)?;

            if !lookup.described {
                session.table_mut().mark_described(&event.api, arg_count);
            }
            tracing::trace!(
                pid = %event.pid,
                tid = %event.tid,
                api = %event.api,
                index = lookup.index,
                described = describe,
                "event reported"
            );
            Ok(())
        })
    }

    /// Registers real process metadata and connects the process now.
    ///
    /// Without an announcement the handshake carries placeholder values.
    ///
    /// # Errors
    ///
    /// Same connection errors as [`Self::report_event`].
    pub fn announce_process(&self, info: ProcessInfo) -> Result<()> {
        let pid = info.pid;
        let connection = self.registry.announce(info)?;
        tracing::debug!(pid = %pid, connection, "process announced");
        Ok(())
    }

    /// Reports every event `source` yields.
    ///
    /// Report failures are logged and counted; they do not stop the drain.
    ///
    /// # Errors
    ///
    /// Returns the source's error if it fails to produce an event.
    pub fn drain<S: EventSource + ?Sized>(&self, source: &mut S) -> Result<DrainSummary> {
        let mut summary = DrainSummary::default();
        while let Some(event) = source.next_event()? {
            match self.report_event(&event) {
                Ok(()) => summary.reported += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(pid = %event.pid, api = %event.api, error = %e, "event not reported");
                }
            }
        }
        tracing::info!(reported = summary.reported, failed = summary.failed, "source drained");
        Ok(summary)
    }

    /// Closes one process's connection. Returns whether it was open.
    ///
    /// # Errors
    ///
    /// See [`ConnectionRegistry::close`].
    pub fn close_process(&self, pid: ProcessId) -> Result<bool> {
        self.registry.close(pid)
    }

    /// Closes every connection held by this reporter.
    pub fn shutdown(&self) -> usize {
        self.registry.shutdown()
    }
}
