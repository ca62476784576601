//! Transport abstraction for connection establishment.
//!
//! The registry only needs a byte sink per process. [`Connector`] hides how
//! that sink is opened so that the TCP transport can be swapped out.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};

use hostlink_common::config::HostEndpoint;

/// A write-only byte stream to the analysis host.
pub trait HostStream: Write + Send {
    /// Flushes and releases the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if pending bytes cannot be flushed or the stream
    /// cannot be shut down.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl HostStream for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.shutdown(Shutdown::Both)
    }
}

/// Opens streams to a host endpoint.
///
/// Implementors must be shareable across threads: the registry connects
/// for different processes concurrently.
pub trait Connector: Send + Sync {
    /// Stream type produced by this connector.
    type Stream: HostStream;

    /// Opens a new stream to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached.
    fn connect(&self, endpoint: &HostEndpoint) -> io::Result<Self::Stream>;
}

/// Plain blocking TCP transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, endpoint: &HostEndpoint) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((endpoint.host(), endpoint.port()))?;
        // Records are small and written whole; do not let Nagle hold them back.
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
