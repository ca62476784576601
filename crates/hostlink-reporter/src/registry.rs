//! Connection registry: one live connection per monitored process.
//!
//! A short-lived map lock hands out a per-process slot; all work on a
//! process's connection then happens under that slot's own mutex. Different
//! processes therefore connect and write in parallel, while events of one
//! process are written strictly one after another.
//!
//! A slot is only used while it is still the one in the map; a slot that
//! was dropped (idle, or drained by [`ConnectionRegistry::shutdown`]) while
//! a thread waited on it is abandoned and looked up again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hostlink_common::config::HostEndpoint;
use hostlink_common::constants::WIRE_MAGIC;
use hostlink_common::error::{HostlinkError, Result};
use hostlink_common::types::{ProcessId, ProcessInfo};
use hostlink_wire::record::{ApiDescription, CallRecord};

use crate::lookup::ApiTable;
use crate::transport::{Connector, HostStream};

/// An established, handshaken connection for one process.
#[derive(Debug)]
pub struct Session<S> {
    id: u64,
    pid: ProcessId,
    stream: S,
    table: ApiTable,
}

impl<S: HostStream> Session<S> {
    /// Registry-unique identifier of this connection.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Process this connection reports for.
    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    /// APIs registered on this connection.
    #[must_use]
    pub const fn table(&self) -> &ApiTable {
        &self.table
    }

    /// Mutable access to the lookup table.
    pub const fn table_mut(&mut self) -> &mut ApiTable {
        &mut self.table
    }

    /// Writes `bytes` in full.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::WriteFailure`] if the stream rejects the write.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .and_then(|()| self.stream.flush())
            .map_err(|source| HostlinkError::WriteFailure {
                pid: self.pid.as_u32(),
                source,
            })
    }

    fn close(mut self) -> Result<()> {
        self.stream
            .close()
            .map_err(|source| HostlinkError::WriteFailure {
                pid: self.pid.as_u32(),
                source,
            })
    }
}

struct Entry<S> {
    info: Option<ProcessInfo>,
    session: Option<Session<S>>,
}

impl<S> Entry<S> {
    /// Nothing left worth tracking: no connection and no announced metadata.
    const fn is_idle(&self) -> bool {
        self.session.is_none() && self.info.is_none()
    }
}

impl<S> Default for Entry<S> {
    fn default() -> Self {
        Self {
            info: None,
            session: None,
        }
    }
}

type Slot<S> = Arc<Mutex<Entry<S>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Encodes the bytes every new connection starts with: the marker, then
/// the `__process__` description and call.
fn handshake(info: &ProcessInfo) -> Result<Vec<u8>> {
    let mut buf = WIRE_MAGIC.to_vec();
    ApiDescription::process().encode_into(&mut buf)?;
    CallRecord::process(info).encode_into(&mut buf)?;
    Ok(buf)
}

/// Maps process ids to their connections to the analysis host.
pub struct ConnectionRegistry<C: Connector> {
    endpoint: HostEndpoint,
    connector: C,
    entries: Mutex<HashMap<ProcessId, Slot<C::Stream>>>,
    next_id: AtomicU64,
}

impl<C: Connector> ConnectionRegistry<C> {
    /// Creates an empty registry for `endpoint`.
    pub fn new(endpoint: HostEndpoint, connector: C) -> Self {
        Self {
            endpoint,
            connector,
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The analysis host every connection goes to.
    #[must_use]
    pub const fn endpoint(&self) -> &HostEndpoint {
        &self.endpoint
    }

    /// The transport used to open connections.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Records metadata for a process and makes sure it is connected.
    ///
    /// The metadata is used by this and every later handshake for `pid`. A
    /// process that is already connected keeps its connection; its earlier
    /// handshake is not repeated.
    ///
    /// # Errors
    ///
    /// See [`Self::get_or_create`].
    pub fn announce(&self, info: ProcessInfo) -> Result<u64> {
        let pid = info.pid;
        self.with_entry(pid, |entry| {
            entry.info = Some(info);
            self.open(pid, entry).map(|s| s.id())
        })
    }

    /// Returns the identifier of `pid`'s connection, connecting and
    /// handshaking first if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::TransportUnavailable`] if the host cannot be
    /// reached and [`HostlinkError::WriteFailure`] if the handshake cannot be
    /// sent. No entry is kept in either case.
    pub fn get_or_create(&self, pid: ProcessId) -> Result<u64> {
        self.with_session(pid, |session| Ok(session.id()))
    }

    /// Runs `f` with exclusive access to `pid`'s connection, creating it
    /// first if needed.
    ///
    /// If `f` fails with [`HostlinkError::WriteFailure`] the connection is
    /// dropped, so the next use reconnects and handshakes again.
    ///
    /// # Errors
    ///
    /// Propagates connection errors from [`Self::get_or_create`] and any
    /// error returned by `f`.
    pub fn with_session<R>(
        &self,
        pid: ProcessId,
        f: impl FnOnce(&mut Session<C::Stream>) -> Result<R>,
    ) -> Result<R> {
        self.with_entry(pid, |entry| {
            let result = self.open(pid, entry).and_then(f);
            if let Err(e) = &result {
                if e.is_write_failure() {
                    if let Some(dead) = entry.session.take() {
                        tracing::warn!(pid = %pid, connection = dead.id(), error = %e, "dropping broken connection");
                    }
                }
            }
            result
        })
    }

    /// Returns `true` if `pid` has a live connection.
    ///
    /// Blocks while another thread is writing for `pid`.
    #[must_use]
    pub fn contains(&self, pid: ProcessId) -> bool {
        let slot = lock(&self.entries).get(&pid).cloned();
        slot.is_some_and(|s| {
            let entry = lock(&s);
            entry.session.is_some()
        })
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots()
            .iter()
            .filter(|s| lock(s).session.is_some())
            .count()
    }

    /// Returns `true` if no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes `pid`'s connection, if any. Returns whether one was open.
    ///
    /// Announced metadata is kept for a later reconnect; a process that was
    /// never announced is forgotten entirely.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::WriteFailure`] if the stream fails to flush or
    /// shut down; the connection is released regardless.
    pub fn close(&self, pid: ProcessId) -> Result<bool> {
        let Some(slot) = lock(&self.entries).get(&pid).cloned() else {
            return Ok(false);
        };
        let session = {
            let mut entry = lock(&slot);
            let session = entry.session.take();
            if entry.is_idle() {
                self.forget(pid, &slot);
            }
            session
        };
        let Some(session) = session else {
            return Ok(false);
        };
        let id = session.id();
        session.close()?;
        tracing::info!(pid = %pid, connection = id, "connection closed");
        Ok(true)
    }

    /// Closes every connection and forgets all processes. Returns how many
    /// connections were open.
    ///
    /// Close errors are logged, not returned: the registry is being torn down.
    pub fn shutdown(&self) -> usize {
        let slots: Vec<_> = lock(&self.entries).drain().collect();
        let mut closed = 0;
        for (pid, slot) in slots {
            let Some(session) = lock(&slot).session.take() else {
                continue;
            };
            closed += 1;
            if let Err(e) = session.close() {
                tracing::warn!(pid = %pid, error = %e, "error while closing connection");
            }
        }
        tracing::info!(closed, endpoint = %self.endpoint, "registry shut down");
        closed
    }

    /// Runs `f` on `pid`'s entry under its slot lock.
    ///
    /// Retries until the locked slot is the one the map currently holds, and
    /// drops the entry afterwards if `f` left it idle.
    fn with_entry<R>(&self, pid: ProcessId, f: impl FnOnce(&mut Entry<C::Stream>) -> R) -> R {
        loop {
            let slot = self.slot(pid);
            let mut entry = lock(&slot);
            if self.is_current(pid, &slot) {
                let result = f(&mut entry);
                if entry.is_idle() {
                    self.forget(pid, &slot);
                }
                return result;
            }
            tracing::debug!(pid = %pid, "slot released while waiting, retrying");
        }
    }

    fn slot(&self, pid: ProcessId) -> Slot<C::Stream> {
        Arc::clone(lock(&self.entries).entry(pid).or_default())
    }

    // Lock order: slot, then map. Never the other way round.
    fn is_current(&self, pid: ProcessId, slot: &Slot<C::Stream>) -> bool {
        lock(&self.entries)
            .get(&pid)
            .is_some_and(|s| Arc::ptr_eq(s, slot))
    }

    fn forget(&self, pid: ProcessId, slot: &Slot<C::Stream>) {
        let mut entries = lock(&self.entries);
        if entries.get(&pid).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            let _ = entries.remove(&pid);
        }
    }

    fn slots(&self) -> Vec<Slot<C::Stream>> {
        lock(&self.entries).values().cloned().collect()
    }

    fn open<'a>(
        &self,
        pid: ProcessId,
        entry: &'a mut Entry<C::Stream>,
    ) -> Result<&'a mut Session<C::Stream>> {
        let session = match entry.session.take() {
            Some(session) => session,
            None => self.establish(pid, entry.info.as_ref())?,
        };
        Ok(entry.session.insert(session))
    }

    fn establish(&self, pid: ProcessId, info: Option<&ProcessInfo>) -> Result<Session<C::Stream>> {
        let hello = match info {
            Some(info) => handshake(info)?,
            None => handshake(&ProcessInfo::placeholder(pid))?,
        };

        let stream = self.connector.connect(&self.endpoint).map_err(|source| {
            tracing::error!(pid = %pid, endpoint = %self.endpoint, error = %source, "connect failed");
            HostlinkError::TransportUnavailable {
                endpoint: self.endpoint.to_string(),
                source,
            }
        })?;

        let mut session = Session {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            pid,
            stream,
            table: ApiTable::new(),
        };
        session.send(&hello)?;
        tracing::info!(
            pid = %pid,
            connection = session.id,
            endpoint = %self.endpoint,
            "connection established"
        );
        Ok(session)
    }
}
