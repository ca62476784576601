//! Loopback integration tests for the reporter.
//!
//! Each test runs a tiny analysis host on `127.0.0.1:0` that accepts a fixed
//! number of connections, reads every stream to its end and decodes it with
//! the wire crate's frame reader.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bson::Bson;
use hostlink_common::config::HostEndpoint;
use hostlink_common::error::HostlinkError;
use hostlink_common::types::{ApiEvent, DescriptionPolicy, ProcessId};
use hostlink_reporter::reporter::EventReporter;
use hostlink_reporter::source::JsonLinesSource;
use hostlink_reporter::transport::{Connector, TcpConnector};
use hostlink_wire::frame::{FrameReader, Message};
use hostlink_wire::record::CallRecord;

/// Raw bytes of every accepted connection, in accept order.
fn spawn_host(connections: usize) -> (u16, JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let handle = thread::spawn(move || {
        (0..connections)
            .map(|_| {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut bytes = Vec::new();
                stream.read_to_end(&mut bytes).expect("read");
                bytes
            })
            .collect()
    });
    (port, handle)
}

fn decode(bytes: &[u8]) -> Vec<Message> {
    FrameReader::new(bytes)
        .collect::<Result<_, _>>()
        .expect("well-formed stream")
}

fn process_pid(messages: &[Message]) -> Bson {
    match &messages[1] {
        Message::Call(c) => c.args[4].clone(),
        other => panic!("expected process call, got {other:?}"),
    }
}

fn open_event(pid: u32) -> ApiEvent {
    ApiEvent::new(pid, 7, "open", 3, vec!["/tmp/x".into(), 0.into()])
}

/// Counts connection attempts.
#[derive(Default)]
struct CountingConnector {
    attempts: AtomicUsize,
}

impl Connector for CountingConnector {
    type Stream = TcpStream;

    fn connect(&self, endpoint: &HostEndpoint) -> io::Result<TcpStream> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        TcpConnector.connect(endpoint)
    }
}

/// Holds every connect until `expected` of them are in flight at once.
struct RendezvousConnector {
    expected: usize,
    arrived: Mutex<usize>,
    all_here: Condvar,
}

impl Connector for RendezvousConnector {
    type Stream = TcpStream;

    fn connect(&self, endpoint: &HostEndpoint) -> io::Result<TcpStream> {
        let mut arrived = self.arrived.lock().unwrap();
        *arrived += 1;
        self.all_here.notify_all();
        let (arrived, timeout) = self
            .all_here
            .wait_timeout_while(arrived, Duration::from_secs(5), |n| *n < self.expected)
            .unwrap();
        drop(arrived);
        if timeout.timed_out() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "peer connect never started"));
        }
        TcpConnector.connect(endpoint)
    }
}

#[test]
fn first_event_produces_handshake_then_description_then_call() {
    let (port, host) = spawn_host(1);
    let reporter = EventReporter::new("127.0.0.1", port);

    reporter.report_event(&open_event(100)).expect("report");
    assert_eq!(reporter.shutdown(), 1);

    let streams = host.join().unwrap();
    assert!(streams[0].starts_with(b"BSON\n"));
    let messages = decode(&streams[0]);
    assert_eq!(messages.len(), 4);

    match &messages[0] {
        Message::Description(d) => {
            assert_eq!(d.index, 0);
            assert_eq!(d.name, "__process__");
            assert_eq!(
                d.args,
                vec![
                    "is_success",
                    "retval",
                    "TimeLow",
                    "TimeHigh",
                    "ProcessIdentifier",
                    "ParentProcessIdentifier",
                    "ModulePath",
                ]
            );
        }
        other => panic!("expected process description, got {other:?}"),
    }
    match &messages[1] {
        Message::Call(c) => assert_eq!(
            c.args,
            vec![
                Bson::Int32(1),
                Bson::Int32(0),
                Bson::Int32(0),
                Bson::Int32(0),
                Bson::Int32(100),
                Bson::Int32(1),
                Bson::String("dummy".into()),
            ]
        ),
        other => panic!("expected process call, got {other:?}"),
    }
    let Message::Description(open) = &messages[2] else {
        panic!("expected api description");
    };
    assert_eq!(open.name, "open");
    assert_eq!(open.category, "unknown");
    assert_eq!(open.args, vec!["is_success", "retval", "arg0", "arg1"]);

    assert_eq!(
        messages[3],
        Message::Call(CallRecord {
            index: open.index,
            thread_id: 7,
            elapsed_ms: 0,
            args: vec![
                Bson::Int32(1),
                Bson::Int32(3),
                Bson::String("/tmp/x".into()),
                Bson::Int32(0),
            ],
        })
    );
}

#[test]
fn known_process_reuses_its_connection() {
    let (port, host) = spawn_host(1);
    let connector = CountingConnector::default();
    let reporter = EventReporter::with_connector(
        HostEndpoint::new("127.0.0.1", port),
        connector,
        DescriptionPolicy::OncePerConnection,
    );

    reporter.report_event(&open_event(100)).expect("first");
    reporter
        .report_event(&ApiEvent::new(100, 8, "open", 4, vec!["/etc/hosts".into(), 0.into()]))
        .expect("second");
    assert_eq!(
        reporter.registry().get_or_create(ProcessId::new(100)).expect("id"),
        reporter.registry().get_or_create(ProcessId::new(100)).expect("id"),
    );
    let _ = reporter.shutdown();

    let streams = host.join().unwrap();
    assert_eq!(streams[0].windows(5).filter(|w| w == b"BSON\n").count(), 1);
    let messages = decode(&streams[0]);
    assert_eq!(messages.len(), 5);
    assert!(matches!(&messages[4], Message::Call(c) if c.thread_id == 8));
}

#[test]
fn every_call_policy_sends_identical_descriptions() {
    let (port, host) = spawn_host(1);
    let reporter = EventReporter::with_connector(
        HostEndpoint::new("127.0.0.1", port),
        TcpConnector,
        DescriptionPolicy::EveryCall,
    );

    reporter.report_event(&open_event(100)).expect("first");
    reporter
        .report_event(&ApiEvent::new(100, 7, "open", 5, vec!["/var/log".into(), 1.into()]))
        .expect("second");
    let _ = reporter.shutdown();

    let messages = decode(&host.join().unwrap()[0]);
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[2], messages[4]);
    assert_ne!(messages[3], messages[5]);
}

#[test]
fn distinct_processes_connect_concurrently() {
    let (port, host) = spawn_host(2);
    let reporter = EventReporter::with_connector(
        HostEndpoint::new("127.0.0.1", port),
        RendezvousConnector {
            expected: 2,
            arrived: Mutex::new(0),
            all_here: Condvar::new(),
        },
        DescriptionPolicy::OncePerConnection,
    );

    thread::scope(|s| {
        let a = s.spawn(|| reporter.report_event(&open_event(1)));
        let b = s.spawn(|| reporter.report_event(&open_event(2)));
        a.join().unwrap().expect("pid 1");
        b.join().unwrap().expect("pid 2");
    });
    assert_eq!(reporter.registry().len(), 2);
    assert_eq!(reporter.shutdown(), 2);

    let mut pids: Vec<Bson> = host
        .join()
        .unwrap()
        .iter()
        .map(|bytes| process_pid(&decode(bytes)))
        .collect();
    pids.sort_by_key(|b| b.as_i32());
    assert_eq!(pids, vec![Bson::Int32(1), Bson::Int32(2)]);
}

#[test]
fn concurrent_events_of_one_process_share_one_connection() {
    const THREADS: u32 = 8;
    let (port, host) = spawn_host(1);
    let reporter = EventReporter::with_connector(
        HostEndpoint::new("127.0.0.1", port),
        CountingConnector::default(),
        DescriptionPolicy::EveryCall,
    );

    thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|tid| {
                let reporter = &reporter;
                s.spawn(move || {
                    let event = ApiEvent::new(100, tid, "open", 3, vec!["/tmp/x".into(), 0.into()]);
                    reporter.report_event(&event)
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap().expect("report");
        }
    });
    assert_eq!(reporter.registry().connector().attempts.load(Ordering::SeqCst), 1);
    assert_eq!(reporter.shutdown(), 1);

    let streams = host.join().unwrap();
    assert_eq!(streams[0].windows(5).filter(|w| w == b"BSON\n").count(), 1);
    let messages = decode(&streams[0]);
    assert_eq!(messages.len(), 2 + 2 * THREADS as usize);

    let mut threads: Vec<u32> = messages[2..]
        .chunks(2)
        .map(|pair| match pair {
            [Message::Description(d), Message::Call(c)] => {
                assert_eq!(d.name, "open");
                assert_eq!(c.index, d.index);
                c.thread_id
            }
            other => panic!("description/call pair split: {other:?}"),
        })
        .collect();
    threads.sort_unstable();
    assert_eq!(threads, (0..THREADS).collect::<Vec<_>>());
}

#[test]
fn unreachable_host_is_reported() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let reporter = EventReporter::new("127.0.0.1", port);

    let err = reporter.report_event(&open_event(100)).unwrap_err();
    assert!(matches!(err, HostlinkError::TransportUnavailable { .. }));
    assert!(reporter.registry().is_empty());
}

#[test]
fn replayed_file_reaches_host() {
    let (port, host) = spawn_host(2);
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(
        file,
        r#"{{"pid":100,"tid":7,"api":"open","retval":3,"args":["/tmp/x",0]}}"#
    )
    .unwrap();
    writeln!(
        file,
        r#"{{"pid":200,"tid":1,"api":"exit","retval":0,"success":false,"elapsed_ms":42}}"#
    )
    .unwrap();

    let reporter = EventReporter::new("127.0.0.1", port);
    let mut source = JsonLinesSource::open(file.path()).expect("open");
    let summary = reporter.drain(&mut source).expect("drain");
    assert_eq!(summary.reported, 2);
    assert_eq!(summary.failed, 0);
    let _ = reporter.shutdown();

    let streams = host.join().unwrap();
    let exit = streams
        .iter()
        .map(|b| decode(b))
        .find(|m| process_pid(m) == Bson::Int32(200))
        .expect("pid 200 stream");
    let Message::Call(call) = &exit[3] else {
        panic!("expected exit call");
    };
    assert_eq!(call.elapsed_ms, 42);
    assert_eq!(call.args, vec![Bson::Int32(0), Bson::Int32(0)]);
}
