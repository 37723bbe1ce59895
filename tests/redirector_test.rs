// tests/redirector_test.rs
//
// Redirector sessions over real loopback sockets against an in-memory
// serial line.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serbridge_lib::io::rfc2217::protocol::*;
use serbridge_lib::io::serial::{MemorySerialLine, ModemLines, SerialLine};
use serbridge_lib::io::{ControlChannel, IoError, PassthroughChannel, PortManager};
use serbridge_lib::redirector::{Lifecycle, Redirector};

const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

fn pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    client
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("client timeout");
    (server, client)
}

struct Session {
    redirector: Arc<Redirector>,
    line: MemorySerialLine,
    client: TcpStream,
    runner: JoinHandle<Result<(), IoError>>,
}

/// Passthrough codec whose modem status check always fails
struct FailingPoll;

impl ControlChannel for FailingPoll {
    fn protocol(&self) -> &'static str {
        "failing-poll"
    }

    fn escape(&mut self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn filter(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn poll_modem_status(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "modem status unavailable"))
    }
}

#[derive(Clone, Copy)]
enum Channel {
    Raw,
    Rfc2217,
    FailingPoll,
}

fn start(rfc2217: bool) -> Session {
    start_with(if rfc2217 { Channel::Rfc2217 } else { Channel::Raw })
}

fn start_with(channel: Channel) -> Session {
    let (server, client) = pair();
    let line = MemorySerialLine::new("mem", SERIAL_TIMEOUT);
    let redirector = Redirector::new(
        Box::new(line.clone()),
        server,
        move |control, network| -> io::Result<Box<dyn ControlChannel>> {
            match channel {
                Channel::Raw => Ok(Box::new(PassthroughChannel)),
                Channel::Rfc2217 => Ok(Box::new(PortManager::new(control, network)?)),
                Channel::FailingPoll => Ok(Box::new(FailingPoll)),
            }
        },
    )
    .expect("redirector");
    let redirector = Arc::new(redirector);
    let runner = {
        let redirector = redirector.clone();
        thread::spawn(move || redirector.start())
    };
    let deadline = Instant::now() + Duration::from_secs(2);
    while !redirector.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(redirector.is_running());
    Session {
        redirector,
        line,
        client,
        runner,
    }
}

/// Read from the client until `done` accepts the collected bytes or the
/// deadline passes.
fn read_until(client: &mut TcpStream, timeout: Duration, done: impl Fn(&[u8]) -> bool) -> Vec<u8> {
    let deadline = Instant::now() + timeout;
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    while !done(&received) && Instant::now() < deadline {
        match client.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(_) => continue,
        }
    }
    received
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// Wait for the session to end on its own and check the peer saw EOF.
fn assert_ended(session: Session, within: Duration) {
    let begun = Instant::now();
    session.runner.join().unwrap().expect("start");
    assert!(begun.elapsed() < within);
    assert_eq!(session.redirector.state(), Lifecycle::Stopped);
    assert_eq!(Arc::strong_count(&session.redirector), 1);

    let mut client = session.client;
    client
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("timeout");
    let mut buf = [0u8; 16];
    assert_eq!(client.read(&mut buf).expect("eof"), 0);
}

fn finish(session: Session) {
    session.redirector.stop();
    session.runner.join().unwrap().expect("start");
    assert_eq!(session.redirector.state(), Lifecycle::Stopped);
}

#[test]
fn test_serial_output_reaches_peer() {
    let mut session = start(false);
    session.line.inject(b"OK\r\n");
    let received = read_until(&mut session.client, Duration::from_secs(3), |r| r.len() >= 4);
    assert_eq!(received, b"OK\r\n");
    finish(session);
}

#[test]
fn test_peer_input_reaches_serial() {
    let mut session = start(false);
    session.client.write_all(b"AT\r\n").expect("send");
    let written = session.line.wait_written(4, Duration::from_secs(3));
    assert_eq!(written, b"AT\r\n");
    finish(session);
}

#[test]
fn test_order_is_preserved_both_ways() {
    let mut session = start(false);
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

    for chunk in data.chunks(700) {
        session.line.inject(chunk);
    }
    let received = read_until(&mut session.client, Duration::from_secs(5), |r| {
        r.len() >= data.len()
    });
    assert_eq!(received, data);

    session.client.write_all(&data).expect("send");
    let written = session.line.wait_written(data.len(), Duration::from_secs(5));
    assert_eq!(written, data);
    finish(session);
}

#[test]
fn test_rfc2217_escapes_and_filters_payload() {
    let mut session = start(true);
    let initial = read_until(&mut session.client, Duration::from_secs(3), |r| r.len() >= 12);
    assert_eq!(
        initial,
        vec![IAC, WILL, ECHO, IAC, WILL, SGA, IAC, DO, BINARY, IAC, WILL, COM_PORT_OPTION]
    );

    // serial -> network: IAC is doubled
    session.line.inject(&[b'x', IAC, b'y']);
    let received = read_until(&mut session.client, Duration::from_secs(3), |r| r.len() >= 4);
    assert_eq!(received, vec![b'x', IAC, IAC, b'y']);

    // network -> serial: escaped IAC is restored and the baud rate request is
    // consumed and answered
    let mut request = vec![b'a', IAC, IAC, b'b'];
    request.extend([IAC, SB, COM_PORT_OPTION, SET_BAUDRATE, 0, 0, 0x4B, 0x00, IAC, SE]);
    request.push(b'c');
    session.client.write_all(&request).expect("send");

    let written = session.line.wait_written(4, Duration::from_secs(3));
    assert_eq!(written, vec![b'a', IAC, b'b', b'c']);
    let reply = read_until(&mut session.client, Duration::from_secs(3), |r| r.len() >= 10);
    assert_eq!(
        reply,
        vec![IAC, SB, COM_PORT_OPTION, server(SET_BAUDRATE), 0, 0, 0x4B, 0x00, IAC, SE]
    );
    assert_eq!(session.line.settings().expect("settings").baud_rate, 19200);
    finish(session);
}

#[test]
fn test_control_writes_do_not_interleave_with_data() {
    let mut session = start(false);
    let marker = b"<marker-0123456789abcdef>";
    let writes = 200;

    let feeder = {
        let line = session.line.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                line.inject(&[b'.'; 512]);
                thread::sleep(Duration::from_millis(1));
            }
        })
    };
    let writer = {
        let redirector = session.redirector.clone();
        thread::spawn(move || {
            for _ in 0..writes {
                redirector.write(marker).expect("write");
            }
        })
    };
    feeder.join().unwrap();
    writer.join().unwrap();

    let expected = 200 * 512 + writes * marker.len();
    let received = read_until(&mut session.client, Duration::from_secs(5), |r| {
        r.len() >= expected
    });
    assert_eq!(received.len(), expected);
    assert_eq!(count(&received, marker), writes);
    finish(session);
}

#[test]
fn test_peer_close_ends_session() {
    let session = start(false);
    session.line.inject(b"streaming");
    drop(session.client);

    let begun = Instant::now();
    session.runner.join().unwrap().expect("start");
    assert!(begun.elapsed() < Duration::from_secs(3));
    assert_eq!(session.redirector.state(), Lifecycle::Stopped);

    // the serial side is no longer read
    let pending = session.line.bytes_to_read().expect("count");
    session.line.inject(b"late");
    thread::sleep(SERIAL_TIMEOUT * 3);
    assert_eq!(session.line.bytes_to_read().expect("count"), pending + 4);

    session.redirector.stop();
    assert_eq!(session.redirector.state(), Lifecycle::Stopped);
}

#[test]
fn test_concurrent_stops_are_idempotent() {
    let mut session = start(false);
    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let redirector = session.redirector.clone();
            thread::spawn(move || redirector.stop())
        })
        .collect();
    for stopper in stoppers {
        stopper.join().unwrap();
    }
    assert_eq!(session.redirector.state(), Lifecycle::Stopped);

    // peer sees an orderly close
    let rest = read_until(&mut session.client, Duration::from_secs(3), |_| false);
    assert!(rest.is_empty());
    assert!(session.redirector.write(b"late").is_err());
    finish(session);
}

#[test]
fn test_modem_change_is_reported_within_poll_interval() {
    let mut session = start(true);
    read_until(&mut session.client, Duration::from_secs(3), |r| r.len() >= 12);

    // client accepts the COM port option, which forces one notification
    session
        .client
        .write_all(&[IAC, DO, COM_PORT_OPTION])
        .expect("send");
    let first = vec![IAC, SB, COM_PORT_OPTION, server(NOTIFY_MODEMSTATE), 0, IAC, SE];
    let received = read_until(&mut session.client, Duration::from_secs(3), |r| {
        contains(r, &first)
    });
    assert!(contains(&received, &first));

    session.line.set_modem_lines(ModemLines {
        cts: true,
        ..ModemLines::default()
    });
    let changed = vec![
        IAC,
        SB,
        COM_PORT_OPTION,
        server(NOTIFY_MODEMSTATE),
        MODEMSTATE_MASK_CTS | MODEMSTATE_MASK_CTS_CHANGE,
        IAC,
        SE,
    ];
    let begun = Instant::now();
    let received = read_until(&mut session.client, Duration::from_secs(3), |r| {
        contains(r, &changed)
    });
    assert!(contains(&received, &changed));
    assert!(begun.elapsed() < Duration::from_millis(2500));
    finish(session);
}

#[test]
fn test_failed_status_poll_ends_session() {
    let session = start_with(Channel::FailingPoll);
    assert_ended(session, Duration::from_secs(4));
}

#[test]
fn test_failed_serial_write_ends_session() {
    let mut session = start(false);
    session.line.fail_writes();
    session.client.write_all(b"AT\r\n").expect("send");
    let line = session.line.clone();
    assert_ended(session, Duration::from_secs(3));
    assert!(line.written().is_empty());
}
