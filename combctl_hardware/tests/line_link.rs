use std::time::{Duration, Instant};

use combctl_hardware::{LineServer, TcpConnector};
use combctl_traits::{LineConnector, LineSource};

fn drain(server: &mut LineServer, want: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut lines = Vec::new();
    while lines.len() < want && Instant::now() < deadline {
        match server.poll_line() {
            Some(line) => lines.push(line),
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    lines
}

#[test]
fn adjust_lines_arrive_in_order() {
    let mut server = LineServer::bind(0).unwrap();
    let mut link = TcpConnector::default().connect(server.port()).unwrap();
    for line in ["0.080000\n", "0.160000\n", "COMMITADJUST\n"] {
        link.send_line(line).unwrap();
    }
    assert_eq!(drain(&mut server, 3), vec!["0.080000", "0.160000", "COMMITADJUST"]);
    assert_eq!(server.poll_line(), None);
}

#[test]
fn server_accepts_a_new_client_after_disconnect() {
    let mut server = LineServer::bind(0).unwrap();
    let mut connector = TcpConnector::new(Duration::from_secs(1));
    {
        let mut first = connector.connect(server.port()).unwrap();
        first.send_line("1.0\n").unwrap();
    }
    assert_eq!(drain(&mut server, 1), vec!["1.0"]);
    let mut second = connector.connect(server.port()).unwrap();
    second.send_line("-2.5\r\n").unwrap();
    assert_eq!(drain(&mut server, 1), vec!["-2.5"]);
}

#[test]
fn connecting_to_a_closed_port_fails() {
    let port = {
        let server = LineServer::bind(0).unwrap();
        server.port()
    };
    assert!(TcpConnector::default().connect(port).is_err());
}

#[test]
fn dropping_the_server_joins_its_thread() {
    let start = Instant::now();
    drop(LineServer::bind(0).unwrap());
    assert!(start.elapsed() < Duration::from_secs(2));
}
