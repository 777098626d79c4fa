//! Helpers shared by unit tests

use std::{
    io::{Read, Write},
    net::TcpListener,
    sync::mpsc::Sender,
    thread::JoinHandle,
    time::Duration,
};

use crossbeam::channel::Receiver;

use rouille::{Request, Response};

/// Local HTTP server standing in for an external service
pub struct Upstream {
    pub base_url: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Upstream {
    pub fn start<F>(handler: F) -> Self
    where
        F: Send + Sync + 'static + Fn(&Request) -> Response,
    {
        let server = rouille::Server::new("127.0.0.1:0", handler).expect("bind upstream");
        let base_url = format!("http://{}", server.server_addr());
        let (handle, stop) = server.stoppable();
        Self {
            base_url,
            stop: Some(stop),
            handle: Some(handle),
        }
    }
}

impl Drop for Upstream {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// a base url nothing listens on
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Answers one request with headers and the first bytes of a 1000 byte body,
/// then sends nothing more. Returns the URL and a receiver that gets a message
/// once the client closes the connection.
pub fn stalling_upstream() -> (String, Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/audio", listener.local_addr().unwrap());
    let (closed_tx, closed) = crossbeam::channel::bounded(1);

    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: audio/mp4\r\nContent-Length: 1000\r\n\r\nabcd",
            )
            .unwrap();
        stream.flush().unwrap();

        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        if let Ok(0) = stream.read(&mut buf) {
            let _ = closed_tx.send(());
        }
    });
    (url, closed)
}

pub fn read_body(response: Response) -> Vec<u8> {
    let mut body = Vec::new();
    response
        .data
        .into_reader_and_size()
        .0
        .read_to_end(&mut body)
        .unwrap();
    body
}

pub fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response
        .headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_ref())
}

pub fn parse_json_response<T: serde::de::DeserializeOwned>(response: Response) -> T {
    serde_json::from_slice(&read_body(response)).unwrap()
}
