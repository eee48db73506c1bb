//! In-process store fixture for integration tests.
//!
//! Binds a real TCP listener on a loopback port and answers framed requests
//! according to a scripted behavior, so cluster/node tests run against the
//! same wire protocol as production without a store.

// Each test binary uses a subset of the fixture surface.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use tokio::net::{TcpListener, TcpStream};

use covekv_common::protocol::messages::{CoverageEntryPb, CoverageResp, ErrorResp};
use covekv_common::protocol::{codes, WireMessage};
use covekv_common::transport::{read_frame, write_frame};

/// One scripted coverage entry.
#[derive(Clone)]
pub struct PlanEntry {
    pub host: String,
    pub port: u16,
    pub description: String,
    pub context: Vec<u8>,
}

impl PlanEntry {
    pub fn new(host: &str, port: u16, description: &str, context: &[u8]) -> Self {
        Self {
            host: host.to_string(),
            port,
            description: description.to_string(),
            context: context.to_vec(),
        }
    }

    fn to_pb(&self) -> CoverageEntryPb {
        CoverageEntryPb {
            cover_context: self.context.clone(),
            keyspace_desc: self.description.clone(),
            ip: self.host.clone(),
            port: self.port as u32,
        }
    }
}

/// How the fixture answers each request frame.
#[derive(Clone)]
pub enum Behavior {
    /// Answer every request with an empty ping response.
    PingOk,
    /// Like `PingOk`, but hold the response for the given duration.
    PingDelay(Duration),
    /// Answer every request with one coverage response frame.
    CoveragePlan(Vec<PlanEntry>),
    /// Answer every request with a multi-frame coverage response.
    CoverageFrames(Vec<Vec<PlanEntry>>),
    /// Answer every request with an error frame.
    ErrorFrame { code: u32, message: String },
    /// Accept the connection and close it immediately.
    AcceptThenClose,
}

pub struct Fixture {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
}

impl Fixture {
    pub async fn spawn(behavior: Behavior) -> Fixture {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle(stream, behavior.clone(), counter.clone()));
            }
        });

        Fixture { addr, requests }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Requests served so far (frames read, not connections).
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn handle(mut stream: TcpStream, behavior: Behavior, requests: Arc<AtomicUsize>) {
    if matches!(behavior, Behavior::AcceptThenClose) {
        return;
    }

    while read_frame(&mut stream).await.is_ok() {
        requests.fetch_add(1, Ordering::SeqCst);
        let sent = match &behavior {
            Behavior::PingOk => {
                write_frame(&mut stream, &WireMessage::new(codes::PING_RESP, Bytes::new())).await
            }
            Behavior::PingDelay(delay) => {
                tokio::time::sleep(*delay).await;
                write_frame(&mut stream, &WireMessage::new(codes::PING_RESP, Bytes::new())).await
            }
            Behavior::CoveragePlan(entries) => {
                let resp = CoverageResp {
                    entries: entries.iter().map(PlanEntry::to_pb).collect(),
                    done: None,
                };
                write_frame(
                    &mut stream,
                    &WireMessage::new(codes::COVERAGE_RESP, resp.encode_to_vec()),
                )
                .await
            }
            Behavior::CoverageFrames(frames) => {
                let mut result = Ok(());
                for (i, entries) in frames.iter().enumerate() {
                    let last = i + 1 == frames.len();
                    let resp = CoverageResp {
                        entries: entries.iter().map(PlanEntry::to_pb).collect(),
                        done: if last { None } else { Some(false) },
                    };
                    result = write_frame(
                        &mut stream,
                        &WireMessage::new(codes::COVERAGE_RESP, resp.encode_to_vec()),
                    )
                    .await;
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
            Behavior::ErrorFrame { code, message } => {
                let resp = ErrorResp {
                    errmsg: message.clone(),
                    errcode: *code,
                };
                write_frame(
                    &mut stream,
                    &WireMessage::new(codes::ERROR_RESP, resp.encode_to_vec()),
                )
                .await
            }
            Behavior::AcceptThenClose => unreachable!(),
        };
        if sent.is_err() {
            break;
        }
    }
}

/// Polls `cond` until it holds or the deadline passes.
pub async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
