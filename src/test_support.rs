//! A small expectation-based fake transport, for testing brokers without real
//! I/O.
//!
//! Grounded on the original implementation's `testing.MockAdapter`
//! (`examples/original_source/testing/mock.go`): register expectations with
//! [`MockAdapter::on`], hand the reader/writer pair returned by
//! [`MockAdapter::new`] to [`crate::Broker::new`], and assert on
//! [`MockAdapter::received_frames`] afterwards. Built on `tokio::io::duplex`,
//! the idiomatic tokio substitute for the original's `io.Pipe()`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{split, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use crate::codec::{read_frame, write_frame};
use crate::frame::{Frame, Identity};

struct QueuedResponse {
    frame: Frame,
    delay: Option<Duration>,
}

struct Expectation {
    identity: Identity,
    responses: VecDeque<QueuedResponse>,
}

struct Shared {
    expectations: Vec<Expectation>,
    received: Vec<Frame>,
}

/// A fake bidirectional transport that replies to registered request
/// identities with canned response frames, and records everything it sees.
pub struct MockAdapter {
    shared: Arc<Mutex<Shared>>,
    inject_tx: mpsc::Sender<Frame>,
    driver: Option<tokio::task::JoinHandle<()>>,
}

/// The half of a [`MockAdapter`] handed to the broker under test.
pub type BrokerHalf = (ReadHalf<tokio::io::DuplexStream>, WriteHalf<tokio::io::DuplexStream>);

impl MockAdapter {
    /// Create a fresh adapter with no expectations registered yet.
    pub fn new() -> (Self, BrokerHalf) {
        let (broker_side, mock_side) = tokio::io::duplex(4096);
        let shared = Arc::new(Mutex::new(Shared { expectations: Vec::new(), received: Vec::new() }));

        let (inject_tx, mut inject_rx) = mpsc::channel::<Frame>(16);

        let driver_shared = shared.clone();
        let (mut mock_read, mut mock_write) = split(mock_side);
        let driver = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    injected = inject_rx.recv() => {
                        match injected {
                            Some(frame) => {
                                if write_frame(&mut mock_write, &frame).await.is_err() {
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                    read = read_frame(&mut mock_read) => {
                        let frame = match read {
                            Ok(frame) => frame,
                            Err(_) => return, // broker stopped / transport closed
                        };

                        let responses = {
                            let mut shared = driver_shared.lock().unwrap();
                            shared.received.push(frame.clone());
                            shared
                                .expectations
                                .iter_mut()
                                .find(|expectation| expectation.identity == frame.identity())
                                .and_then(|expectation| expectation.responses.pop_front())
                        };

                        if let Some(response) = responses {
                            if let Some(delay) = response.delay {
                                tokio::time::sleep(delay).await;
                            }
                            if write_frame(&mut mock_write, &response.frame).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        let (broker_read, broker_write) = split(broker_side);
        (Self { shared, inject_tx, driver: Some(driver) }, (broker_read, broker_write))
    }

    /// Write `frame` to the broker under test as if it arrived unsolicited
    /// (e.g. an `AREQ` event not sent in reply to anything).
    pub async fn inject(&self, frame: Frame) {
        let _ = self.inject_tx.send(frame).await;
    }

    /// Queue `response` to be sent back the next time a frame matching
    /// `identity` is received. Multiple calls for the same identity queue
    /// multiple responses, served in registration order.
    pub fn on(&self, identity: Identity, response: Frame) {
        self.on_delayed(identity, response, None);
    }

    /// Like [`MockAdapter::on`], but the adapter waits `delay` after receiving
    /// the matching frame before writing the response, for tests that need to
    /// observe state in the window between request and response.
    pub fn on_delayed(&self, identity: Identity, response: Frame, delay: Option<Duration>) {
        let mut shared = self.shared.lock().unwrap();
        let queued = QueuedResponse { frame: response, delay };
        match shared.expectations.iter_mut().find(|e| e.identity == identity) {
            Some(existing) => existing.responses.push_back(queued),
            None => shared.expectations.push(Expectation { identity, responses: VecDeque::from([queued]) }),
        }
    }

    /// All frames received so far, in arrival order.
    pub fn received_frames(&self) -> Vec<Frame> {
        self.shared.lock().unwrap().received.clone()
    }
}

impl Drop for MockAdapter {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
