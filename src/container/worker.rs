//! Background container codec
//!
//! Decode and encode are CPU-heavy, so they run on a dedicated worker thread
//! behind a request/response protocol. Each request carries a monotonic id
//! and a typed payload; each response is success-with-data or
//! failure-with-message. Payloads are moved through the channels, never
//! copied. Callers poll a pending handle each frame or block on `wait`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;

use super::{CompressionOptions, Container, ContainerError};

/// Typed request payload
enum Payload {
    Decode(Vec<u8>),
    Encode(Box<Container>, CompressionOptions),
}

struct Request {
    id: u64,
    payload: Payload,
    reply: Sender<Response>,
}

/// Worker reply, matched to its request by id
struct Response {
    id: u64,
    result: Result<Outcome, String>,
}

enum Outcome {
    Decoded(Box<Container>),
    Encoded(Vec<u8>),
}

/// Handle to a pending codec request that can be polled or awaited
pub struct Pending<T> {
    id: u64,
    receiver: Option<Receiver<Response>>,
    result: Option<Result<T, String>>,
    map: fn(Outcome) -> Option<T>,
}

impl<T> Pending<T> {
    fn from_receiver(id: u64, receiver: Receiver<Response>, map: fn(Outcome) -> Option<T>) -> Self {
        Self {
            id,
            receiver: Some(receiver),
            result: None,
            map,
        }
    }

    fn failed(id: u64, message: String, map: fn(Outcome) -> Option<T>) -> Self {
        Self {
            id,
            receiver: None,
            result: Some(Err(message)),
            map,
        }
    }

    /// The request id assigned by the worker protocol
    pub fn id(&self) -> u64 {
        self.id
    }

    fn accept(&mut self, response: Response) {
        debug_assert_eq!(response.id, self.id);
        self.result = Some(match response.result {
            Ok(outcome) => {
                (self.map)(outcome).ok_or_else(|| "codec worker sent mismatched payload".to_string())
            }
            Err(msg) => Err(msg),
        });
    }

    /// Check whether the response has arrived (polls the channel)
    pub fn is_complete(&mut self) -> bool {
        if self.result.is_some() {
            return true;
        }
        let Some(receiver) = &self.receiver else {
            return true;
        };
        match receiver.try_recv() {
            Ok(response) => {
                self.accept(response);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.result = Some(Err("codec worker stopped".to_string()));
                true
            }
        }
    }

    /// Take the result if complete
    pub fn take(mut self) -> Option<Result<T, String>> {
        self.is_complete();
        self.result.take()
    }

    /// Block until the response arrives
    pub fn wait(mut self) -> Result<T, String> {
        if let Some(result) = self.result.take() {
            return result;
        }
        let Some(receiver) = self.receiver.take() else {
            return Err("codec worker stopped".to_string());
        };
        match receiver.recv() {
            Ok(response) => {
                self.accept(response);
                self.result.take().unwrap_or_else(|| Err("codec worker stopped".to_string()))
            }
            Err(_) => Err("codec worker stopped".to_string()),
        }
    }
}

/// Long-lived codec worker
///
/// Owns one background thread; dropping the worker closes the request
/// channel and the thread exits. Requests already accepted still complete
/// because each carries its own reply channel.
pub struct CodecWorker {
    tx: Sender<Request>,
    next_id: AtomicU64,
}

impl CodecWorker {
    pub fn spawn() -> Self {
        let (tx, rx) = channel::<Request>();
        thread::spawn(move || {
            while let Ok(request) = rx.recv() {
                let result = match request.payload {
                    Payload::Decode(bytes) => Container::parse(&bytes)
                        .map(|c| Outcome::Decoded(Box::new(c)))
                        .map_err(|e: ContainerError| e.to_string()),
                    Payload::Encode(container, options) => container
                        .generate(&options)
                        .map(Outcome::Encoded)
                        .map_err(|e| e.to_string()),
                };
                let _ = request.reply.send(Response {
                    id: request.id,
                    result,
                });
            }
        });
        Self {
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    fn submit<T>(&self, payload: Payload, map: fn(Outcome) -> Option<T>) -> Pending<T> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply, receiver) = channel();
        match self.tx.send(Request { id, payload, reply }) {
            Ok(()) => Pending::from_receiver(id, receiver, map),
            Err(_) => Pending::failed(id, "codec worker stopped".to_string(), map),
        }
    }

    /// Decode serialized container bytes off-thread
    pub fn decode(&self, bytes: Vec<u8>) -> Pending<Container> {
        self.submit(Payload::Decode(bytes), |outcome| match outcome {
            Outcome::Decoded(container) => Some(*container),
            _ => None,
        })
    }

    /// Encode a container snapshot off-thread
    pub fn encode(&self, container: Container, options: CompressionOptions) -> Pending<Vec<u8>> {
        self.submit(Payload::Encode(Box::new(container), options), |outcome| {
            match outcome {
                Outcome::Encoded(bytes) => Some(bytes),
                _ => None,
            }
        })
    }
}
