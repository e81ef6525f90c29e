//! Scripted [`NetworkClient`] for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::network::{Method, NetworkClient, Request, Response};

type Observer = Arc<dyn Fn(&Request) + Send + Sync>;

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<Response, TransportError>>,
    routes: Vec<(Method, String, Response)>,
    requests: Vec<Request>,
}

/// Answers requests from routed replies first, then from a FIFO of canned
/// replies (204 once exhausted),
/// records every request and tracks how many are in flight at once.
#[derive(Clone, Default)]
pub struct MockClient {
    script: Arc<Mutex<Script>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    latency: Option<Duration>,
    observer: Option<Observer>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend every request for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Run `observer` while each request is in flight.
    pub fn with_observer(mut self, observer: impl Fn(&Request) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn respond(&self, response: Response) {
        self.script.lock().unwrap().replies.push_back(Ok(response));
    }

    /// Answer every `method` request whose location starts with `prefix`
    /// with `response`, regardless of order.
    pub fn route(&self, method: Method, prefix: &str, response: Response) {
        self.script
            .lock()
            .unwrap()
            .routes
            .push((method, prefix.to_string(), response));
    }

    pub fn fail(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .replies
            .push_back(Err(TransportError(message.to_string())));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkClient for MockClient {
    async fn request(&self, request: Request) -> Result<Response, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(observer) = &self.observer {
            observer(&request);
        }
        let routed = {
            let mut script = self.script.lock().unwrap();
            let routed = script
                .routes
                .iter()
                .find(|(method, prefix, _)| *method == request.method && request.location.starts_with(prefix))
                .map(|(_, _, response)| response.clone());
            script.requests.push(request);
            routed
        };
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        let reply = match routed {
            Some(response) => Ok(response),
            None => self
                .script
                .lock()
                .unwrap()
                .replies
                .pop_front()
                .unwrap_or_else(|| Ok(Response::new(204))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}
