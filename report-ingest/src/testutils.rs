use crate::backend::{Backend, BackendError, Session};
use crate::beacon::Beacon;
use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// Backend double. Counts opened sessions and forwards every sent beacon,
/// tagged with the tenant's API key, to `beacons`.
pub struct FakeBackend {
    sessions_opened: AtomicUsize,
    fail_open: bool,
    open_delay: Duration,
    beacons: mpsc::UnboundedSender<(String, Beacon)>,
}

impl FakeBackend {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Beacon)>) {
        Self::build(false, Duration::ZERO)
    }

    /// A backend whose `open_session` always fails.
    pub fn failing() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Beacon)>) {
        Self::build(true, Duration::ZERO)
    }

    /// A backend whose `open_session` waits for `delay` before succeeding.
    pub fn slow(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Beacon)>) {
        Self::build(false, delay)
    }

    fn build(
        fail_open: bool,
        open_delay: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Beacon)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = FakeBackend {
            sessions_opened: AtomicUsize::new(0),
            fail_open,
            open_delay,
            beacons: tx,
        };
        (Arc::new(backend), rx)
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn open_session(
        &self,
        api_key: &str,
        _secret: &str,
    ) -> Result<Arc<dyn Session>, BackendError> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail_open {
            return Err(BackendError::InvalidSecret(api_key.to_string()));
        }

        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            api_key: api_key.to_string(),
            beacons: self.beacons.clone(),
        }))
    }
}

struct FakeSession {
    api_key: String,
    beacons: mpsc::UnboundedSender<(String, Beacon)>,
}

#[async_trait]
impl Session for FakeSession {
    async fn send(&self, beacon: &Beacon) -> Result<(), BackendError> {
        let _ = self.beacons.send((self.api_key.clone(), beacon.clone()));
        Ok(())
    }
}

#[derive(Debug)]
pub struct CollectedRequest {
    pub method: String,
    pub path_and_query: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// In-process HTTP collector answering every request with a fixed status.
pub struct TestCollector {
    pub url: Url,
    pub requests: mpsc::UnboundedReceiver<CollectedRequest>,
    handle: JoinHandle<()>,
}

impl TestCollector {
    pub async fn spawn(status: StatusCode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let tx = tx.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let header = |name: HeaderName| {
                                parts
                                    .headers
                                    .get(name)
                                    .and_then(|value| value.to_str().ok())
                                    .map(str::to_string)
                            };
                            let collected = CollectedRequest {
                                method: parts.method.to_string(),
                                path_and_query: parts
                                    .uri
                                    .path_and_query()
                                    .map(|pq| pq.to_string())
                                    .unwrap_or_default(),
                                authorization: header(AUTHORIZATION),
                                content_type: header(CONTENT_TYPE),
                                body: String::from_utf8_lossy(&body.collect().await?.to_bytes())
                                    .into_owned(),
                            };
                            let _ = tx.send(collected);

                            let mut response = Response::new(Empty::<Bytes>::new());
                            *response.status_mut() = status;
                            Ok::<_, hyper::Error>(response)
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        TestCollector {
            url: Url::parse(&format!("http://{addr}/beacon")).unwrap(),
            requests: rx,
            handle,
        }
    }
}

impl Drop for TestCollector {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
