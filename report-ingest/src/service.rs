use crate::backend::{Backend, Session};
use crate::batch;
use crate::beacon::{Beacon, RequestContext};
use crate::config::Config;
use crate::errors::{IngestError, Result};
use crate::metrics_defs::{BEACONS_FAILED, BEACONS_SENT, REQUEST_DURATION, REQUESTS_REJECTED};
use crate::normalize::NormalizeOptions;
use crate::tenants::{CredentialTable, SessionCache};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use shared::http::{PeerAddr, ResponseBody, empty_body, full_body};
use shared::routing::{Route, RouteActions};
use shared::{counter, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "application/csp-report",
    "application/reports+json",
    "application/expect-ct-report+json",
    "application/expect-ct-report",
    "application/json",
];

const ALLOW_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, Content-Length, X-Requested-With";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RouteAction {
    Preflight,
    Report,
    MissingApiKey,
    MethodNotAllowed,
}

/// Accepts browser reports on `POST /report/{api_key}` and forwards one
/// beacon per report to the tenant's backend session.
#[derive(Clone)]
pub struct ReportService {
    inner: Arc<Inner>,
}

struct Inner {
    routes: RouteActions<RouteAction>,
    credentials: CredentialTable,
    sessions: SessionCache,
    options: NormalizeOptions,
    max_body_size: usize,
}

impl ReportService {
    pub fn new(config: &Config, backend: Arc<dyn Backend>) -> Self {
        let routes = RouteActions::new(vec![
            Route::new(Some(Method::OPTIONS), None, RouteAction::Preflight),
            Route::new(Some(Method::POST), Some("/report/{api_key}"), RouteAction::Report),
            Route::new(Some(Method::POST), Some("/report"), RouteAction::MissingApiKey),
            Route::new(None, Some("/report/{api_key}"), RouteAction::MethodNotAllowed),
            Route::new(None, Some("/report"), RouteAction::MethodNotAllowed),
        ]);

        ReportService {
            inner: Arc::new(Inner {
                routes,
                credentials: CredentialTable::new(config.tenants.clone()),
                sessions: SessionCache::new(backend),
                options: NormalizeOptions {
                    include_full_report: config.include_full_report,
                },
                max_body_size: config.max_body_size,
            }),
        }
    }

    /// Handles one request. Failures are rendered as JSON error responses, so
    /// this never fails.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();

        let mut response = match self.inner.dispatch(request).await {
            Ok(response) => response,
            Err(error) => {
                counter!(REQUESTS_REJECTED, "reason" => error.reason()).increment(1);
                tracing::debug!(error = %error, "rejected report request");
                error_response(&error)
            }
        };

        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

        histogram!(REQUEST_DURATION, "status" => response.status().as_u16().to_string())
            .record(start.elapsed().as_secs_f64());

        response
    }
}

impl Inner {
    async fn dispatch<B>(&self, request: Request<B>) -> Result<Response<ResponseBody>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (action, api_key) = match self.routes.resolve(&request) {
            Some(route_match) => (
                *route_match.action,
                route_match.param("api_key").map(str::to_string),
            ),
            None => return Err(IngestError::NoRouteMatched),
        };

        match action {
            RouteAction::Preflight => Ok(preflight_response()),
            RouteAction::Report => {
                let api_key = api_key.ok_or(IngestError::MissingApiKey)?;
                self.report(&api_key, request).await
            }
            RouteAction::MissingApiKey => Err(IngestError::MissingApiKey),
            RouteAction::MethodNotAllowed => Err(IngestError::MethodNotAllowed),
        }
    }

    async fn report<B>(&self, api_key: &str, request: Request<B>) -> Result<Response<ResponseBody>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let secret = self
            .credentials
            .lookup(api_key)
            .ok_or(IngestError::UnknownApiKey)?;
        check_content_type(request.headers())?;

        let peer_addr = request.extensions().get::<PeerAddr>().map(|peer| peer.0);
        let context = RequestContext::from_headers(request.headers(), peer_addr, SystemTime::now());

        let body = read_body(request.into_body(), self.max_body_size).await?;
        let payload = batch::parse_body(&body)?;

        let session = self
            .sessions
            .get_or_init(api_key, secret)
            .await
            .map_err(IngestError::SessionUnavailable)?;

        let beacons = batch::process(payload, &context, self.options);
        let handled = beacons.len();
        for beacon in beacons {
            deliver(session.clone(), beacon);
        }

        tracing::debug!(api_key, handled, "handled report request");
        Ok(json_response(
            StatusCode::OK,
            &json!({"success": true, "handled": handled}),
        ))
    }
}

impl Service<Request<Incoming>> for ReportService {
    type Response = Response<ResponseBody>;
    type Error = IngestError;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, request: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(request).await) })
    }
}

/// Media type parameters such as `charset` are ignored.
fn check_content_type(headers: &HeaderMap) -> Result<()> {
    let media_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if ACCEPTED_CONTENT_TYPES.contains(&media_type.as_str()) {
        Ok(())
    } else {
        Err(IngestError::UnsupportedContentType(media_type))
    }
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(error) if error.downcast_ref::<LengthLimitError>().is_some() => {
            Err(IngestError::BodyTooLarge(limit))
        }
        Err(error) => Err(IngestError::RequestBodyError(error.to_string())),
    }
}

/// Sends in the background; the caller never sees delivery failures.
fn deliver(session: Arc<dyn Session>, beacon: Beacon) {
    tokio::spawn(async move {
        match session.send(&beacon).await {
            Ok(()) => counter!(BEACONS_SENT).increment(1),
            Err(error) => {
                counter!(BEACONS_FAILED).increment(1);
                tracing::warn!(error = %error, "failed to deliver beacon");
            }
        }
    });
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<ResponseBody> {
    let mut response = Response::new(full_body(value.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(error: &IngestError) -> Response<ResponseBody> {
    json_response(
        error.status_code(),
        &json!({"success": false, "error": error.to_string()}),
    )
}

fn preflight_response() -> Response<ResponseBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}
