use crate::jsurl;
use crate::normalize::{Normalized, NormalizedError, epoch_millis};
use http::HeaderMap;
use http::header::USER_AGENT;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::SystemTime;

pub const HTTP_INITIATOR: &str = "error";

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The event sent to the analytics backend, one per inbound report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Beacon {
    #[serde(rename = "rt.tstart")]
    pub rt_tstart: u64,
    #[serde(rename = "rt.end")]
    pub rt_end: u64,
    #[serde(rename = "http.initiator")]
    pub http_initiator: &'static str,
    pub ua: String,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// Request-level data shared by every beacon of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub user_agent: String,
    pub client_ip: String,
    pub capture_time: SystemTime,
}

impl RequestContext {
    /// The client IP is the first `X-Forwarded-For` entry, falling back to
    /// the TCP peer.
    pub fn from_headers(
        headers: &HeaderMap,
        peer_addr: Option<SocketAddr>,
        capture_time: SystemTime,
    ) -> Self {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let forwarded_for = headers
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        let client_ip = match (forwarded_for, peer_addr) {
            (Some(ip), _) => ip.to_string(),
            (None, Some(addr)) => addr.ip().to_string(),
            (None, None) => String::new(),
        };

        RequestContext {
            user_agent,
            client_ip,
            capture_time,
        }
    }
}

/// Builds the beacon for one report. `normalized` is `None` for reports of an
/// unknown kind, which only carry the request context.
pub fn assemble(context: &RequestContext, normalized: Option<Normalized>) -> Beacon {
    let timestamp = epoch_millis(context.capture_time);

    let (u, err) = match normalized {
        Some(normalized) => {
            let url = normalized.url.clone();
            let record = NormalizedError::new(normalized, context.capture_time);
            (url, encode_error(record))
        }
        None => (None, None),
    };

    Beacon {
        rt_tstart: timestamp,
        rt_end: timestamp,
        http_initiator: HTTP_INITIATOR,
        ua: context.user_agent.clone(),
        ip: context.client_ip.clone(),
        u,
        err,
    }
}

/// The `err` field holds a list with exactly one record.
fn encode_error(record: NormalizedError) -> Option<String> {
    match jsurl::to_string(&[record]) {
        Ok(encoded) => Some(encoded),
        Err(error) => {
            tracing::error!(error = %error, "could not encode normalized error");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{DetailPayload, ReportTitle};
    use http::HeaderValue;
    use std::time::{Duration, UNIX_EPOCH};

    fn context() -> RequestContext {
        RequestContext {
            user_agent: "Mozilla/5.0".into(),
            client_ip: "203.0.113.7".into(),
            capture_time: UNIX_EPOCH + Duration::from_millis(1_700_000_000_000),
        }
    }

    #[test]
    fn test_context_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_static("198.51.100.1, 10.0.0.1"),
        );
        let peer: SocketAddr = "10.0.0.2:5555".parse().unwrap();

        let context = RequestContext::from_headers(&headers, Some(peer), UNIX_EPOCH);
        assert_eq!(context.user_agent, "Mozilla/5.0");
        assert_eq!(context.client_ip, "198.51.100.1");
    }

    #[test]
    fn test_context_falls_back_to_peer() {
        let peer: SocketAddr = "[2001:db8::1]:443".parse().unwrap();

        let context = RequestContext::from_headers(&HeaderMap::new(), Some(peer), UNIX_EPOCH);
        assert_eq!(context.user_agent, "");
        assert_eq!(context.client_ip, "2001:db8::1");

        let context = RequestContext::from_headers(&HeaderMap::new(), None, UNIX_EPOCH);
        assert_eq!(context.client_ip, "");
    }

    #[test]
    fn test_assemble_known_report() {
        let normalized = Normalized {
            url: Some("https://example.com/".into()),
            title: ReportTitle::Csp,
            message: "script-src: evil.com".into(),
            detail: None,
        };

        let beacon = assemble(&context(), Some(normalized));
        assert_eq!(beacon.rt_tstart, 1_700_000_000_000);
        assert_eq!(beacon.rt_end, beacon.rt_tstart);
        assert_eq!(beacon.http_initiator, "error");
        assert_eq!(beacon.ua, "Mozilla/5.0");
        assert_eq!(beacon.ip, "203.0.113.7");
        assert_eq!(beacon.u.as_deref(), Some("https://example.com/"));

        let decoded: Vec<NormalizedError> = jsurl::from_str(beacon.err.as_deref().unwrap()).unwrap();
        assert_eq!(
            decoded,
            vec![NormalizedError {
                schema_version: 0,
                title: ReportTitle::Csp,
                date_token: "loyw3v28".into(),
                message: "script-src: evil.com".into(),
                detail: None,
            }]
        );
    }

    #[test]
    fn test_assemble_unknown_report() {
        let beacon = assemble(&context(), None);
        assert_eq!(beacon.u, None);
        assert_eq!(beacon.err, None);

        let json = serde_json::to_value(&beacon).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("u"));
        assert!(!object.contains_key("err"));
        assert_eq!(object["rt.tstart"], 1_700_000_000_000u64);
        assert_eq!(object["http.initiator"], "error");
    }

    #[test]
    fn test_assemble_without_url() {
        let normalized = Normalized {
            url: None,
            title: ReportTitle::ExpectCt,
            message: "www.example.com".into(),
            detail: None,
        };

        let beacon = assemble(&context(), Some(normalized));
        assert_eq!(beacon.u, None);
        assert!(beacon.err.is_some());
    }

    #[test]
    fn test_error_field_round_trip() {
        let records = [
            NormalizedError {
                schema_version: 0,
                title: ReportTitle::Deprecation,
                date_token: "loyw3v28".into(),
                message: "WebSQL 2022-10-11".into(),
                detail: Some(DetailPayload {
                    line_number: Some(12),
                    column_number: Some(4),
                    source_file: Some("https://example.com/app.js".into()),
                    raw: r#"{"type":"deprecation","body":{"id":"WebSQL"}}"#.into(),
                }),
            },
            NormalizedError {
                schema_version: 0,
                title: ReportTitle::Xss,
                date_token: "0".into(),
                message: "example.com/search?q=<script>alert('$')</script>".into(),
                detail: Some(DetailPayload {
                    raw: "{}".into(),
                    ..Default::default()
                }),
            },
            NormalizedError {
                schema_version: 0,
                title: ReportTitle::NetworkError,
                date_token: "z".into(),
                message: String::new(),
                detail: None,
            },
        ];

        for record in records {
            let encoded = encode_error(record.clone()).unwrap();
            let decoded: Vec<NormalizedError> = jsurl::from_str(&encoded).unwrap();
            assert_eq!(decoded, vec![record]);
        }
    }

    #[test]
    fn test_absent_detail_is_omitted() {
        let record = NormalizedError {
            schema_version: 0,
            title: ReportTitle::Crash,
            date_token: "10".into(),
            message: "oom".into(),
            detail: None,
        };

        let encoded = encode_error(record).unwrap();
        assert!(encoded.starts_with("~(~("), "{encoded}");
        assert!(encoded.contains("dateToken~'10"), "{encoded}");
        assert!(encoded.contains("schemaVersion~0"), "{encoded}");
        assert!(encoded.contains("title~'Crash"), "{encoded}");
        assert!(!encoded.contains("detail"), "{encoded}");
        assert!(!encoded.contains("null"), "{encoded}");
    }
}
