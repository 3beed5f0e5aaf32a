//! Splits a request body into reports and turns each into a beacon.

use crate::beacon::{Beacon, RequestContext, assemble};
use crate::classify::{ReportKind, classify};
use crate::errors::{IngestError, Result};
use crate::metrics_defs::REPORTS_HANDLED;
use crate::normalize::{NormalizeOptions, normalize};
use serde_json::Value;
use shared::counter;

/// Parses a request body into a report or a list of reports.
///
/// A body holding only whitespace or a JSON `null` counts as empty. Other
/// scalars are rejected.
pub fn parse_body(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::EmptyBody);
    }

    match serde_json::from_slice(body)? {
        Value::Null => Err(IngestError::EmptyBody),
        payload @ (Value::Object(_) | Value::Array(_)) => Ok(payload),
        _ => Err(IngestError::NotAReport),
    }
}

/// Produces one beacon per report, in input order.
///
/// A top-level array is a batch; any other value is a batch of one. Every
/// element is handled, including reports of an unknown kind.
pub fn process(payload: Value, context: &RequestContext, options: NormalizeOptions) -> Vec<Beacon> {
    match payload {
        Value::Array(reports) => reports
            .iter()
            .map(|report| process_report(report, context, options))
            .collect(),
        report => vec![process_report(&report, context, options)],
    }
}

fn process_report(report: &Value, context: &RequestContext, options: NormalizeOptions) -> Beacon {
    let kind = classify(report);
    counter!(REPORTS_HANDLED, "kind" => kind.as_str()).increment(1);

    if kind == ReportKind::Unknown {
        tracing::debug!(%report, "report of unknown kind");
    }

    assemble(context, normalize(kind, report, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsurl;
    use crate::normalize::{NormalizedError, ReportTitle};
    use serde_json::json;
    use std::time::{Duration, UNIX_EPOCH};

    fn context() -> RequestContext {
        RequestContext {
            user_agent: "Mozilla/5.0".into(),
            client_ip: "198.51.100.1".into(),
            capture_time: UNIX_EPOCH + Duration::from_millis(1_700_000_000_000),
        }
    }

    fn decode(beacon: &Beacon) -> NormalizedError {
        let mut records: Vec<NormalizedError> =
            jsurl::from_str(beacon.err.as_deref().unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        records.remove(0)
    }

    #[test]
    fn test_parse_body() {
        assert!(matches!(parse_body(b""), Err(IngestError::EmptyBody)));
        assert!(matches!(parse_body(b" \n\t"), Err(IngestError::EmptyBody)));
        assert!(matches!(
            parse_body(b"{not json"),
            Err(IngestError::InvalidJson(_))
        ));
        assert_eq!(parse_body(b"[]").unwrap(), json!([]));
        assert_eq!(parse_body(b"{}").unwrap(), json!({}));
    }

    #[test]
    fn test_parse_body_rejects_null_and_scalars() {
        assert!(matches!(parse_body(b"null"), Err(IngestError::EmptyBody)));
        assert!(matches!(parse_body(b" null\n"), Err(IngestError::EmptyBody)));
        assert!(matches!(parse_body(b"42"), Err(IngestError::NotAReport)));
        assert!(matches!(parse_body(br#""x""#), Err(IngestError::NotAReport)));
        assert!(matches!(parse_body(b"true"), Err(IngestError::NotAReport)));
    }

    #[test]
    fn test_single_legacy_report() {
        let payload = json!({
            "csp-report": {
                "document-uri": "https://example.com/",
                "violated-directive": "script-src 'self'",
                "blocked-uri": "https://evil.com/x.js"
            }
        });

        let beacons = process(payload, &context(), NormalizeOptions::default());
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].u.as_deref(), Some("https://example.com/"));
        assert_eq!(beacons[0].ua, "Mozilla/5.0");
        assert_eq!(beacons[0].ip, "198.51.100.1");

        let record = decode(&beacons[0]);
        assert_eq!(record.title, ReportTitle::Csp);
        assert_eq!(record.message, "script-src: evil.com");
    }

    #[test]
    fn test_batch_with_unknown_kind() {
        let payload = json!([
            {
                "type": "crash",
                "url": "https://example.com/page",
                "body": {"reason": "oom"}
            },
            {"type": "totally-new-kind"}
        ]);

        let beacons = process(payload, &context(), NormalizeOptions::default());
        assert_eq!(beacons.len(), 2);

        assert_eq!(beacons[0].u.as_deref(), Some("https://example.com/page"));
        assert_eq!(decode(&beacons[0]).message, "oom");

        assert_eq!(beacons[1].u, None);
        assert_eq!(beacons[1].err, None);
        assert_eq!(beacons[1].rt_tstart, 1_700_000_000_000);
    }

    #[test]
    fn test_empty_batch() {
        let beacons = process(json!([]), &context(), NormalizeOptions::default());
        assert!(beacons.is_empty());
    }

    #[test]
    fn test_batch_preserves_order() {
        let payload = json!([
            {"type": "deprecation", "url": "https://a.com/", "body": {"id": "first"}},
            {"type": "intervention", "url": "https://b.com/", "body": {"id": "second"}},
            "not-an-object"
        ]);

        let beacons = process(payload, &context(), NormalizeOptions::default());
        assert_eq!(beacons.len(), 3);
        assert_eq!(decode(&beacons[0]).title, ReportTitle::Deprecation);
        assert_eq!(decode(&beacons[1]).title, ReportTitle::Intervention);
        assert_eq!(decode(&beacons[1]).message, "second");
        assert_eq!(beacons[2].err, None);
    }
}
