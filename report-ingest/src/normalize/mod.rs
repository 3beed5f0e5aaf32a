//! Per-kind report normalizers.
//!
//! Every normalizer turns a loosely structured report into a [`Normalized`]
//! record: the page the report is about, a title from the closed
//! [`ReportTitle`] set and a one-line message. Missing fields degrade to empty
//! strings; a normalizer never fails.
//!
//! Two report layouts are understood:
//!
//! - Reporting API (`application/reports+json`): `{"type", "url", "body": {..}}`.
//!   Fields are read from `body` first, then from the top level.
//! - Legacy (`application/csp-report` and friends): the fields are nested under
//!   a marker key such as `csp-report`.
//!
//! Field names are accepted in both the legacy kebab-case and the Reporting
//! API camelCase spelling.

pub mod text;

use crate::classify::ReportKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Human readable report names, one per supported kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportTitle {
    #[serde(rename = "CSP Violation")]
    Csp,
    #[serde(rename = "Network Error")]
    NetworkError,
    #[serde(rename = "Deprecation")]
    Deprecation,
    #[serde(rename = "Intervention")]
    Intervention,
    #[serde(rename = "Crash")]
    Crash,
    #[serde(rename = "Feature Policy Violation")]
    FeaturePolicy,
    #[serde(rename = "XSS Audit")]
    Xss,
    #[serde(rename = "Expect-CT Failure")]
    ExpectCt,
}

impl ReportTitle {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReportTitle::Csp => "CSP Violation",
            ReportTitle::NetworkError => "Network Error",
            ReportTitle::Deprecation => "Deprecation",
            ReportTitle::Intervention => "Intervention",
            ReportTitle::Crash => "Crash",
            ReportTitle::FeaturePolicy => "Feature Policy Violation",
            ReportTitle::Xss => "XSS Audit",
            ReportTitle::ExpectCt => "Expect-CT Failure",
        }
    }
}

/// Extra fields attached when full reports are enabled.
///
/// Script-level reports fill the location fields; every other kind only
/// carries the raw report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// The inbound report, re-serialized as JSON.
    pub raw: String,
}

/// Output of a normalizer, before it is stamped with the capture time.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalized {
    pub url: Option<String>,
    pub title: ReportTitle,
    pub message: String,
    pub detail: Option<DetailPayload>,
}

/// The record carried, JSURL-encoded, in the `err` field of a beacon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
    pub schema_version: u32,
    pub title: ReportTitle,
    /// Capture time in epoch milliseconds, base 36.
    pub date_token: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailPayload>,
}

impl NormalizedError {
    pub const SCHEMA_VERSION: u32 = 0;

    pub fn new(normalized: Normalized, capture_time: SystemTime) -> Self {
        NormalizedError {
            schema_version: Self::SCHEMA_VERSION,
            title: normalized.title,
            date_token: date_token(capture_time),
            message: normalized.message,
            detail: normalized.detail,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Attach a [`DetailPayload`] to every record that supports one.
    pub include_full_report: bool,
}

/// Milliseconds since the epoch; times before the epoch clamp to zero.
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// [`epoch_millis`] of `time` in lowercase base 36.
pub fn date_token(time: SystemTime) -> String {
    to_base36(epoch_millis(time))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.iter().rev().map(|&d| d as char).collect()
}

/// Runs the normalizer for `kind`. Returns `None` for [`ReportKind::Unknown`].
pub fn normalize(
    kind: ReportKind,
    report: &Value,
    options: NormalizeOptions,
) -> Option<Normalized> {
    let fields = match kind.legacy_marker() {
        Some(marker) if report.get(marker).is_some() => Fields::legacy(report, marker),
        _ => Fields::typed(report),
    };

    let normalized = match kind {
        ReportKind::Csp => csp(&fields, options),
        ReportKind::NetworkError => network_error(&fields, options),
        ReportKind::Deprecation => deprecation(&fields, options),
        ReportKind::Intervention => intervention(&fields, options),
        ReportKind::Crash => crash(&fields, options),
        ReportKind::FeaturePolicy => feature_policy(&fields, options),
        ReportKind::Xss => xss(&fields, options),
        ReportKind::ExpectCt => expect_ct(&fields),
        ReportKind::Unknown => return None,
    };

    if normalized.message.is_empty() {
        tracing::debug!(
            kind = kind.as_str(),
            "report is missing the fields its message is built from"
        );
    }
    Some(normalized)
}

fn csp(fields: &Fields<'_>, options: NormalizeOptions) -> Normalized {
    let directive = fields
        .non_empty_string(&["effective-directive", "effectiveDirective"])
        .unwrap_or_else(|| fields.string(&["violated-directive", "violatedDirective"]));
    let blocked_uri = fields.string(&["blocked-uri", "blockedURL", "blockedURI"]);

    let directive = text::directive_name(&directive);
    let host = text::blocked_host(&blocked_uri);
    let message = match (directive.is_empty(), host.is_empty()) {
        (false, false) => format!("{directive}: {host}"),
        (false, true) => directive.to_string(),
        (true, _) => host.to_string(),
    };

    Normalized {
        url: fields
            .non_empty_string(&["document-uri", "documentURL", "documentURI"])
            .or_else(|| fields.root_string("url")),
        title: ReportTitle::Csp,
        message: text::single_line(&message),
        detail: fields.raw_detail(options),
    }
}

fn network_error(fields: &Fields<'_>, options: NormalizeOptions) -> Normalized {
    let message = text::join_present([
        fields.body_string("type").as_str(),
        fields.string(&["protocol"]).as_str(),
        fields.string(&["method"]).as_str(),
        fields.string(&["status_code", "statusCode"]).as_str(),
    ]);

    Normalized {
        url: fields.root_string("url"),
        title: ReportTitle::NetworkError,
        message: text::single_line(&message),
        detail: fields.raw_detail(options),
    }
}

fn deprecation(fields: &Fields<'_>, options: NormalizeOptions) -> Normalized {
    let message = text::join_present([
        fields.string(&["id"]).as_str(),
        fields.string(&["anticipatedRemoval", "anticipated-removal"]).as_str(),
    ]);

    Normalized {
        url: fields.root_string("url"),
        title: ReportTitle::Deprecation,
        message: text::single_line(&message),
        detail: fields.script_detail(options),
    }
}

fn intervention(fields: &Fields<'_>, options: NormalizeOptions) -> Normalized {
    Normalized {
        url: fields.root_string("url"),
        title: ReportTitle::Intervention,
        message: text::single_line(&fields.string(&["id"])),
        detail: fields.script_detail(options),
    }
}

fn crash(fields: &Fields<'_>, options: NormalizeOptions) -> Normalized {
    Normalized {
        url: fields.root_string("url"),
        title: ReportTitle::Crash,
        message: text::single_line(&fields.string(&["reason"])),
        detail: fields.raw_detail(options),
    }
}

fn feature_policy(fields: &Fields<'_>, options: NormalizeOptions) -> Normalized {
    Normalized {
        url: fields.root_string("url"),
        title: ReportTitle::FeaturePolicy,
        message: text::single_line(&fields.string(&["policyId", "featureId", "policy-id"])),
        detail: fields.raw_detail(options),
    }
}

fn xss(fields: &Fields<'_>, options: NormalizeOptions) -> Normalized {
    let request_url = fields.string(&["request-url", "requestUrl", "requestURL"]);

    Normalized {
        url: None,
        title: ReportTitle::Xss,
        message: text::single_line(text::strip_scheme(&request_url)),
        detail: fields.raw_detail(options),
    }
}

fn expect_ct(fields: &Fields<'_>) -> Normalized {
    Normalized {
        url: None,
        title: ReportTitle::ExpectCt,
        message: text::single_line(&fields.string(&["hostname"])),
        detail: None,
    }
}

/// Defensive accessor over a report and the object holding its fields.
struct Fields<'a> {
    root: &'a Value,
    body: Option<&'a Value>,
}

impl<'a> Fields<'a> {
    fn typed(report: &'a Value) -> Self {
        Fields {
            root: report,
            body: report.get("body"),
        }
    }

    fn legacy(report: &'a Value, marker: &str) -> Self {
        Fields {
            root: report,
            body: report.get(marker),
        }
    }

    fn lookup(&self, names: &[&str]) -> Option<&'a Value> {
        self.body
            .into_iter()
            .chain(std::iter::once(self.root))
            .find_map(|object| names.iter().find_map(|name| object.get(*name)))
    }

    /// Field rendered as text; numbers and booleans are stringified, anything
    /// else (absent, null, objects) is empty.
    fn string(&self, names: &[&str]) -> String {
        self.lookup(names).map(value_to_string).unwrap_or_default()
    }

    /// Like [`Fields::string`], without the top-level fallback. For names such
    /// as `type` that mean something else on the envelope.
    fn body_string(&self, name: &str) -> String {
        self.body
            .and_then(|body| body.get(name))
            .map(value_to_string)
            .unwrap_or_default()
    }

    fn non_empty_string(&self, names: &[&str]) -> Option<String> {
        Some(self.string(names)).filter(|s| !s.is_empty())
    }

    fn root_string(&self, name: &str) -> Option<String> {
        self.root
            .get(name)
            .map(value_to_string)
            .filter(|s| !s.is_empty())
    }

    fn number(&self, names: &[&str]) -> Option<u64> {
        match self.lookup(names)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn raw_detail(&self, options: NormalizeOptions) -> Option<DetailPayload> {
        options.include_full_report.then(|| DetailPayload {
            raw: self.root.to_string(),
            ..Default::default()
        })
    }

    fn script_detail(&self, options: NormalizeOptions) -> Option<DetailPayload> {
        options.include_full_report.then(|| DetailPayload {
            line_number: self.number(&["lineNumber", "line-number"]),
            column_number: self.number(&["columnNumber", "column-number"]),
            source_file: self.non_empty_string(&["sourceFile", "source-file"]),
            raw: self.root.to_string(),
        })
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
