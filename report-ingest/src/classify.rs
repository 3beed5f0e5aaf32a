//! Maps an inbound report onto the closed set of kinds the relay understands.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Csp,
    NetworkError,
    Deprecation,
    Intervention,
    Crash,
    FeaturePolicy,
    Xss,
    ExpectCt,
    /// A report shape no normalizer recognizes, e.g. a kind introduced by a
    /// newer browser. Handled, but produces no error field.
    Unknown,
}

/// Marker keys of the pre-Reporting-API report formats, in the order they
/// are checked.
pub const CSP_REPORT_MARKER: &str = "csp-report";
pub const XSS_REPORT_MARKER: &str = "xss-report";
pub const EXPECT_CT_REPORT_MARKER: &str = "expect-ct-report";

impl ReportKind {
    /// Kind named by a Reporting API `type` discriminator.
    pub fn from_type(ty: &str) -> Option<Self> {
        let kind = match ty {
            "csp-violation" | "csp" => ReportKind::Csp,
            "network-error" => ReportKind::NetworkError,
            "deprecation" => ReportKind::Deprecation,
            "intervention" => ReportKind::Intervention,
            "crash" => ReportKind::Crash,
            "feature-policy-violation"
            | "permissions-policy-violation"
            | "document-policy-violation" => ReportKind::FeaturePolicy,
            _ => return None,
        };
        Some(kind)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Csp => "csp",
            ReportKind::NetworkError => "network-error",
            ReportKind::Deprecation => "deprecation",
            ReportKind::Intervention => "intervention",
            ReportKind::Crash => "crash",
            ReportKind::FeaturePolicy => "feature-policy",
            ReportKind::Xss => "xss",
            ReportKind::ExpectCt => "expect-ct",
            ReportKind::Unknown => "unknown",
        }
    }

    /// Key under which the legacy format nests the report fields.
    pub const fn legacy_marker(&self) -> Option<&'static str> {
        match self {
            ReportKind::Csp => Some(CSP_REPORT_MARKER),
            ReportKind::Xss => Some(XSS_REPORT_MARKER),
            ReportKind::ExpectCt => Some(EXPECT_CT_REPORT_MARKER),
            _ => None,
        }
    }
}

/// Determines the kind of `report`.
///
/// An explicit `type` discriminator wins. A missing or unrecognized `type`
/// falls back to the legacy marker keys; anything else is
/// [`ReportKind::Unknown`].
pub fn classify(report: &Value) -> ReportKind {
    let Some(object) = report.as_object() else {
        return ReportKind::Unknown;
    };

    if let Some(kind) = object
        .get("type")
        .and_then(Value::as_str)
        .and_then(ReportKind::from_type)
    {
        return kind;
    }

    [ReportKind::Csp, ReportKind::Xss, ReportKind::ExpectCt]
        .into_iter()
        .find(|kind| {
            kind.legacy_marker()
                .is_some_and(|marker| object.contains_key(marker))
        })
        .unwrap_or(ReportKind::Unknown)
}
