use shared::metrics_defs::{MetricDef, MetricType};

pub const REPORTS_HANDLED: MetricDef = MetricDef {
    name: "reports.handled",
    metric_type: MetricType::Counter,
    description: "Reports turned into beacons. Tagged with kind.",
};

pub const REQUESTS_REJECTED: MetricDef = MetricDef {
    name: "requests.rejected",
    metric_type: MetricType::Counter,
    description: "Requests refused before normalization. Tagged with reason.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status.",
};

pub const BEACONS_SENT: MetricDef = MetricDef {
    name: "beacons.sent",
    metric_type: MetricType::Counter,
    description: "Beacons accepted by the analytics backend",
};

pub const BEACONS_FAILED: MetricDef = MetricDef {
    name: "beacons.failed",
    metric_type: MetricType::Counter,
    description: "Beacons the analytics backend could not accept",
};

pub const SESSIONS_CREATED: MetricDef = MetricDef {
    name: "sessions.created",
    metric_type: MetricType::Counter,
    description: "Backend sessions opened for a tenant",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REPORTS_HANDLED,
    REQUESTS_REJECTED,
    REQUEST_DURATION,
    BEACONS_SENT,
    BEACONS_FAILED,
    SESSIONS_CREATED,
];
