/// W3C Trace Context header names used for context propagation
/// to the Dremio server.
pub struct ContextPropagationHeader;

impl ContextPropagationHeader {
    pub const TRACEPARENT: &'static str = "traceparent";
}

/// Common span attribute names.
/// The name either follow the OpenTelemetry semantic conventions,
/// or is specific to the Dremio provider.
pub struct SpanAttribute;

impl SpanAttribute {
    pub const SPAN_KIND: &'static str = "span.kind";
    pub const SPAN_STATUS_CODE: &'static str = "span.status_code";
    pub const SPAN_STATUS_DESCRIPTION: &'static str = "span.status_description";
    pub const HTTP_REQUEST_METHOD: &'static str = "http.request.method";
    pub const HTTP_RESPONSE_STATUS_CODE: &'static str = "http.response.status_code";
    pub const URL_PATH: &'static str = "url.path";
    pub const DREMIO_CONNECTION_ID: &'static str = "dremio.connection.id";
    pub const DREMIO_POLL_SUBJECT: &'static str = "dremio.poll.subject";
    pub const DREMIO_POLL_INTERVAL_SECS: &'static str = "dremio.poll.interval_secs";
    pub const DREMIO_POLL_TIMEOUT_SECS: &'static str = "dremio.poll.timeout_secs";
}

/// The OpenTelemetry span kinds.
pub struct SpanKind;

impl SpanKind {
    pub const CLIENT: &'static str = "client";
    pub const INTERNAL: &'static str = "internal";
}

/// The OpenTelemetry span status codes.
pub struct SpanStatusCode;

impl SpanStatusCode {
    pub const OK: &'static str = "ok";
    pub const ERROR: &'static str = "error";
}
