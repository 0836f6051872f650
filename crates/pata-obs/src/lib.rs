use std::{
    fmt, io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Number, Value};
use tracing::{field::Visit, span};
use tracing_subscriber::{
    fmt::{self as tsfmt, format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    layer::{Context, Layer, SubscriberExt},
    registry::{LookupSpan, SpanRef},
    EnvFilter, Registry,
};

mod metrics;

pub use metrics::{
    auth_decisions_total, encode_prometheus as encode_prometheus_metrics, http_requests_total,
    register_counter, service_name, CounterVec, PROMETHEUS_CONTENT_TYPE,
};

#[derive(Debug, thiserror::Error)]
pub enum ObsInitError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Initialize observability for a service.
pub struct ObsInit;

impl ObsInit {
    /// Install the global JSON subscriber and record the service name for
    /// metrics.
    pub fn init(service: &str) -> Result<(), ObsInitError> {
        let subscriber = Self::subscriber_with_writer(service, io::stderr);
        tracing::subscriber::set_global_default(subscriber).map_err(|err| {
            if tracing::dispatcher::has_been_set() {
                ObsInitError::AlreadyInitialized
            } else {
                ObsInitError::Install(err)
            }
        })
    }

    /// Build the subscriber without installing it.
    pub fn subscriber_with_writer<W>(service: &str, writer: W) -> impl tracing::Subscriber
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        metrics::init(service);
        let env_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(env_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = tsfmt::layer()
            .with_ansi(false)
            .event_format(ObsJsonFormat {
                service: Arc::from(service),
            })
            .with_writer(writer);

        Registry::default()
            .with(env_filter)
            .with(TraceLayer)
            .with(fmt_layer)
    }
}

/// `/health` and `/info` routes, plus their `/v1` aliases.
pub fn health_router(service: &'static str) -> Router {
    let health = get(move || async move { Json(json!({ "status": "ok", "service": service })) });
    let info = get(move || async move {
        Json(json!({ "service": service, "version": env!("CARGO_PKG_VERSION") }))
    });

    Router::new()
        .route("/health", health.clone())
        .route("/v1/health", health)
        .route("/info", info.clone())
        .route("/v1/info", info)
}

/// Request scoped metadata on spans.
pub trait SpanExt {
    /// Attach a request identifier; events inside the span will carry it.
    fn with_req(&self, request_id: &str);

    fn trace_id(&self) -> Option<String>;
}

impl SpanExt for tracing::Span {
    fn with_req(&self, request_id: &str) {
        self.with_subscriber(|(id, dispatch)| {
            if let Some(span) = dispatch
                .downcast_ref::<Registry>()
                .and_then(|registry| registry.span(id))
            {
                span.extensions_mut()
                    .replace(RequestId(request_id.to_string()));
            }
        });
    }

    fn trace_id(&self) -> Option<String> {
        self.with_subscriber(|(id, dispatch)| {
            dispatch
                .downcast_ref::<Registry>()
                .and_then(|registry| registry.span(id))
                .and_then(|span| span_ids(span).0)
        })
        .flatten()
    }
}

#[derive(Clone)]
struct TraceId(String);

#[derive(Clone)]
struct RequestId(String);

static NEXT_TRACE: AtomicU64 = AtomicU64::new(1);

/// Gives every root span a fresh trace id and lets children inherit it.
struct TraceLayer;

impl<S> Layer<S> for TraceLayer
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let inherited = span
            .parent()
            .and_then(|parent| parent.extensions().get::<TraceId>().cloned());
        let trace_id = inherited.unwrap_or_else(|| {
            TraceId(format!(
                "{:016x}",
                NEXT_TRACE.fetch_add(1, Ordering::Relaxed)
            ))
        });
        span.extensions_mut().insert(trace_id);
    }
}

fn span_ids<S>(span: SpanRef<'_, S>) -> (Option<String>, Option<String>)
where
    S: for<'span> LookupSpan<'span>,
{
    let mut trace_id = None;
    let mut request_id = None;
    for scope_span in span.scope() {
        let extensions = scope_span.extensions();
        if trace_id.is_none() {
            trace_id = extensions.get::<TraceId>().map(|id| id.0.clone());
        }
        if request_id.is_none() {
            request_id = extensions.get::<RequestId>().map(|id| id.0.clone());
        }
    }
    (trace_id, request_id)
}

struct ObsJsonFormat {
    service: Arc<str>,
}

impl<S, N> FormatEvent<S, N> for ObsJsonFormat
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let mut visitor = JsonFieldVisitor::default();
        event.record(&mut visitor);

        let (trace_id, request_id) = ctx.lookup_current().map(span_ids).unwrap_or_default();

        let line = json!({
            "level": metadata.level().as_str().to_ascii_lowercase(),
            "target": metadata.target(),
            "service": &*self.service,
            "trace_id": trace_id,
            "request_id": request_id,
            "fields": Value::Object(visitor.fields),
        });
        writeln!(writer, "{line}")
    }
}

#[derive(Default)]
struct JsonFieldVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonFieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.fields.insert(field.name().to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Mutex, Once};
    use tracing::subscriber::with_default;

    static INIT: Once = Once::new();

    fn init_global() {
        INIT.call_once(|| {
            ObsInit::init("test-service").expect("init failed");
        });
    }

    #[test]
    fn init_is_idempotent() {
        init_global();
        assert!(matches!(
            ObsInit::init("test"),
            Err(ObsInitError::AlreadyInitialized)
        ));
    }

    #[test]
    fn json_logs_include_trace_and_request() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = ObsInit::subscriber_with_writer("svc", TestMakeWriter(buffer.clone()));

        with_default(subscriber, || {
            let span = tracing::info_span!("request_span");
            let _guard = span.enter();
            span.with_req("req-123");
            assert!(span.trace_id().is_some());
            tracing::info!(decision = "deny", attempts = 2u64, "hello world");
        });

        let output = {
            let guard = buffer.lock().unwrap();
            String::from_utf8(guard.clone()).expect("valid utf8")
        };
        let line: Value = serde_json::from_str(output.lines().last().expect("a log line"))
            .expect("json log line");

        assert_eq!(line["service"], "svc");
        assert_eq!(line["level"], "info");
        assert_eq!(line["request_id"], "req-123");
        assert!(line["trace_id"].is_string());
        assert_eq!(line["fields"]["message"], "hello world");
        assert_eq!(line["fields"]["decision"], "deny");
        assert_eq!(line["fields"]["attempts"], 2);
    }

    #[test]
    fn child_spans_share_the_parent_trace() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = ObsInit::subscriber_with_writer("svc", TestMakeWriter(buffer));

        with_default(subscriber, || {
            let parent = tracing::info_span!("parent");
            let _outer = parent.enter();
            let child = tracing::info_span!("child");
            assert_eq!(parent.trace_id(), child.trace_id());

            let other = tracing::info_span!(parent: None, "other_root");
            assert_ne!(parent.trace_id(), other.trace_id());
        });
    }

    #[derive(Clone)]
    struct TestMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for TestMakeWriter {
        type Writer = TestWriter;

        fn make_writer(&'a self) -> Self::Writer {
            TestWriter(self.0.clone())
        }
    }

    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl io::Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
