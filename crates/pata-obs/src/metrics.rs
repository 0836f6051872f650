use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Mutex, RwLock};

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

static SERVICE_NAME: OnceCell<String> = OnceCell::new();
static PROCESS_START: OnceCell<Instant> = OnceCell::new();
static REGISTRY: Lazy<RwLock<Vec<Arc<CounterVec>>>> = Lazy::new(Default::default);

pub(crate) fn init(service: &str) {
    SERVICE_NAME.get_or_init(|| service.to_string());
    PROCESS_START.get_or_init(Instant::now);
}

pub fn service_name() -> Option<&'static str> {
    SERVICE_NAME.get().map(String::as_str)
}

/// A monotonically increasing counter partitioned by label values.
pub struct CounterVec {
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
    values: Mutex<BTreeMap<Vec<String>, u64>>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[&str], by: u64) {
        debug_assert_eq!(labels.len(), self.label_names.len(), "{}", self.name);
        let key = labels.iter().map(|label| label.to_string()).collect();
        *self.values.lock().entry(key).or_insert(0) += by;
    }

    pub fn get(&self, labels: &[&str]) -> u64 {
        let key: Vec<String> = labels.iter().map(|label| label.to_string()).collect();
        self.values.lock().get(&key).copied().unwrap_or(0)
    }

    fn encode(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} counter", self.name);
        for (labels, value) in self.values.lock().iter() {
            let rendered: Vec<String> = self
                .label_names
                .iter()
                .zip(labels)
                .map(|(name, value)| format!("{name}=\"{}\"", escape_label(value)))
                .collect();
            let _ = writeln!(out, "{}{{{}}} {}", self.name, rendered.join(","), value);
        }
    }
}

/// Register a counter family, returning the existing one if `name` is taken.
pub fn register_counter(
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
) -> Arc<CounterVec> {
    let mut registry = REGISTRY.write();
    if let Some(existing) = registry.iter().find(|counter| counter.name == name) {
        return existing.clone();
    }
    let counter = Arc::new(CounterVec {
        name,
        help,
        label_names,
        values: Mutex::new(BTreeMap::new()),
    });
    registry.push(counter.clone());
    counter
}

/// Authentication outcomes, labelled by protocol and outcome.
pub fn auth_decisions_total() -> Arc<CounterVec> {
    static COUNTER: Lazy<Arc<CounterVec>> = Lazy::new(|| {
        register_counter(
            "pata_auth_decisions_total",
            "Authentication decisions by protocol and outcome",
            &["protocol", "outcome"],
        )
    });
    COUNTER.clone()
}

pub fn http_requests_total() -> Arc<CounterVec> {
    static COUNTER: Lazy<Arc<CounterVec>> = Lazy::new(|| {
        register_counter(
            "http_requests_total",
            "HTTP requests by matched route and status code",
            &["route", "code"],
        )
    });
    COUNTER.clone()
}

pub fn encode_prometheus() -> String {
    let mut out = String::new();
    if let Some(start) = PROCESS_START.get() {
        let _ = writeln!(out, "# HELP process_uptime_seconds Service uptime in seconds");
        let _ = writeln!(out, "# TYPE process_uptime_seconds gauge");
        let _ = writeln!(
            out,
            "process_uptime_seconds{{service=\"{}\"}} {:.3}",
            escape_label(service_name().unwrap_or("unknown")),
            start.elapsed().as_secs_f64()
        );
    }
    for counter in REGISTRY.read().iter() {
        counter.encode(&mut out);
    }
    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_label_set() {
        let counter = register_counter("test_counter_total", "test", &["protocol", "outcome"]);
        counter.inc(&["access", "allow"], 1);
        counter.inc(&["access", "allow"], 2);
        counter.inc(&["app", "deny"], 1);

        assert_eq!(counter.get(&["access", "allow"]), 3);
        assert_eq!(counter.get(&["app", "deny"]), 1);
        assert_eq!(counter.get(&["app", "allow"]), 0);

        let same = register_counter("test_counter_total", "ignored", &["protocol", "outcome"]);
        assert!(Arc::ptr_eq(&counter, &same));
    }

    #[test]
    fn prometheus_output_escapes_labels() {
        let counter = register_counter("test_escape_total", "escape test", &["route"]);
        counter.inc(&["/a\"b"], 1);

        let encoded = encode_prometheus();
        assert!(encoded.contains("# TYPE test_escape_total counter"));
        assert!(encoded.contains("test_escape_total{route=\"/a\\\"b\"} 1"));
    }
}
