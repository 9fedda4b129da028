//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Describe request metrics once at startup (name, help, labels, buckets)
//! - Hand out counter/histogram handles keyed by label values
//! - Render the Prometheus text format for the scrape endpoint
//!
//! # Design Decisions
//! - `metrics` facade with the Prometheus exporter as the only recorder
//! - Buckets are configured per histogram name before the recorder is built
//! - A registry is either process-global (`install`) or private
//!   (`isolated`); both render through the same handle type

use std::sync::Arc;

use metrics::{Counter, Histogram, Key, KeyName, Label, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), metrics::Level::INFO, Some(module_path!()));

/// Errors raised while building a metrics registry.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to build Prometheus recorder: {0}")]
    Build(#[from] BuildError),

    #[error("histogram {0} has no bucket boundaries")]
    MissingBuckets(String),
}

/// Kind of metric a descriptor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Histogram,
}

/// Static description of one metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    pub kind: MetricKind,
    pub namespace: String,
    pub subsystem: String,
    pub name: String,
    pub help: String,
    pub labels: Vec<&'static str>,
    /// Bucket boundaries in seconds; empty for counters.
    pub buckets: Vec<f64>,
}

impl MetricDescriptor {
    pub fn counter(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            kind: MetricKind::Counter,
            namespace: String::new(),
            subsystem: String::new(),
            name: name.into(),
            help: help.into(),
            labels: Vec::new(),
            buckets: Vec::new(),
        }
    }

    pub fn histogram(name: impl Into<String>, help: impl Into<String>, buckets: &[f64]) -> Self {
        Self {
            kind: MetricKind::Histogram,
            buckets: buckets.to_vec(),
            ..Self::counter(name, help)
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = subsystem.into();
        self
    }

    pub fn with_labels(mut self, labels: &[&'static str]) -> Self {
        self.labels = labels.to_vec();
        self
    }

    /// Full metric name: non-empty parts of namespace, subsystem and name
    /// joined by `_`.
    pub fn fq_name(&self) -> String {
        [&self.namespace, &self.subsystem, &self.name]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Handle to the recorder that stores request metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
    local: Option<Arc<PrometheusRecorder>>,
}

impl MetricsRegistry {
    /// Build a recorder for `descriptors` and install it as the global
    /// `metrics` recorder. Fails if a global recorder is already set.
    pub fn install(descriptors: &[MetricDescriptor]) -> Result<Self, MetricsError> {
        let handle = builder(descriptors)?.install_recorder()?;
        let registry = Self {
            handle,
            local: None,
        };
        registry.describe(descriptors);
        Ok(registry)
    }

    /// Build a private recorder for `descriptors`; nothing is installed
    /// globally.
    pub fn isolated(descriptors: &[MetricDescriptor]) -> Result<Self, MetricsError> {
        let recorder = builder(descriptors)?.build_recorder();
        let registry = Self {
            handle: recorder.handle(),
            local: Some(Arc::new(recorder)),
        };
        registry.describe(descriptors);
        Ok(registry)
    }

    /// Counter handle for `name` with the given label pairs.
    pub fn counter(&self, name: &str, labels: Vec<Label>) -> Counter {
        let key = Key::from_parts(name.to_owned(), labels);
        self.with_recorder(|recorder| recorder.register_counter(&key, &METADATA))
    }

    /// Histogram handle for `name` with the given label pairs.
    pub fn histogram(&self, name: &str, labels: Vec<Label>) -> Histogram {
        let key = Key::from_parts(name.to_owned(), labels);
        self.with_recorder(|recorder| recorder.register_histogram(&key, &METADATA))
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Drain histogram buffers; call periodically on long-running processes.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    fn describe(&self, descriptors: &[MetricDescriptor]) {
        self.with_recorder(|recorder| {
            for descriptor in descriptors {
                let name = KeyName::from(descriptor.fq_name());
                let help = SharedString::from(descriptor.help.clone());
                match descriptor.kind {
                    MetricKind::Counter => recorder.describe_counter(name, None, help),
                    MetricKind::Histogram => recorder.describe_histogram(name, None, help),
                }
            }
        });
    }

    fn with_recorder<T>(&self, f: impl FnOnce(&dyn Recorder) -> T) -> T {
        match &self.local {
            Some(recorder) => f(recorder.as_ref()),
            None => metrics::with_recorder(f),
        }
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("global", &self.local.is_none())
            .finish()
    }
}

fn builder(descriptors: &[MetricDescriptor]) -> Result<PrometheusBuilder, MetricsError> {
    let mut builder = PrometheusBuilder::new();
    for descriptor in descriptors {
        if descriptor.kind != MetricKind::Histogram {
            continue;
        }
        let name = descriptor.fq_name();
        if descriptor.buckets.is_empty() {
            return Err(MetricsError::MissingBuckets(name));
        }
        builder = builder.set_buckets_for_metric(Matcher::Full(name), &descriptor.buckets)?;
    }
    Ok(builder)
}

/// Value of the sample `name{labels}` in Prometheus text output, if present.
///
/// `labels` must name every label of the series, in any order. Used to read
/// single series back from [`MetricsRegistry::render`].
pub fn sample(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            let (metric, pairs) = match series.split_once('{') {
                Some((metric, rest)) => (metric, rest.strip_suffix('}')?),
                None => (series, ""),
            };
            if metric != name {
                return None;
            }
            let pairs: Vec<&str> = pairs.split(',').filter(|p| !p.is_empty()).collect();
            let matched = pairs.len() == labels.len()
                && labels
                    .iter()
                    .all(|(k, v)| pairs.iter().any(|p| *p == format!("{k}=\"{v}\"")));
            matched.then(|| value.parse().ok()).flatten()
        })
}
