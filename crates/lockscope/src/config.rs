use std::sync::Arc;
use std::time::Duration;

use lockscope_context::{ContextResolver, Propagated};
use lockscope_graph::GraphOptions;

use crate::{ActionSink, ConfigError, TracingSink};

const WAIT_THRESHOLD_ENV: &str = "LOCKSCOPE_WAIT_THRESHOLD_US";
const TRACE_ENV: &str = "LOCKSCOPE_TRACE";

/// How an instrumented resource resolves contexts, who else hears about its
/// actions, and how its diagram is drawn.
#[derive(Clone)]
pub struct Config {
    pub(crate) resolver: Arc<dyn ContextResolver>,
    pub(crate) sinks: Vec<Arc<dyn ActionSink>>,
    pub(crate) graph: GraphOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolver: Arc::new(Propagated),
            sinks: Vec::new(),
            graph: GraphOptions::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, adjusted by `LOCKSCOPE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(WAIT_THRESHOLD_ENV) {
            let micros = raw
                .trim()
                .parse::<u64>()
                .map_err(|err| ConfigError::Invalid {
                    key: WAIT_THRESHOLD_ENV,
                    value: raw.clone(),
                    reason: err.to_string(),
                })?;
            config.graph.wait_threshold = Duration::from_micros(micros);
        }

        if let Some(raw) = lookup(TRACE_ENV) {
            let enabled = match raw.trim() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: TRACE_ENV,
                        value: raw,
                        reason: "expected 1/0, true/false, yes/no or on/off".to_owned(),
                    });
                }
            };
            if enabled {
                config.sinks.push(Arc::new(TracingSink));
            }
        }

        Ok(config)
    }

    pub fn resolver(mut self, resolver: impl ContextResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ActionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn graph_options(mut self, options: GraphOptions) -> Self {
        self.graph = options;
        self
    }

    /// Shortest lock wait that gets annotated in the diagram.
    pub fn wait_threshold(mut self, threshold: Duration) -> Self {
        self.graph.wait_threshold = threshold;
        self
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("sinks", &self.sinks.len())
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}
