use eyre::Result;
use prometheus::IntCounterVec;
use serde::Deserialize;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    layer::Context,
    prelude::*,
    Layer,
};

use crate::CoreMetrics;

/// Logging level. A "higher level" means more will be logged.
#[derive(Default, Debug, Clone, Copy, Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Off
    Off = 0,
    /// Error
    Error = 1,
    /// Warn
    Warn = 2,
    /// Debug
    Debug = 4,
    /// Trace
    Trace = 5,
    /// Info
    #[serde(other)]
    #[default]
    Info = 3,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Info => LevelFilter::INFO,
        }
    }
}

/// Basic tracing configuration
#[derive(Default, Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Pretty print
    Pretty,
    /// JSON
    Json,
    /// Compact
    Compact,
    /// Default style
    #[serde(other)]
    #[default]
    Full,
}

/// Configuration for the tracing subscribers used by the agents
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct TracingConfig {
    /// Output format
    #[serde(default)]
    pub fmt: Style,
    /// Most verbose level that is logged
    #[serde(default)]
    pub level: Level,
}

impl TracingConfig {
    /// Attempt to instantiate and register a tracing subscriber setup from
    /// settings.
    pub fn start_tracing(&self, metrics: &CoreMetrics) -> Result<()> {
        let mut target_layer = Targets::new().with_default(self.level);
        if self.level < Level::Trace {
            // only show these debug and trace logs at trace level
            target_layer = target_layer.with_target("hyper", Level::Info);
            target_layer = target_layer.with_target("reqwest", Level::Info);
            target_layer = target_layer.with_target("warp", Level::Info);
            target_layer = target_layer.with_target("ethers_providers", Level::Info);
        }

        let fmt_layer = match self.fmt {
            Style::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
            Style::Json => tracing_subscriber::fmt::layer().json().boxed(),
            Style::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
            Style::Full => tracing_subscriber::fmt::layer().boxed(),
        };
        let err_layer = tracing_error::ErrorLayer::default();

        tracing_subscriber::Registry::default()
            .with(fmt_layer)
            .with(EventCounter(metrics.span_events()))
            .with(target_layer)
            .with(err_layer)
            .try_init()?;
        Ok(())
    }
}

/// Counts emitted log events by level.
struct EventCounter(IntCounterVec);

impl<S: Subscriber> Layer<S> for EventCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.0
            .with_label_values(&[event.metadata().level().as_str()])
            .inc();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_values_fall_back_to_defaults() {
        let config: TracingConfig =
            serde_json::from_str(r#"{ "fmt": "fancy", "level": "verbose" }"#).unwrap();
        assert_eq!(config.fmt, Style::Full);
        assert_eq!(config.level, Level::Info);
    }

    #[test]
    fn parses_explicit_values() {
        let config: TracingConfig =
            serde_json::from_str(r#"{ "fmt": "json", "level": "debug" }"#).unwrap();
        assert_eq!(config.fmt, Style::Json);
        assert_eq!(config.level, Level::Debug);
        assert!(Level::Debug < Level::Trace);
        assert!(Level::Info < Level::Debug);
    }
}
