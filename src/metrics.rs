//! Metrics and tracing helpers.
//!
//! With the `metrics` feature, renders and queries are counted and timed
//! through OpenTelemetry instruments exported into a Prometheus registry.
//! With the `tracing` feature, rendering and execution run inside spans.

#[cfg(feature = "metrics")]
pub use self::otel::{TemplaterMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
    use opentelemetry::global;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<TemplaterMetrics> = Lazy::new(TemplaterMetrics::init);

    pub struct TemplaterMetrics {
        pub registry: Registry,
        pub renders_total: Counter<u64>,
        pub render_errors_total: Counter<u64>,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        // Keeps the Prometheus reader alive
        _provider: Option<SdkMeterProvider>,
    }

    impl TemplaterMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let (meter, provider) = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => {
                    let provider = SdkMeterProvider::builder().with_reader(exporter).build();
                    (provider.meter("sql_templater"), Some(provider))
                }
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics go to the global meter: {e}");
                    (global::meter("sql_templater"), None)
                }
            };
            Self::with_meter(&meter, registry, provider)
        }

        fn with_meter(meter: &Meter, registry: Registry, provider: Option<SdkMeterProvider>) -> Self {
            let renders_total = meter
                .u64_counter("sql_templater_renders_total")
                .with_description("Templates rendered successfully")
                .build();

            let render_errors_total = meter
                .u64_counter("sql_templater_render_errors_total")
                .with_description("Template renders that failed")
                .build();

            let queries_total = meter
                .u64_counter("sql_templater_queries_total")
                .with_description("Total queries executed")
                .build();

            let query_errors_total = meter
                .u64_counter("sql_templater_query_errors_total")
                .with_description("Queries rejected by the database")
                .build();

            let query_duration = meter
                .f64_histogram("sql_templater_query_duration_seconds")
                .with_description("Duration of queries")
                .build();

            Self {
                registry,
                renders_total,
                render_errors_total,
                queries_total,
                query_errors_total,
                query_duration,
                _provider: provider,
            }
        }

        pub fn record_render(&self) {
            self.renders_total.add(1, &[]);
        }

        pub fn record_render_error(&self) {
            self.render_errors_total.add(1, &[]);
        }

        pub fn record_query(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        /// Prometheus text exposition of everything recorded so far.
        pub fn gather_text(&self) -> String {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {e}");
                return String::new();
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    pub fn render_template_span(template: &str) -> Span {
        tracing::debug_span!("render_template", template = %template)
    }

    pub fn execute_query_span(query: &str) -> Span {
        tracing::debug_span!("execute_query", db.statement = %query)
    }

    pub fn connect_span() -> Span {
        tracing::debug_span!("connect")
    }
}
