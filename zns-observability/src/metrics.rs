use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics for the naming service and proxy: resolution counts and
/// latency, SOCKS5/HTTPS connection counts, and bridge byte counters.
/// Pull-only (text exposition); there is no push-gateway integration.
pub struct MetricsCollector {
    registry: Registry,

    pub resolutions_total: IntCounterVec,
    pub resolution_duration: HistogramVec,
    pub active_connections: IntGauge,
    pub bridge_ingress_bytes: IntCounterVec,
    pub bridge_egress_bytes: IntCounterVec,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let resolutions_total = IntCounterVec::new(
            Opts::new("zns_resolutions_total", "Total name resolutions by outcome").namespace("zns"),
            &["outcome"],
        )?;

        let resolution_duration = HistogramVec::new(
            HistogramOpts::new("zns_resolution_duration_seconds", "Name resolution latency")
                .namespace("zns")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["outcome"],
        )?;

        let active_connections = IntGauge::new("zns_active_connections", "Number of active proxy connections")?;

        let bridge_ingress_bytes = IntCounterVec::new(
            Opts::new("zns_bridge_ingress_bytes_total", "Bytes read from upstream").namespace("zns"),
            &["legacy_hostname"],
        )?;

        let bridge_egress_bytes = IntCounterVec::new(
            Opts::new("zns_bridge_egress_bytes_total", "Bytes written to the client").namespace("zns"),
            &["legacy_hostname"],
        )?;

        registry.register(Box::new(resolutions_total.clone()))?;
        registry.register(Box::new(resolution_duration.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(bridge_ingress_bytes.clone()))?;
        registry.register(Box::new(bridge_egress_bytes.clone()))?;

        Ok(Self {
            registry,
            resolutions_total,
            resolution_duration,
            active_connections,
            bridge_ingress_bytes,
            bridge_egress_bytes,
        })
    }

    pub fn record_resolution(&self, outcome: &str, duration_secs: f64) {
        self.resolutions_total.with_label_values(&[outcome]).inc();
        self.resolution_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    /// Prometheus text exposition, served by the admin/metrics endpoint.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metrics = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metrics, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("failed to construct metrics registry")
    }
}
