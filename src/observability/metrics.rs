use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_total: IntCounterVec,
    pub orders_awaiting_dispatch: IntGauge,
    pub dispatch_latency_seconds: HistogramVec,
    pub driver_load: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch runs by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_total metric");

        let orders_awaiting_dispatch = IntGauge::new(
            "orders_awaiting_dispatch",
            "Orders currently queued for dispatch",
        )
        .expect("valid orders_awaiting_dispatch metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of one dispatch run in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let driver_load = GaugeVec::new(
            Opts::new("driver_load", "Active order count per driver"),
            &["driver_id"],
        )
        .expect("valid driver_load metric");

        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(orders_awaiting_dispatch.clone()))
            .expect("register orders_awaiting_dispatch");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(driver_load.clone()))
            .expect("register driver_load");

        Self {
            registry,
            dispatch_total,
            orders_awaiting_dispatch,
            dispatch_latency_seconds,
            driver_load,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
