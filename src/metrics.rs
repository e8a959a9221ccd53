use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_int_counter, register_int_counter_vec, register_int_gauge, Encoder,
    IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

pub static BUS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "muttr_bus_connections_total",
        "Total number of push-channel connections accepted"
    ))
    .unwrap()
});

pub static BUS_BOUND_CHANNELS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "muttr_bus_bound_channels",
        "Push channels currently bound to an identity"
    ))
    .unwrap()
});

pub static ENVELOPES_PUSHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "muttr_envelopes_pushed_total",
        "Envelopes delivered live over a push channel"
    ))
    .unwrap()
});

pub static ENVELOPES_STORED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "muttr_envelopes_stored_total",
        "Envelopes stored for later retrieval"
    ))
    .unwrap()
});

pub static FEDERATION_LOOKUPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "muttr_federation_lookups_total",
            "Remote public-key fetches by outcome"
        ),
        &["outcome"]
    )
    .unwrap()
});

pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "muttr_auth_failures_total",
            "Rejected signed or token-authorized requests by reason"
        ),
        &["reason"]
    )
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
