use tracing::trace;

// Metric events are emitted as trace records; the Prometheus recorder in
// main only serves the exposition endpoint.

pub fn inc_requests(route: &'static str) {
    trace!(target = "louie.metrics", route = route, "requests_total_inc");
}

pub fn external_call(endpoint: &'static str, elapsed_ms: u128, ok: bool) {
    trace!(
        target = "louie.metrics",
        endpoint = endpoint,
        elapsed_ms = elapsed_ms as u64,
        ok = ok,
        "cj_call"
    );
}

pub fn sweep_finished(sweep: &'static str, processed: usize, errors: usize, elapsed_ms: u128) {
    trace!(
        target = "louie.metrics",
        sweep = sweep,
        processed = processed as u64,
        errors = errors as u64,
        elapsed_ms = elapsed_ms as u64,
        "sweep_finished"
    );
}
