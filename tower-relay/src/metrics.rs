use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;

/// Counters recorded along the request lifecycle.
///
/// Without an installed meter provider these are no-ops.
#[derive(Clone, Debug)]
pub(crate) struct RelayMetrics {
    admitted: Counter<u64>,
    shed: Counter<u64>,
    timed_out: Counter<u64>,
    outcomes: Counter<u64>,
}

impl RelayMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("tower_relay");
        Self {
            admitted: meter.u64_counter("admitted").build(),
            shed: meter.u64_counter("shed").build(),
            timed_out: meter.u64_counter("timed_out").build(),
            outcomes: meter.u64_counter("outcomes").build(),
        }
    }

    pub(crate) fn admitted(&self) {
        self.admitted.add(1, &[]);
    }

    pub(crate) fn shed(&self) {
        self.shed.add(1, &[]);
    }

    /// `side` is either "ingress" or "worker".
    pub(crate) fn timed_out(&self, side: &'static str) {
        self.timed_out.add(1, &[KeyValue::new("side", side)]);
    }

    pub(crate) fn outcome(&self, kind: &'static str, delivered: bool) {
        self.outcomes.add(
            1,
            &[
                KeyValue::new("outcome", kind),
                KeyValue::new("delivered", delivered),
            ],
        );
    }
}
