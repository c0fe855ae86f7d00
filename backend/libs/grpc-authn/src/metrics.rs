//! Prometheus metrics for authentication outcomes

use prometheus::{histogram_opts, opts, HistogramVec, IntCounterVec, Registry, Result};

/// Authentication metrics; handles are created and registered once
#[derive(Clone)]
pub struct AuthnMetrics {
    /// Labels: authenticator, outcome
    pub requests_total: IntCounterVec,

    /// Labels: authenticator
    pub duration_seconds: HistogramVec,
}

impl AuthnMetrics {
    /// Create the metrics and register them with `registry`
    ///
    /// Fails if metrics with the same names are already registered there.
    pub fn register(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            opts!(
                "grpc_authn_requests_total",
                "gRPC authentication attempts by authenticator and outcome"
            ),
            &["authenticator", "outcome"],
        )?;

        let duration_seconds = HistogramVec::new(
            histogram_opts!(
                "grpc_authn_duration_seconds",
                "Time spent authenticating gRPC calls in seconds",
                vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
            ),
            &["authenticator"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(duration_seconds.clone()))?;

        Ok(Self {
            requests_total,
            duration_seconds,
        })
    }

    pub fn record(&self, authenticator: &str, outcome: &str, duration_secs: f64) {
        self.requests_total
            .with_label_values(&[authenticator, outcome])
            .inc();
        self.duration_seconds
            .with_label_values(&[authenticator])
            .observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_record() {
        let registry = Registry::new();
        let metrics = AuthnMetrics::register(&registry).unwrap();

        metrics.record("legacy", "success", 0.002);
        metrics.record("legacy", "unauthenticated", 0.001);
        metrics.record("legacy", "success", 0.003);

        assert_eq!(
            metrics
                .requests_total
                .with_label_values(&["legacy", "success"])
                .get(),
            2
        );
        assert_eq!(registry.gather().len(), 2);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        AuthnMetrics::register(&registry).unwrap();
        assert!(AuthnMetrics::register(&registry).is_err());
    }
}
