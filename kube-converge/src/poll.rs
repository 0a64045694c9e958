//! Bounded polling until a probe reports readiness
use std::{future::Future, time::Duration};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    repository::ObjectId,
};

/// Outcome of a single readiness probe
#[derive(Debug)]
pub enum Verdict<T> {
    /// The object is ready, carrying whatever the probe extracted from it
    Ready(T),
    /// Not ready yet, keep polling
    Pending,
    /// Readiness can never be reached; stop polling and return this error
    Fatal(Error),
}

/// How often to probe, and for how long
///
/// Only the fixed schedules below are available; the interval is never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub(crate) interval: Duration,
    pub(crate) timeout: Duration,
}

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

impl Schedule {
    pub(crate) const fn new(interval: Duration, timeout: Duration) -> Self {
        assert!(!interval.is_zero(), "poll interval must be non-zero");
        Self { interval, timeout }
    }

    /// `Deployment` rollout
    pub const DEPLOYMENT_ROLLOUT: Self = Self::new(secs(1), secs(5 * 60));
    /// `DaemonSet` rollout
    pub const DAEMONSET_ROLLOUT: Self = Self::new(secs(1), secs(5 * 60));
    /// `CustomResourceDefinition` establishment
    pub const CRD_ESTABLISHED: Self = Self::new(secs(5), secs(5 * 60));
    /// The prometheus-operator's definitions becoming usable
    pub const OPERATOR_CRDS: Self = Self::new(secs(1), secs(5 * 60));
    /// `Route` admission by a router
    pub const ROUTE_ADMITTED: Self = Self::new(secs(1), secs(5 * 60));
    /// `Prometheus`/`Alertmanager` replicas becoming available
    pub const MONITORING_REPLICAS: Self = Self::new(secs(10), secs(5 * 60));
    /// Pods of a deleted `Prometheus` disappearing
    pub const PODS_REMOVED: Self = Self::new(secs(10), secs(10 * 60));

    /// Minimum time between two probes
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time after which a still pending wait fails with [`Error::Timeout`]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Repeatedly run `probe` until it reports [`Verdict::Ready`]
///
/// The first probe runs one `interval` after the call, then at most once per
/// `interval`. A ready probe returns immediately. A probe still in flight is
/// abandoned when `cancel` fires or the deadline passes.
///
/// # Errors
///
/// - [`Verdict::Fatal`] is returned as is, without waiting out the deadline.
/// - An `Err` from the probe is logged and retried; it is attached to the
///   eventual [`Error::Timeout`] if the object never becomes ready.
/// - [`Error::Timeout`] once `schedule.timeout` has elapsed with the probe still pending.
/// - [`Error::Cancelled`] as soon as `cancel` fires.
pub async fn poll_until<T, F, Fut>(
    object: &ObjectId,
    schedule: Schedule,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Verdict<T>>>,
{
    let start = Instant::now();
    let deadline = start + schedule.timeout;
    let mut ticks = time::interval_at(start + schedule.interval, schedule.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_error = None;

    let cancelled = || {
        tracing::debug!(%object, "wait cancelled");
        Err(Error::Cancelled {
            object: object.clone(),
            elapsed: start.elapsed(),
        })
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return cancelled(),
            _ = ticks.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return cancelled(),
            outcome = time::timeout_at(deadline, probe()) => outcome,
        };

        match outcome {
            Ok(Ok(Verdict::Ready(value))) => {
                tracing::debug!(%object, elapsed = ?start.elapsed(), "ready");
                return Ok(value);
            }
            Ok(Ok(Verdict::Pending)) => tracing::trace!(%object, "not ready yet"),
            Ok(Ok(Verdict::Fatal(err))) => return Err(err),
            Ok(Err(err)) => {
                tracing::warn!(%object, error = %err, "readiness probe failed, retrying");
                last_error = Some(Box::new(err));
            }
            Err(_) => tracing::warn!(%object, "readiness probe still running at the deadline"),
        }

        let elapsed = start.elapsed();
        if elapsed >= schedule.timeout {
            return Err(Error::Timeout {
                object: object.clone(),
                elapsed,
                last_error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Verb;
    use kube::core::ErrorResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn object() -> ObjectId {
        ObjectId {
            kind: "Deployment".into(),
            namespace: Some("openshift-monitoring".into()),
            name: "grafana".into(),
        }
    }

    fn unavailable() -> Error {
        Error::api(Verb::Retrieving, object())(kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "etcdserver: request timed out".into(),
            reason: "InternalError".into(),
            code: 500,
        }))
    }

    const FIVE_MINUTES: Schedule = Schedule::DEPLOYMENT_ROLLOUT;

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_ready() {
        let probes = &AtomicUsize::new(0);
        let start = Instant::now();
        let host = poll_until(&object(), FIVE_MINUTES, &CancellationToken::new(), move || async move {
            let n = probes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(if n == 2 {
                Verdict::Ready("example.test")
            } else {
                Verdict::Pending
            })
        })
        .await
        .unwrap();

        assert_eq!(host, "example.test");
        assert_eq!(probes.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_ready() {
        let start = Instant::now();
        let err = poll_until(&object(), FIVE_MINUTES, &CancellationToken::new(), || async {
            Ok(Verdict::<()>::Pending)
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout(), "{err}");
        let waited = start.elapsed();
        assert!(waited >= FIVE_MINUTES.timeout);
        assert!(waited <= FIVE_MINUTES.timeout + FIVE_MINUTES.interval);
        assert!(err.to_string().contains("Deployment openshift-monitoring/grafana"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_verdict_stops_on_first_tick() {
        let probes = &AtomicUsize::new(0);
        let start = Instant::now();
        let schedule = Schedule::CRD_ESTABLISHED;
        let err = poll_until(&object(), schedule, &CancellationToken::new(), move || async move {
            probes.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::<()>::Fatal(Error::NamingConflict {
                name: "alertmanagers.monitoring.coreos.com".into(),
                reason: "KindConflict".into(),
            }))
        })
        .await
        .unwrap_err();

        assert!(err.is_fatal() && !err.is_timeout());
        assert_eq!(probes.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), schedule.interval);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_are_retried_and_reported_on_timeout() {
        let probes = &AtomicUsize::new(0);
        let schedule = Schedule::new(Duration::from_secs(1), Duration::from_secs(3));
        let err = poll_until(&object(), schedule, &CancellationToken::new(), move || async move {
            probes.fetch_add(1, Ordering::SeqCst);
            Err::<Verdict<()>, _>(unavailable())
        })
        .await
        .unwrap_err();

        assert_eq!(probes.load(Ordering::SeqCst), 3);
        match err {
            Error::Timeout {
                last_error: Some(last), ..
            } => assert!(last.to_string().starts_with("retrieving Deployment")),
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_errors() {
        let probes = &AtomicUsize::new(0);
        poll_until(&object(), FIVE_MINUTES, &CancellationToken::new(), move || async move {
            match probes.fetch_add(1, Ordering::SeqCst) {
                0 => Err(unavailable()),
                _ => Ok(Verdict::Ready(())),
            }
        })
        .await
        .unwrap();
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_distinct_from_timeout() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = poll_until(&object(), FIVE_MINUTES, &cancel, || async { Ok(Verdict::<()>::Pending) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled() && !err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_running_probe() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = poll_until(&object(), Schedule::PODS_REMOVED, &cancel, || async {
            time::sleep(Duration::from_secs(240)).await;
            Ok(Verdict::<()>::Pending)
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled(), "{err}");
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_a_running_probe() {
        let schedule = Schedule::new(Duration::from_secs(1), Duration::from_secs(5));
        let start = Instant::now();
        let err = poll_until(&object(), schedule, &CancellationToken::new(), || async {
            time::sleep(Duration::from_secs(60)).await;
            Ok(Verdict::<()>::Ready(()))
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout(), "{err}");
        assert_eq!(start.elapsed(), schedule.timeout);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn zero_interval_is_rejected() {
        Schedule::new(Duration::ZERO, Duration::from_secs(1));
    }
}
