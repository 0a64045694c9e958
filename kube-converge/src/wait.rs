//! Waits for objects to become ready
//!
//! Every wait re-fetches the object through its [`Repository`] on each tick of
//! [`poll_until`] and judges it with a predicate from [`conditions`](crate::conditions).
//! A missing object counts as not ready yet.
use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment, StatefulSet},
        core::v1::Pod,
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    conditions::{
        crd_readiness, daemonset_rolled_out, deployment_rolled_out, replicas_ready, route_admitted_host,
    },
    error::Result,
    poll::{poll_until, Schedule, Verdict},
    repository::Repository,
    resources::{Alertmanager, Prometheus, Route, ServiceMonitor},
    status::{fetch_replica_status, ReplicatedSet},
};

/// Definitions the prometheus-operator must have installed before its kinds can be used
///
/// In the order they are checked: `Prometheus`, `Alertmanager`, `ServiceMonitor`.
pub const PROMETHEUS_OPERATOR_CRDS: [&str; 3] = [
    "prometheuses.monitoring.coreos.com",
    "alertmanagers.monitoring.coreos.com",
    "servicemonitors.monitoring.coreos.com",
];

fn verdict(ready: bool) -> Verdict<()> {
    if ready {
        Verdict::Ready(())
    } else {
        Verdict::Pending
    }
}

/// Wait until a `Deployment` has rolled out
pub async fn wait_for_deployment_rollout<R>(repo: &R, name: &str, cancel: &CancellationToken) -> Result<()>
where
    R: Repository<Deployment> + ?Sized,
{
    let id = repo.object_id(name);
    poll_until(&id, Schedule::DEPLOYMENT_ROLLOUT, cancel, move || async move {
        let observed = repo.get(name).await?;
        Ok(verdict(observed.as_ref().is_some_and(deployment_rolled_out)))
    })
    .await?;
    tracing::info!(object = %id, "deployment rolled out");
    Ok(())
}

/// Wait until a `DaemonSet` has rolled out
pub async fn wait_for_daemonset_rollout<R>(repo: &R, name: &str, cancel: &CancellationToken) -> Result<()>
where
    R: Repository<DaemonSet> + ?Sized,
{
    let id = repo.object_id(name);
    poll_until(&id, Schedule::DAEMONSET_ROLLOUT, cancel, move || async move {
        let observed = repo.get(name).await?;
        Ok(verdict(observed.as_ref().is_some_and(daemonset_rolled_out)))
    })
    .await?;
    tracing::info!(object = %id, "daemonset rolled out");
    Ok(())
}

/// Wait until a `CustomResourceDefinition` is established
///
/// Fails immediately with [`Error::NamingConflict`](crate::Error::NamingConflict)
/// if its names were not accepted.
pub async fn wait_for_crd_established<R>(repo: &R, name: &str, cancel: &CancellationToken) -> Result<()>
where
    R: Repository<CustomResourceDefinition> + ?Sized,
{
    let id = repo.object_id(name);
    poll_until(&id, Schedule::CRD_ESTABLISHED, cancel, move || async move {
        Ok(match repo.get(name).await? {
            Some(crd) => crd_readiness(&crd),
            None => Verdict::Pending,
        })
    })
    .await
}

/// Wait until a `Route` is admitted, returning its host
pub async fn wait_for_route_admitted<R>(repo: &R, name: &str, cancel: &CancellationToken) -> Result<String>
where
    R: Repository<Route> + ?Sized,
{
    let id = repo.object_id(name);
    let host = poll_until(&id, Schedule::ROUTE_ADMITTED, cancel, move || async move {
        let host = repo.get(name).await?.as_ref().and_then(route_admitted_host);
        Ok(host.map_or(Verdict::Pending, Verdict::Ready))
    })
    .await?;
    tracing::info!(object = %id, %host, "route admitted");
    Ok(host)
}

/// Wait until the prometheus-operator's definitions are established and their kinds can be listed
///
/// A naming conflict on any definition fails immediately. A timeout or
/// cancellation names the definition that was still holding the wait up,
/// including when it was listing its kind that kept failing.
pub async fn wait_for_operator_crds<C, P, A, S>(
    crds: &C,
    prometheuses: &P,
    alertmanagers: &A,
    service_monitors: &S,
    cancel: &CancellationToken,
) -> Result<()>
where
    C: Repository<CustomResourceDefinition> + ?Sized,
    P: Repository<Prometheus> + ?Sized,
    A: Repository<Alertmanager> + ?Sized,
    S: Repository<ServiceMonitor> + ?Sized,
{
    let [prometheus_crd, alertmanager_crd, service_monitor_crd] = PROMETHEUS_OPERATOR_CRDS;
    let pending = &Mutex::new(crds.object_id(prometheus_crd));
    let holding_up = move |name: &str| *pending.lock() = crds.object_id(name);

    let id = crds.object_id(prometheus_crd);
    poll_until(&id, Schedule::OPERATOR_CRDS, cancel, move || async move {
        for name in PROMETHEUS_OPERATOR_CRDS {
            holding_up(name);
            let Some(crd) = crds.get(name).await? else {
                return Ok(Verdict::Pending);
            };
            match crd_readiness(&crd) {
                Verdict::Ready(()) => {}
                other => return Ok(other),
            }
        }
        holding_up(prometheus_crd);
        prometheuses.list("").await?;
        holding_up(alertmanager_crd);
        alertmanagers.list("").await?;
        holding_up(service_monitor_crd);
        service_monitors.list("").await?;
        Ok(Verdict::Ready(()))
    })
    .await
    .map_err(|err| err.waiting_on(pending.lock().clone()))?;
    tracing::info!("prometheus-operator definitions ready");
    Ok(())
}

/// Wait until every replica of a `Prometheus` or `Alertmanager` is updated and available
///
/// Replica counts come from [`fetch_replica_status`] rather than the object's own status.
pub async fn wait_for_replicas<K, R, P, S>(
    repo: &R,
    pods: &P,
    statefulsets: &S,
    name: &str,
    cancel: &CancellationToken,
) -> Result<()>
where
    K: ReplicatedSet,
    R: Repository<K> + ?Sized,
    P: Repository<Pod> + ?Sized,
    S: Repository<StatefulSet> + ?Sized,
{
    let id = repo.object_id(name);
    poll_until(&id, Schedule::MONITORING_REPLICAS, cancel, move || async move {
        let Some(obj) = repo.get(name).await? else {
            return Ok(Verdict::Pending);
        };
        let status = fetch_replica_status::<K, _, _>(pods, statefulsets, name).await?;
        tracing::debug!(
            object = %repo.object_id(name),
            desired = obj.desired_replicas(),
            updated = status.updated_replicas,
            available = status.available_replicas,
            "replica status"
        );
        Ok(verdict(replicas_ready(obj.desired_replicas(), &status)))
    })
    .await?;
    tracing::info!(object = %id, "all replicas available");
    Ok(())
}
