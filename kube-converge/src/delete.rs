//! Waiting for what a deleted object governs to disappear
//!
//! Plain deletes go straight through [`Repository::delete`], which already uses
//! foreground propagation and treats a missing object as deleted.
use k8s_openapi::api::core::v1::Pod;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    poll::{poll_until, Schedule, Verdict},
    repository::Repository,
    status::{pod_selector, ReplicatedSet},
};

/// Delete a `Prometheus` (or `Alertmanager`) and wait until none of its pods remain
///
/// The object can disappear from the API while its pods are still terminating;
/// this returns only once listing them comes back empty.
pub async fn delete_and_wait_for_pods<K, R, P>(
    repo: &R,
    pods: &P,
    name: &str,
    cancel: &CancellationToken,
) -> Result<()>
where
    K: ReplicatedSet,
    R: Repository<K> + ?Sized,
    P: Repository<Pod> + ?Sized,
{
    repo.delete(name).await?;

    let selector = &pod_selector::<K>(name);
    poll_until(&repo.object_id(name), Schedule::PODS_REMOVED, cancel, move || async move {
        let remaining = pods.list(selector).await?;
        tracing::debug!(%selector, remaining = remaining.len(), "waiting for pods to be deleted");
        Ok(if remaining.is_empty() {
            Verdict::Ready(())
        } else {
            Verdict::Pending
        })
    })
    .await
}
