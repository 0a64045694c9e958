//! Replica status of `Prometheus` and `Alertmanager`, derived from their pods
//!
//! The status the prometheus-operator writes onto these objects can lag behind
//! the pods it governs, so readiness is computed from the live pod set instead.
use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{Pod, PodTemplateSpec},
};
use kube::ResourceExt;

use crate::{
    error::Result,
    reconcile::Reconcile,
    repository::Repository,
    resources::{Alertmanager, Prometheus},
};

/// A kind the prometheus-operator runs as a `StatefulSet` of pods
pub trait ReplicatedSet: Reconcile {
    /// Value of the `app` label on the pods, also the prefix of the `StatefulSet` name
    const APP: &'static str;

    /// Number of replicas the object asks for
    fn desired_replicas(&self) -> i32;
}

impl ReplicatedSet for Prometheus {
    const APP: &'static str = "prometheus";

    fn desired_replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }
}

impl ReplicatedSet for Alertmanager {
    const APP: &'static str = "alertmanager";

    fn desired_replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }
}

/// Label selector matching the pods of the object named `name`
pub fn pod_selector<K: ReplicatedSet>(name: &str) -> String {
    format!("app={app},{app}={name}", app = K::APP)
}

/// Name of the `StatefulSet` governing the object named `name`
pub fn statefulset_name<K: ReplicatedSet>(name: &str) -> String {
    format!("{}-{name}", K::APP)
}

/// Replica counts observed on the pods
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaStatus {
    /// Pods found
    pub replicas: i32,
    /// Available pods running the current template
    pub updated_replicas: i32,
    /// Running and ready pods
    pub available_replicas: i32,
    /// Pods that are not running and ready
    pub unavailable_replicas: i32,
    /// Names of available pods still running an old template
    pub outdated: Vec<String>,
}

/// Whether a pod is running and its `Ready` condition is true
pub fn pod_running_and_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else { return false };
    status.phase.as_deref() == Some("Running")
        && status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == "Ready" && c.status == "True")
}

// only the first container's image and args are compared,
// the rest of the template is not reflected on the pod reliably
fn needs_update(pod: &Pod, template: Option<&PodTemplateSpec>) -> bool {
    let running = pod.spec.as_ref().and_then(|s| s.containers.first());
    let wanted = template
        .and_then(|t| t.spec.as_ref())
        .and_then(|s| s.containers.first());
    match (running, wanted) {
        (Some(running), Some(wanted)) => running.image != wanted.image || running.args != wanted.args,
        _ => true,
    }
}

/// Count pods against the pod template they should be running
///
/// Without a template no pod can be known to be current, so none count as updated.
pub fn replica_status(pods: &[Pod], template: Option<&PodTemplateSpec>) -> ReplicaStatus {
    let mut status = ReplicaStatus {
        replicas: i32::try_from(pods.len()).unwrap_or(i32::MAX),
        ..ReplicaStatus::default()
    };
    for pod in pods {
        if !pod_running_and_ready(pod) {
            status.unavailable_replicas += 1;
            continue;
        }
        status.available_replicas += 1;
        if needs_update(pod, template) {
            status.outdated.push(pod.name_any());
        } else {
            status.updated_replicas += 1;
        }
    }
    status
}

/// Compute the [`ReplicaStatus`] of the object named `name` from its pods and `StatefulSet`
pub async fn fetch_replica_status<K, P, S>(pods: &P, statefulsets: &S, name: &str) -> Result<ReplicaStatus>
where
    K: ReplicatedSet,
    P: Repository<Pod> + ?Sized,
    S: Repository<StatefulSet> + ?Sized,
{
    let pods = pods.list(&pod_selector::<K>(name)).await?;
    let set = statefulsets.get(&statefulset_name::<K>(name)).await?;
    let template = set.as_ref().and_then(|s| s.spec.as_ref()).map(|s| &s.template);
    Ok(replica_status(&pods, template))
}
