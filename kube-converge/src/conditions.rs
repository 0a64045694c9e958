//! Readiness predicates per kind
//!
//! Each predicate is a pure function of the observed object. They are polled by
//! the waits in [`wait`](crate::wait), and the boolean ones are also exposed as
//! [`Condition`]s for use with [`kube::runtime::wait::await_condition`].
use k8s_openapi::{
    api::apps::v1::{DaemonSet, Deployment},
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use kube::{runtime::wait::Condition, ResourceExt};

use crate::{error::Error, poll::Verdict, resources::Route, status::ReplicaStatus};

/// Whether the controller has observed the latest spec and every replica is updated and available
pub fn deployment_rolled_out(deployment: &Deployment) -> bool {
    let Some(status) = &deployment.status else {
        return false;
    };
    deployment.metadata.generation.unwrap_or_default() <= status.observed_generation.unwrap_or_default()
        && status.updated_replicas.unwrap_or_default() == status.replicas.unwrap_or_default()
        && status.unavailable_replicas.unwrap_or_default() == 0
}

/// Whether the controller has observed the latest spec and every scheduled pod is updated and available
pub fn daemonset_rolled_out(daemonset: &DaemonSet) -> bool {
    let Some(status) = &daemonset.status else {
        return false;
    };
    daemonset.metadata.generation.unwrap_or_default() <= status.observed_generation.unwrap_or_default()
        && status.updated_number_scheduled.unwrap_or_default() == status.desired_number_scheduled
        && status.number_unavailable.unwrap_or_default() == 0
}

/// Ready once `Established`, fatal if the API server refused its names
///
/// Conditions are inspected in order; whichever decisive condition comes first wins.
pub fn crd_readiness(crd: &CustomResourceDefinition) -> Verdict<()> {
    let conditions = crd
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    for cond in conditions {
        match (cond.type_.as_str(), cond.status.as_str()) {
            ("Established", "True") => return Verdict::Ready(()),
            ("NamesAccepted", "False") => {
                return Verdict::Fatal(Error::NamingConflict {
                    name: crd.name_any(),
                    reason: cond.reason.clone().unwrap_or_default(),
                })
            }
            _ => {}
        }
    }
    Verdict::Pending
}

/// The route's host once the first router has admitted it
pub fn route_admitted_host(route: &Route) -> Option<String> {
    let ingress = route.status.as_ref()?.ingress.first()?;
    ingress
        .conditions
        .iter()
        .any(|c| c.type_ == "Admitted" && c.status == "True")
        .then(|| route.spec.host.clone().unwrap_or_default())
}

/// Whether every desired replica runs the current template and is available
pub fn replicas_ready(desired: i32, status: &ReplicaStatus) -> bool {
    status.updated_replicas == desired && status.available_replicas >= desired
}

/// [`deployment_rolled_out`] as a [`Condition`]
#[must_use]
pub fn is_deployment_rolled_out() -> impl Condition<Deployment> {
    |obj: Option<&Deployment>| obj.is_some_and(deployment_rolled_out)
}

/// [`daemonset_rolled_out`] as a [`Condition`]
#[must_use]
pub fn is_daemonset_rolled_out() -> impl Condition<DaemonSet> {
    |obj: Option<&DaemonSet>| obj.is_some_and(daemonset_rolled_out)
}

/// [`route_admitted_host`] as a [`Condition`]
#[must_use]
pub fn is_route_admitted() -> impl Condition<Route> {
    |obj: Option<&Route>| obj.and_then(route_admitted_host).is_some()
}
