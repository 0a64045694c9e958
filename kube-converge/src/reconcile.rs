//! Generic create-or-update
//!
//! [`create_or_update`] fetches the object, creates it when absent, and otherwise
//! replaces it after copying the server-owned fields listed by
//! [`Reconcile::carry_over`] onto the desired object.
use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment},
        core::v1::{ConfigMap, Endpoints, Secret, Service, ServiceAccount},
        networking::v1::Ingress,
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use kube::{Resource, ResourceExt};

use crate::{
    error::Result,
    repository::{KubeObject, Repository},
    resources::{Alertmanager, Prometheus, PrometheusRule, Route, ServiceMonitor},
};

/// What [`create_or_update`] does when the object already exists
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Replace the stored object with the desired one
    Replace,
    /// Leave the stored object untouched
    CreateOnly,
}

/// Per-kind reconciliation policy
pub trait Reconcile: KubeObject {
    /// Behaviour for objects that already exist
    const POLICY: UpdatePolicy = UpdatePolicy::Replace;

    /// Copy fields only the server knows from `observed` onto `self` before an update
    ///
    /// The resource version is always carried, otherwise the update is rejected.
    fn carry_over(&mut self, observed: &Self) {
        carry_resource_version(self, observed);
    }
}

fn carry_resource_version<K: Resource>(desired: &mut K, observed: &K) {
    desired.meta_mut().resource_version = observed.meta().resource_version.clone();
}

/// Ensure `desired` exists and matches, returning the object as stored
///
/// Issues one `get`, then either one `create` or (for [`UpdatePolicy::Replace`])
/// one `update`. A failed `get` is returned without attempting either.
/// Conflicts from a concurrent writer are surfaced, not retried.
pub async fn create_or_update<K, R>(repo: &R, mut desired: K) -> Result<K>
where
    K: Reconcile,
    R: Repository<K> + ?Sized,
{
    let name = desired.name_any();
    let Some(observed) = repo.get(&name).await? else {
        return repo.create(&desired).await;
    };
    match K::POLICY {
        UpdatePolicy::CreateOnly => {
            tracing::debug!(object = %repo.object_id(&name), "exists, not updating");
            Ok(observed)
        }
        UpdatePolicy::Replace => {
            desired.carry_over(&observed);
            repo.update(&desired).await
        }
    }
}

/// Create `desired` unless an object with its name exists
///
/// The stored object is returned either way.
pub async fn create_if_not_exists<K, R>(repo: &R, desired: K) -> Result<K>
where
    K: KubeObject,
    R: Repository<K> + ?Sized,
{
    match repo.get(&desired.name_any()).await? {
        Some(observed) => Ok(observed),
        None => repo.create(&desired).await,
    }
}

impl Reconcile for Deployment {}
impl Reconcile for DaemonSet {}
impl Reconcile for ConfigMap {}
impl Reconcile for Secret {}
impl Reconcile for Endpoints {}
impl Reconcile for Role {}
impl Reconcile for RoleBinding {}
impl Reconcile for ClusterRole {}
impl Reconcile for ClusterRoleBinding {}
impl Reconcile for CustomResourceDefinition {}
impl Reconcile for Ingress {}
impl Reconcile for Route {}
impl Reconcile for Prometheus {}
impl Reconcile for Alertmanager {}
impl Reconcile for ServiceMonitor {}
impl Reconcile for PrometheusRule {}

/// The cluster IP is allocated by the API server and immutable, so a
/// `ClusterIP` service must be updated with the address it already has.
impl Reconcile for Service {
    fn carry_over(&mut self, observed: &Self) {
        carry_resource_version(self, observed);
        let Some(spec) = self.spec.as_mut() else { return };
        // an unset type defaults to ClusterIP server side
        if matches!(spec.type_.as_deref(), None | Some("ClusterIP")) {
            let allocated = observed.spec.as_ref();
            spec.cluster_ip = allocated.and_then(|s| s.cluster_ip.clone());
            spec.cluster_ips = allocated.and_then(|s| s.cluster_ips.clone());
        }
    }
}

/// Service accounts are only ever created.
///
/// Replacing a service account makes the token controller mint a new token
/// secret for it even when nothing changed, invalidating credentials that
/// running pods hold. Nothing reconciled here needs to change on an existing
/// account, so updates are skipped; switching to a patch would lift this.
impl Reconcile for ServiceAccount {
    const POLICY: UpdatePolicy = UpdatePolicy::CreateOnly;
}
