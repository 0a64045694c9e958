//! A client for converging the objects of a monitoring stack
//!
//! [`Client`] binds a [`kube::Client`], the managed namespace and a
//! [`CancellationToken`], and offers one method per kind on top of the generic
//! [`create_or_update`], waits and deletes.
use futures::Stream;
use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment, StatefulSet},
        core::v1::{ConfigMap, Endpoints, Pod, Secret, Service, ServiceAccount},
        networking::v1::Ingress,
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
    ClusterResourceScope, NamespaceResourceScope,
};
use kube::{
    runtime::{watcher, watcher::Event},
    Api, Resource, ResourceExt,
};
use tokio_util::sync::CancellationToken;

use crate::{
    delete::delete_and_wait_for_pods,
    error::{Error, Result},
    reconcile::{create_if_not_exists, create_or_update, Reconcile},
    repository::{KubeObject, KubeRepository, Repository},
    resources::{Alertmanager, Prometheus, PrometheusRule, Route, ServiceMonitor},
    status::ReplicatedSet,
    wait,
};

/// Converges objects in one namespace (and cluster scoped objects) against the API server
#[derive(Clone)]
pub struct Client {
    client: kube::Client,
    namespace: String,
    cancel: CancellationToken,
}

impl Client {
    /// Wrap a ready [`kube::Client`], managing objects in `namespace` by default
    pub fn new(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Infer the connection from the environment
    ///
    /// Uses the in-cluster service account when available, the local kubeconfig otherwise.
    pub async fn try_default(namespace: impl Into<String>) -> Result<Self> {
        let client = kube::Client::try_default().await.map_err(Error::Config)?;
        Ok(Self::new(client, namespace))
    }

    /// Abort all waits started by this client once `cancel` fires
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The namespace managed by default
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The underlying [`kube::Client`]
    pub fn kube_client(&self) -> kube::Client {
        self.client.clone()
    }

    /// Repository for a namespaced kind
    pub fn namespaced<K>(&self, ns: &str) -> KubeRepository<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        KubeRepository::namespaced(self.client.clone(), ns)
    }

    /// Repository for a cluster scoped kind
    pub fn cluster<K>(&self) -> KubeRepository<K>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
    {
        KubeRepository::cluster(self.client.clone())
    }

    fn namespace_of<K: Resource>(&self, obj: &K) -> String {
        obj.namespace().unwrap_or_else(|| self.namespace.clone())
    }

    fn repository_for<K>(&self, obj: &K) -> KubeRepository<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        self.namespaced(&self.namespace_of(obj))
    }

    async fn apply<K>(&self, desired: K) -> Result<K>
    where
        K: Reconcile + Resource<Scope = NamespaceResourceScope>,
    {
        let repo = self.repository_for(&desired);
        create_or_update(&repo, desired).await
    }

    async fn apply_cluster<K>(&self, desired: K) -> Result<K>
    where
        K: Reconcile + Resource<Scope = ClusterResourceScope>,
    {
        create_or_update(&self.cluster::<K>(), desired).await
    }

    async fn create_if_absent<K>(&self, desired: K) -> Result<()>
    where
        K: KubeObject + Resource<Scope = NamespaceResourceScope>,
    {
        let repo = self.repository_for(&desired);
        create_if_not_exists(&repo, desired).await.map(drop)
    }

    /// List-and-watch `K` in the managed namespace
    pub fn watch<K>(
        &self,
        config: watcher::Config,
    ) -> impl Stream<Item = watcher::Result<Event<K>>> + Send
    where
        K: KubeObject + Resource<Scope = NamespaceResourceScope>,
    {
        watcher(Api::namespaced(self.client.clone(), &self.namespace), config)
    }

    /// List-and-watch the `ConfigMap`s in the managed namespace
    pub fn config_map_watch(&self) -> impl Stream<Item = watcher::Result<Event<ConfigMap>>> + Send {
        self.watch(watcher::Config::default())
    }

    /// Wait until the prometheus-operator's definitions are established and usable
    ///
    /// Usable means `Prometheus`, `Alertmanager` and `ServiceMonitor` objects can
    /// be listed in the managed namespace.
    pub async fn wait_for_prometheus_operator_crds_ready(&self) -> Result<()> {
        wait::wait_for_operator_crds(
            &self.cluster::<CustomResourceDefinition>(),
            &self.namespaced::<Prometheus>(&self.namespace),
            &self.namespaced::<Alertmanager>(&self.namespace),
            &self.namespaced::<ServiceMonitor>(&self.namespace),
            &self.cancel,
        )
        .await
    }

    /// Create or update a `Deployment`, then wait for it to roll out
    pub async fn create_or_update_deployment(&self, deployment: Deployment) -> Result<()> {
        let repo = self.repository_for(&deployment);
        let applied = create_or_update(&repo, deployment).await?;
        wait::wait_for_deployment_rollout(&repo, &applied.name_any(), &self.cancel).await
    }

    /// Wait for a `Deployment` to roll out
    pub async fn wait_for_deployment_rollout(&self, deployment: &Deployment) -> Result<()> {
        let repo = self.repository_for(deployment);
        wait::wait_for_deployment_rollout(&repo, &deployment.name_any(), &self.cancel).await
    }

    /// Delete a `Deployment` and, in the foreground, its pods
    pub async fn delete_deployment(&self, deployment: &Deployment) -> Result<()> {
        self.repository_for(deployment).delete(&deployment.name_any()).await
    }

    /// Create or update a `DaemonSet`, then wait for it to roll out
    pub async fn create_or_update_daemonset(&self, daemonset: DaemonSet) -> Result<()> {
        let repo = self.repository_for(&daemonset);
        let applied = create_or_update(&repo, daemonset).await?;
        wait::wait_for_daemonset_rollout(&repo, &applied.name_any(), &self.cancel).await
    }

    /// Wait for a `DaemonSet` to roll out
    pub async fn wait_for_daemonset_rollout(&self, daemonset: &DaemonSet) -> Result<()> {
        let repo = self.repository_for(daemonset);
        wait::wait_for_daemonset_rollout(&repo, &daemonset.name_any(), &self.cancel).await
    }

    /// Delete a `DaemonSet` and, in the foreground, its pods
    pub async fn delete_daemonset(&self, daemonset: &DaemonSet) -> Result<()> {
        self.repository_for(daemonset).delete(&daemonset.name_any()).await
    }

    /// Create or update a `Secret`
    pub async fn create_or_update_secret(&self, secret: Secret) -> Result<()> {
        self.apply(secret).await.map(drop)
    }

    /// Create a `Secret` unless it exists
    pub async fn create_if_not_exist_secret(&self, secret: Secret) -> Result<()> {
        self.create_if_absent(secret).await
    }

    /// Create or update a `ConfigMap`
    pub async fn create_or_update_config_map(&self, config_map: ConfigMap) -> Result<()> {
        self.apply(config_map).await.map(drop)
    }

    /// Create or update several `ConfigMap`s in order, stopping at the first failure
    pub async fn create_or_update_config_map_list(
        &self,
        config_maps: impl IntoIterator<Item = ConfigMap>,
    ) -> Result<()> {
        for config_map in config_maps {
            self.create_or_update_config_map(config_map).await?;
        }
        Ok(())
    }

    /// Create a `ConfigMap` unless it exists
    pub async fn create_if_not_exist_config_map(&self, config_map: ConfigMap) -> Result<()> {
        self.create_if_absent(config_map).await
    }

    /// Create or update a `Service`, keeping its allocated cluster IP
    pub async fn create_or_update_service(&self, service: Service) -> Result<()> {
        self.apply(service).await.map(drop)
    }

    /// Create or update an `Endpoints`
    pub async fn create_or_update_endpoints(&self, endpoints: Endpoints) -> Result<()> {
        self.apply(endpoints).await.map(drop)
    }

    /// Create a `ServiceAccount`; existing accounts are never updated
    pub async fn create_or_update_service_account(&self, account: ServiceAccount) -> Result<()> {
        self.apply(account).await.map(drop)
    }

    /// Create or update a `Role`
    pub async fn create_or_update_role(&self, role: Role) -> Result<()> {
        self.apply(role).await.map(drop)
    }

    /// Create or update a `RoleBinding`
    pub async fn create_or_update_role_binding(&self, binding: RoleBinding) -> Result<()> {
        self.apply(binding).await.map(drop)
    }

    /// Create or update a `ClusterRole`
    pub async fn create_or_update_cluster_role(&self, role: ClusterRole) -> Result<()> {
        self.apply_cluster(role).await.map(drop)
    }

    /// Create or update a `ClusterRoleBinding`
    pub async fn create_or_update_cluster_role_binding(&self, binding: ClusterRoleBinding) -> Result<()> {
        self.apply_cluster(binding).await.map(drop)
    }

    /// Create or update a `CustomResourceDefinition`
    pub async fn create_or_update_crd(&self, crd: CustomResourceDefinition) -> Result<()> {
        self.apply_cluster(crd).await.map(drop)
    }

    /// Wait for a `CustomResourceDefinition` to be established
    pub async fn wait_for_crd_ready(&self, crd: &CustomResourceDefinition) -> Result<()> {
        let repo = self.cluster::<CustomResourceDefinition>();
        wait::wait_for_crd_established(&repo, &crd.name_any(), &self.cancel).await
    }

    /// Create or update an `Ingress`
    pub async fn create_or_update_ingress(&self, ingress: Ingress) -> Result<()> {
        self.apply(ingress).await.map(drop)
    }

    /// Create a `Route` unless it exists
    pub async fn create_route_if_not_exists(&self, route: Route) -> Result<()> {
        self.create_if_absent(route).await
    }

    /// Wait for a `Route` to be admitted, returning the host it is reachable on
    pub async fn wait_for_route_ready(&self, route: &Route) -> Result<String> {
        let repo = self.repository_for(route);
        wait::wait_for_route_admitted(&repo, &route.name_any(), &self.cancel).await
    }

    /// Create or update a `ServiceMonitor`
    pub async fn create_or_update_service_monitor(&self, monitor: ServiceMonitor) -> Result<()> {
        self.apply(monitor).await.map(drop)
    }

    /// Delete a `ServiceMonitor`
    pub async fn delete_service_monitor(&self, namespace: &str, name: &str) -> Result<()> {
        self.namespaced::<ServiceMonitor>(namespace).delete(name).await
    }

    /// Create or update a `PrometheusRule`
    pub async fn create_or_update_prometheus_rule(&self, rule: PrometheusRule) -> Result<()> {
        self.apply(rule).await.map(drop)
    }

    /// Create or update a `Prometheus`
    pub async fn create_or_update_prometheus(&self, prometheus: Prometheus) -> Result<()> {
        self.apply(prometheus).await.map(drop)
    }

    /// Wait for every replica of a `Prometheus` to be updated and available
    pub async fn wait_for_prometheus(&self, prometheus: &Prometheus) -> Result<()> {
        self.wait_for_replicas(prometheus).await
    }

    /// Delete a `Prometheus` and wait until its pods are gone
    pub async fn delete_prometheus(&self, prometheus: &Prometheus) -> Result<()> {
        let ns = self.namespace_of(prometheus);
        delete_and_wait_for_pods(
            &self.namespaced::<Prometheus>(&ns),
            &self.namespaced::<Pod>(&ns),
            &prometheus.name_any(),
            &self.cancel,
        )
        .await
    }

    /// Create or update an `Alertmanager`
    pub async fn create_or_update_alertmanager(&self, alertmanager: Alertmanager) -> Result<()> {
        self.apply(alertmanager).await.map(drop)
    }

    /// Wait for every replica of an `Alertmanager` to be updated and available
    pub async fn wait_for_alertmanager(&self, alertmanager: &Alertmanager) -> Result<()> {
        self.wait_for_replicas(alertmanager).await
    }

    async fn wait_for_replicas<K>(&self, obj: &K) -> Result<()>
    where
        K: ReplicatedSet + Resource<Scope = NamespaceResourceScope>,
    {
        let ns = self.namespace_of(obj);
        wait::wait_for_replicas::<K, _, _, _>(
            &self.namespaced::<K>(&ns),
            &self.namespaced::<Pod>(&ns),
            &self.namespaced::<StatefulSet>(&ns),
            &obj.name_any(),
            &self.cancel,
        )
        .await
    }
}
