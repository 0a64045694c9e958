//! Kinds served by OpenShift and the prometheus-operator
//!
//! Their schemas are owned by the projects that install them, so only the
//! fields this crate inspects are typed. Everything else in `spec` is kept in
//! `rest` and round-trips untouched.
use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Spec of an OpenShift `Route`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    status = "RouteStatus",
    schema = "disabled"
)]
pub struct RouteSpec {
    /// Externally reachable host name, assigned by the router when left empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Remaining spec fields
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

/// Status of an OpenShift `Route`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RouteStatus {
    /// One entry per router that has seen the route
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

/// A router's view of a `Route`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    /// Host the router exposes the route on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Name of the router
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_name: Option<String>,
    /// Admission conditions
    #[serde(default)]
    pub conditions: Vec<RouteIngressCondition>,
}

/// A condition on a [`RouteIngress`], e.g. `Admitted`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RouteIngressCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`
    pub status: String,
    /// Machine readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Spec of a prometheus-operator `Prometheus`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "Prometheus",
    plural = "prometheuses",
    namespaced,
    status = "MonitoringStatus",
    schema = "disabled"
)]
pub struct PrometheusSpec {
    /// Number of instances to run, defaults to 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Remaining spec fields
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

/// Spec of a prometheus-operator `Alertmanager`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "Alertmanager",
    namespaced,
    status = "MonitoringStatus",
    schema = "disabled"
)]
pub struct AlertmanagerSpec {
    /// Number of instances to run, defaults to 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Remaining spec fields
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

/// Replica counts the prometheus-operator publishes for `Prometheus` and `Alertmanager`
///
/// This may lag behind the pods; readiness uses
/// [`fetch_replica_status`](crate::status::fetch_replica_status) instead.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStatus {
    /// Whether reconciliation is paused
    #[serde(default)]
    pub paused: bool,
    /// Total pods targeted
    #[serde(default)]
    pub replicas: i32,
    /// Pods running the desired version
    #[serde(default)]
    pub updated_replicas: i32,
    /// Pods ready for at least `minReadySeconds`
    #[serde(default)]
    pub available_replicas: i32,
    /// Pods not ready
    #[serde(default)]
    pub unavailable_replicas: i32,
}

/// Spec of a prometheus-operator `ServiceMonitor`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "ServiceMonitor",
    namespaced,
    schema = "disabled"
)]
pub struct ServiceMonitorSpec {
    /// Spec fields
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

/// Spec of a prometheus-operator `PrometheusRule`
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "PrometheusRule",
    namespaced,
    schema = "disabled"
)]
pub struct PrometheusRuleSpec {
    /// Spec fields
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;
    use serde_json::json;

    #[test]
    fn prometheus_keeps_unknown_spec_fields() {
        let p: Prometheus = serde_json::from_value(json!({
            "apiVersion": "monitoring.coreos.com/v1",
            "kind": "Prometheus",
            "metadata": { "name": "k8s", "namespace": "monitoring" },
            "spec": {
                "replicas": 2,
                "retention": "15d",
                "ruleSelector": { "matchLabels": { "role": "alert-rules" } }
            }
        }))
        .unwrap();
        assert_eq!(p.spec.replicas, Some(2));

        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["spec"]["retention"], "15d");
        assert_eq!(back["spec"]["ruleSelector"]["matchLabels"]["role"], "alert-rules");
    }

    #[test]
    fn kinds_resolve_to_their_groups() {
        assert_eq!(Route::api_version(&()), "route.openshift.io/v1");
        assert_eq!(Prometheus::plural(&()), "prometheuses");
        assert_eq!(Alertmanager::plural(&()), "alertmanagers");
        assert_eq!(ServiceMonitor::plural(&()), "servicemonitors");
    }
}
