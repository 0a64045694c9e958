//! Converge Kubernetes objects to a desired state and wait for them to become ready.
//!
//! # Overview
//!
//! The crate is layered:
//!
//! - [`repository`] with the per-kind [`Repository`] seam and [`KubeRepository`] over [`kube::Api`]
//! - [`reconcile`] with the generic [`create_or_update`] and the per-kind [`Reconcile`] policy
//! - [`poll`] with the deadline poller [`poll_until`], which tells readiness apart from
//!   permanent failure, timeout and cancellation
//! - [`conditions`] with pure readiness predicates, and [`wait`] / [`delete`] combining them with the poller
//! - [`status`] with replica counting for prometheus-operator managed kinds
//! - [`client`] with the [`Client`] tying it all together for a single managed namespace
//!
//! # Example
//!
//! ```no_run
//! use k8s_openapi::api::apps::v1::Deployment;
//! use kube_converge::Client;
//!
//! # async fn wrapper(deployment: Deployment) -> kube_converge::Result<()> {
//! let client = Client::try_default("openshift-monitoring").await?;
//! // creates or replaces the deployment, then waits up to 5 minutes for the rollout
//! client.create_or_update_deployment(deployment).await?;
//! # Ok(())
//! # }
//! ```
pub mod client;
pub mod conditions;
pub mod delete;
pub mod error;
pub mod poll;
pub mod reconcile;
pub mod repository;
pub mod resources;
pub mod status;
pub mod wait;

#[cfg(test)]
mod test_utils;

pub use client::Client;
pub use error::{Error, Result};
pub use poll::{poll_until, Schedule, Verdict};
pub use reconcile::{create_if_not_exists, create_or_update, Reconcile, UpdatePolicy};
pub use repository::{KubeObject, KubeRepository, ObjectId, Repository, Selection};
pub use resources::{Alertmanager, Prometheus, PrometheusRule, Route, ServiceMonitor};
