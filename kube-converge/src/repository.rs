//! Typed, per-kind access to the Kubernetes API
//!
//! A [`Repository`] is a stateless façade over one kind in one scope: every method
//! performs exactly one remote call and never retries. Retrying is the job of
//! [`poll_until`](crate::poll::poll_until).
use std::{fmt, marker::PhantomData};

use async_trait::async_trait;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result, Verb};

/// Identity of an object: `(kind, namespace, name)`
///
/// `namespace` is `None` for cluster scoped kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// The object's kind, e.g. `Deployment`
    pub kind: String,
    /// The object's namespace, if it is namespaced
    pub namespace: Option<String>,
    /// The object's name
    pub name: String,
}

impl ObjectId {
    /// Identity of the object named `name` of kind `K`
    pub fn new<K: Resource<DynamicType = ()>>(namespace: Option<&str>, name: &str) -> Self {
        Self {
            kind: K::kind(&()).into_owned(),
            namespace: namespace.map(String::from),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A label-selected set of objects: `(kind, namespace, selector)`
///
/// An empty `selector` selects every object of the kind in scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// The listed kind, e.g. `Pod`
    pub kind: String,
    /// The listed namespace, `None` for cluster scoped kinds
    pub namespace: Option<String>,
    /// The label selector
    pub selector: String,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        if let Some(ns) = &self.namespace {
            write!(f, " in {ns}")?;
        }
        if !self.selector.is_empty() {
            write!(f, " matching {}", self.selector)?;
        }
        Ok(())
    }
}

/// Bounds shared by every statically typed kind this crate handles
pub trait KubeObject:
    Resource<DynamicType = ()> + Clone + fmt::Debug + DeserializeOwned + Serialize + Send + Sync + 'static
{
}

impl<K> KubeObject for K where
    K: Resource<DynamicType = ()> + Clone + fmt::Debug + DeserializeOwned + Serialize + Send + Sync + 'static
{
}

/// Get, create, update, delete and list objects of kind `K`
///
/// Errors are returned already wrapped with the verb and [`ObjectId`].
#[async_trait]
pub trait Repository<K: KubeObject>: Send + Sync {
    /// The namespace this repository is bound to, `None` for cluster scoped kinds
    fn namespace(&self) -> Option<&str>;

    /// Identity of the object named `name` in this repository
    fn object_id(&self, name: &str) -> ObjectId {
        ObjectId::new::<K>(self.namespace(), name)
    }

    /// The objects a `list` with `label_selector` covers
    fn selection(&self, label_selector: &str) -> Selection {
        Selection {
            kind: K::kind(&()).into_owned(),
            namespace: self.namespace().map(String::from),
            selector: label_selector.to_string(),
        }
    }

    /// Fetch an object, returning `Ok(None)` if it does not exist
    async fn get(&self, name: &str) -> Result<Option<K>>;

    /// Create an object, failing if one with the same name exists
    async fn create(&self, obj: &K) -> Result<K>;

    /// Replace an object; `obj` must carry the current resource version
    async fn update(&self, obj: &K) -> Result<K>;

    /// Delete an object with foreground propagation
    ///
    /// Deleting a missing object succeeds.
    async fn delete(&self, name: &str) -> Result<()>;

    /// List objects matching a label selector (empty selects everything)
    async fn list(&self, label_selector: &str) -> Result<Vec<K>>;
}

/// A [`Repository`] backed by [`kube::Api`]
pub struct KubeRepository<K> {
    api: Api<K>,
    namespace: Option<String>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Resource<DynamicType = ()>> KubeRepository<K> {
    /// Repository for a namespaced kind within `ns`
    pub fn namespaced(client: Client, ns: &str) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        Self {
            api: Api::namespaced(client, ns),
            namespace: Some(ns.to_string()),
            _kind: PhantomData,
        }
    }

    /// Repository for a cluster scoped kind
    pub fn cluster(client: Client) -> Self
    where
        K: Resource<Scope = ClusterResourceScope>,
    {
        Self {
            api: Api::all(client),
            namespace: None,
            _kind: PhantomData,
        }
    }

    /// The underlying [`Api`]
    pub fn api(&self) -> &Api<K> {
        &self.api
    }
}

#[async_trait]
impl<K: KubeObject> Repository<K> for KubeRepository<K> {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    async fn get(&self, name: &str) -> Result<Option<K>> {
        tracing::trace!(object = %self.object_id(name), "get");
        self.api
            .get_opt(name)
            .await
            .map_err(Error::api(Verb::Retrieving, self.object_id(name)))
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let id = self.object_id(&obj.name_any());
        tracing::debug!(object = %id, "create");
        self.api
            .create(&PostParams::default(), obj)
            .await
            .map_err(Error::api(Verb::Creating, id))
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let name = obj.name_any();
        let id = self.object_id(&name);
        tracing::debug!(object = %id, resource_version = ?obj.resource_version(), "update");
        self.api
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(Error::api(Verb::Updating, id))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let id = self.object_id(name);
        tracing::debug!(object = %id, "delete");
        match self.api.delete(name, &DeleteParams::foreground()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                tracing::debug!(object = %id, "already gone");
                Ok(())
            }
            Err(err) => Err(Error::api(Verb::Deleting, id)(err)),
        }
    }

    async fn list(&self, label_selector: &str) -> Result<Vec<K>> {
        let lp = if label_selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(label_selector)
        };
        self.api
            .list(&lp)
            .await
            .map(|list| list.items)
            .map_err(Error::list(self.selection(label_selector)))
    }
}
