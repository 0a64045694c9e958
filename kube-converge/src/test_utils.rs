//! In-memory [`Repository`] for unit tests
use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{core::ErrorResponse, ResourceExt};
use parking_lot::Mutex;

use crate::{
    error::{Error, Result, Verb},
    repository::{KubeObject, Repository},
};

pub const NAMESPACE: &str = "openshift-monitoring";

pub fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(NAMESPACE.into()),
        ..ObjectMeta::default()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub get: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub list: usize,
}

struct State<K> {
    objects: BTreeMap<String, K>,
    // observed objects handed out by `get` in order, the last one repeats
    gets: VecDeque<Option<K>>,
    // results handed out by `list` in order, the last one repeats
    lists: VecDeque<Vec<K>>,
    failures: BTreeMap<&'static str, VecDeque<u16>>,
    last_update: Option<K>,
    version: u64,
    calls: Calls,
}

pub struct FakeRepository<K> {
    state: Mutex<State<K>>,
}

impl<K: KubeObject> FakeRepository<K> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                gets: VecDeque::new(),
                lists: VecDeque::new(),
                failures: BTreeMap::new(),
                last_update: None,
                version: 0,
                calls: Calls::default(),
            }),
        }
    }

    /// Store an object as if it had been created earlier
    pub fn insert(&self, mut obj: K) {
        let mut state = self.state.lock();
        state.version += 1;
        obj.meta_mut().resource_version = Some(state.version.to_string());
        state.objects.insert(obj.name_any(), obj);
    }

    /// Make successive `get` calls observe these objects, repeating the last
    pub fn script_gets(&self, observed: impl IntoIterator<Item = Option<K>>) {
        self.state.lock().gets = observed.into_iter().collect();
    }

    /// Make successive `list` calls return these results, repeating the last
    pub fn script_lists(&self, results: impl IntoIterator<Item = Vec<K>>) {
        self.state.lock().lists = results.into_iter().collect();
    }

    pub fn fail_next_get(&self, code: u16) {
        self.fail_next("get", code);
    }

    pub fn fail_next_update(&self, code: u16) {
        self.fail_next("update", code);
    }

    pub fn fail_next_list(&self, code: u16) {
        self.fail_next("list", code);
    }

    fn fail_next(&self, verb: &'static str, code: u16) {
        self.state.lock().failures.entry(verb).or_default().push_back(code);
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().calls
    }

    pub fn stored(&self, name: &str) -> Option<K> {
        self.state.lock().objects.get(name).cloned()
    }

    pub fn last_update(&self) -> Option<K> {
        self.state.lock().last_update.clone()
    }

    fn injected(&self, state: &mut State<K>, key: &'static str, verb: Verb, name: &str) -> Result<()> {
        match state.failures.get_mut(key).and_then(VecDeque::pop_front) {
            Some(code) => Err(Error::api(verb, self.object_id(name))(api_error(code))),
            None => Ok(()),
        }
    }
}

fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: format!("injected {code}"),
        reason: match code {
            404 => "NotFound",
            409 => "Conflict",
            _ => "InternalError",
        }
        .into(),
        code,
    })
}

fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn matches_selector<K: KubeObject>(obj: &K, selector: &str) -> bool {
    let labels = obj.labels();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl<K: KubeObject> Repository<K> for FakeRepository<K> {
    fn namespace(&self) -> Option<&str> {
        Some(NAMESPACE)
    }

    async fn get(&self, name: &str) -> Result<Option<K>> {
        let mut state = self.state.lock();
        state.calls.get += 1;
        self.injected(&mut state, "get", Verb::Retrieving, name)?;
        if let Some(observed) = next_scripted(&mut state.gets) {
            return Ok(observed);
        }
        Ok(state.objects.get(name).cloned())
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let name = obj.name_any();
        let mut state = self.state.lock();
        state.calls.create += 1;
        self.injected(&mut state, "create", Verb::Creating, &name)?;
        if state.objects.contains_key(&name) {
            return Err(Error::api(Verb::Creating, self.object_id(&name))(api_error(409)));
        }
        state.version += 1;
        let mut created = obj.clone();
        created.meta_mut().resource_version = Some(state.version.to_string());
        state.objects.insert(name, created.clone());
        Ok(created)
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let name = obj.name_any();
        let mut state = self.state.lock();
        state.calls.update += 1;
        state.last_update = Some(obj.clone());
        self.injected(&mut state, "update", Verb::Updating, &name)?;
        let current = match state.objects.get(&name) {
            Some(current) => current.resource_version(),
            None => return Err(Error::api(Verb::Updating, self.object_id(&name))(api_error(404))),
        };
        if current != obj.resource_version() {
            return Err(Error::api(Verb::Updating, self.object_id(&name))(api_error(409)));
        }
        state.version += 1;
        let mut updated = obj.clone();
        updated.meta_mut().resource_version = Some(state.version.to_string());
        state.objects.insert(name, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.delete += 1;
        self.injected(&mut state, "delete", Verb::Deleting, name)?;
        state.objects.remove(name);
        Ok(())
    }

    async fn list(&self, label_selector: &str) -> Result<Vec<K>> {
        let mut state = self.state.lock();
        state.calls.list += 1;
        if let Some(code) = state.failures.get_mut("list").and_then(VecDeque::pop_front) {
            return Err(Error::list(self.selection(label_selector))(api_error(code)));
        }
        if let Some(items) = next_scripted(&mut state.lists) {
            return Ok(items);
        }
        Ok(state
            .objects
            .values()
            .filter(|obj| matches_selector(*obj, label_selector))
            .cloned()
            .collect())
    }
}
