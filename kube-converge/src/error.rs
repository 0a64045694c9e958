//! Error handling in [`kube_converge`][crate]
use std::{fmt, time::Duration};

use thiserror::Error;

use crate::repository::{ObjectId, Selection};

/// The remote operation that was in flight when an [`Error::Api`] occurred
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    /// A `get` of a single object
    Retrieving,
    /// A `create` (POST)
    Creating,
    /// An `update` (PUT) carrying a resource version
    Updating,
    /// A foreground-propagation `delete`
    Deleting,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verb::Retrieving => "retrieving",
            Verb::Creating => "creating",
            Verb::Updating => "updating",
            Verb::Deleting => "deleting",
        })
    }
}

/// Possible errors when converging objects
#[derive(Error, Debug)]
pub enum Error {
    /// A call to the Kubernetes API failed
    ///
    /// Every remote failure is wrapped exactly once, at the repository boundary,
    /// with the operation and the object it targeted.
    #[error("{verb} {object} failed: {source}")]
    Api {
        /// What was being attempted
        verb: Verb,
        /// The object it was attempted on
        object: ObjectId,
        /// The underlying client error
        #[source]
        source: kube::Error,
    },

    /// Listing objects from the Kubernetes API failed
    #[error("listing {selection} failed: {source}")]
    List {
        /// The kind, scope and label selector that were listed
        selection: Selection,
        /// The underlying client error
        #[source]
        source: kube::Error,
    },

    /// A `CustomResourceDefinition` will never become established because its names clash
    #[error("CRD naming conflict ({name}): {reason}")]
    NamingConflict {
        /// Name of the rejected definition
        name: String,
        /// Reason reported on the `NamesAccepted` condition
        reason: String,
    },

    /// The object did not become ready before the deadline
    #[error("timed out waiting for {object} after {elapsed:?}")]
    Timeout {
        /// The object that was being waited on
        object: ObjectId,
        /// Time spent waiting
        elapsed: Duration,
        /// The last retried probe failure, if any
        #[source]
        last_error: Option<Box<Error>>,
    },

    /// The wait was cancelled by its caller
    #[error("waiting for {object} was cancelled after {elapsed:?}")]
    Cancelled {
        /// The object that was being waited on
        object: ObjectId,
        /// Time spent waiting before cancellation
        elapsed: Duration,
    },

    /// No client configuration could be inferred
    #[error("failed to infer kubernetes client configuration: {0}")]
    Config(#[source] kube::Error),
}

impl Error {
    /// Wraps a client error with the operation and object it belongs to
    pub(crate) fn api(verb: Verb, object: ObjectId) -> impl FnOnce(kube::Error) -> Self {
        move |source| Error::Api { verb, object, source }
    }

    pub(crate) fn list(selection: Selection) -> impl FnOnce(kube::Error) -> Self {
        move |source| Error::List { selection, source }
    }

    /// Names `object` as the subject of a timeout or cancellation
    pub(crate) fn waiting_on(self, object: ObjectId) -> Self {
        match self {
            Error::Timeout {
                elapsed, last_error, ..
            } => Error::Timeout {
                object,
                elapsed,
                last_error,
            },
            Error::Cancelled { elapsed, .. } => Error::Cancelled { object, elapsed },
            other => other,
        }
    }

    /// Whether a wait ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Whether a wait was aborted because readiness is permanently unreachable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NamingConflict { .. })
    }

    /// Whether a wait was cancelled by its caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Whether an update was rejected because the resource version was stale
    ///
    /// Conflicts are not retried here; callers that want retry-on-conflict
    /// should reconcile again.
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    /// Whether the API reported the object as missing
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Api {
                source: kube::Error::Api(response),
                ..
            }
            | Error::List {
                source: kube::Error::Api(response),
                ..
            } => Some(response.code),
            _ => None,
        }
    }
}

/// Convenient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
