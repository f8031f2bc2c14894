//! # Implementation Table
//!
//! The local functions an endpoint exposes to its peer, keyed by method name.
//! The table is frozen into the endpoint when it is built.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::fault::Fault;
use crate::metadata::Annotated;
use crate::metadata::Metadata;
use crate::value::FromValue;
use crate::value::Value;

static UNDEFINED: Value = Value::Undefined;

/// A type-erased local function.
pub type Implementation =
    Arc<dyn Fn(Invocation) -> BoxFuture<'static, Result<Annotated, Fault>> + Send + Sync>;

/// An incoming call as seen by an implementation.
#[derive(Clone, Debug)]
pub struct Invocation {
    method: String,
    args: Vec<Annotated>,
}

impl Invocation {
    pub fn new(method: impl Into<String>, args: Vec<Annotated>) -> Self {
        Self { method: method.into(), args }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> &[Annotated] {
        &self.args
    }

    /// The argument at `index`, or `Undefined` if the caller passed fewer.
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).map_or(&UNDEFINED, |arg| &arg.value)
    }

    /// The annotation attached to the argument at `index`.
    pub fn metadata(&self, index: usize) -> Option<&Metadata> {
        self.args.get(index).and_then(Annotated::metadata)
    }

    /// Extracts a typed argument, failing the call if it has the wrong shape.
    pub fn arg_as<T: FromValue>(&self, index: usize) -> Result<T, Fault> {
        let value = self.arg(index).clone();
        let found = value.kind();
        T::from_value(value).ok_or_else(|| {
            Fault::new(format!(
                "argument {} of '{}' should be {}, found {}",
                index,
                self.method,
                std::any::type_name::<T>(),
                found
            ))
        })
    }

    pub fn into_args(self) -> Vec<Annotated> {
        self.args
    }
}

/// Method name to local function.
#[derive(Clone, Default)]
pub struct Implementations {
    methods: HashMap<String, Implementation>,
}

impl Implementations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method, builder style. A later registration under the same name wins.
    pub fn register<F, Fut, R>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Fault>> + Send + 'static,
        R: Into<Annotated>,
    {
        self.insert(name, f);
        self
    }

    pub fn insert<F, Fut, R>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Fault>> + Send + 'static,
        R: Into<Annotated>,
    {
        let erased: Implementation = Arc::new(move |invocation| {
            f(invocation).map(|result| result.map(Into::into)).boxed()
        });
        self.methods.insert(name.into(), erased);
    }

    pub fn get(&self, name: &str) -> Option<&Implementation> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

impl fmt::Debug for Implementations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Implementations").field("methods", &names).finish()
    }
}
