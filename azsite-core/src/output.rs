//! Deferred outputs
//!
//! A registration yields one `Resolution` per resource: a write-once,
//! read-many cell holding either the outputs the provider reported or the
//! reason it failed. `Output<T>` is a typed view onto one field of it.
//! Readers suspend until the cell is written; a `Resolver` that is dropped
//! without writing marks the resource abandoned so readers never hang.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::OutputError;
use crate::resource::PropertyMap;

type Slot = Option<Result<Arc<PropertyMap>, OutputError>>;

type Extract<T> = dyn Fn(&str, &PropertyMap) -> Result<T, OutputError> + Send + Sync;

/// Create a linked resolver/resolution pair for the resource `urn`
pub fn resolution(urn: impl Into<String>) -> (Resolver, Resolution) {
    let urn = urn.into();
    let (tx, rx) = watch::channel(None);
    (
        Resolver {
            tx: Some(tx),
            urn: urn.clone(),
        },
        Resolution { rx, urn },
    )
}

/// Write side of a resource's outputs. Consumed by `resolve`.
pub struct Resolver {
    tx: Option<watch::Sender<Slot>>,
    urn: String,
}

impl Resolver {
    pub fn urn(&self) -> &str {
        &self.urn
    }

    /// Publish the outcome of convergence to every reader
    pub fn resolve(mut self, outcome: Result<PropertyMap, OutputError>) {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome.map(Arc::new)));
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            log::debug!("{} dropped without resolving", self.urn);
            tx.send_replace(Some(Err(OutputError::Abandoned {
                urn: self.urn.clone(),
            })));
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("urn", &self.urn)
            .field("resolved", &self.tx.is_none())
            .finish()
    }
}

/// Read side of a resource's outputs
#[derive(Clone)]
pub struct Resolution {
    rx: watch::Receiver<Slot>,
    urn: String,
}

impl Resolution {
    pub fn urn(&self) -> &str {
        &self.urn
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the outputs as a whole
    pub async fn wait(&self) -> Result<Arc<PropertyMap>, OutputError> {
        let mut rx = self.rx.clone();
        let slot = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        slot.unwrap_or_else(|| {
            Err(OutputError::Abandoned {
                urn: self.urn.clone(),
            })
        })
    }

    /// Typed view onto the outputs
    pub fn output<T, F>(&self, extract: F) -> Output<T>
    where
        F: Fn(&str, &PropertyMap) -> Result<T, OutputError> + Send + Sync + 'static,
    {
        Output {
            resolution: self.clone(),
            extract: Arc::new(extract),
        }
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("urn", &self.urn)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// A value not known until the owning resource converges
pub struct Output<T> {
    resolution: Resolution,
    extract: Arc<Extract<T>>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            resolution: self.resolution.clone(),
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<T> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("urn", &self.resolution.urn)
            .field("resolved", &self.resolution.is_resolved())
            .finish()
    }
}

impl<T: 'static> Output<T> {
    /// Wait for the owning resource to converge and return the value
    pub async fn get(&self) -> Result<T, OutputError> {
        let outputs = self.resolution.wait().await?;
        (self.extract)(&self.resolution.urn, &outputs)
    }

    /// The value if the resource has already converged
    pub fn try_get(&self) -> Option<Result<T, OutputError>> {
        let slot = self.resolution.rx.borrow().clone();
        slot.map(|outcome| outcome.and_then(|outputs| (self.extract)(&self.resolution.urn, &outputs)))
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_resolved()
    }

    /// Derive another output from this one
    pub fn map<U: 'static, F>(&self, f: F) -> Output<U>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let extract = Arc::clone(&self.extract);
        Output {
            resolution: self.resolution.clone(),
            extract: Arc::new(move |urn: &str, outputs: &PropertyMap| extract(urn, outputs).map(&f)),
        }
    }
}
