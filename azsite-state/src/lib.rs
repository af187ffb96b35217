//! Azsite State Management
//!
//! Persists what each run converged so the next run can diff against it.
//!
//! # Overview
//!
//! - **StateFile**: every registered resource of one stack, in registration order
//! - **ResourceState**: one component resource with its inputs, outputs and child resources
//! - **StateBackend**: storage for state files with locking
//! - **LockInfo**: who holds the state and for what
//!
//! # Example
//!
//! ```ignore
//! use azsite_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local("azsite.state.json")).await?;
//! let lock = backend.acquire_lock("up", "dev").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... converge resources, upsert them into `state` ...
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ChildState, ResourceState, StateFile};
