//! Runtime adapters for executing invocations as runtime tasks.

pub mod tokio_spawner;

pub use tokio_spawner::{SpawnedInvocation, TokioSpawner};
