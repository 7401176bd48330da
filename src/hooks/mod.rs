//! Consumer helpers built only on the public [`ApiClient`](crate::ApiClient)
//! operations.
//!
//! - [`Query`] keeps the latest result of one read and refetches on demand,
//!   aborting whatever fetch it supersedes.
//! - [`Mutation`] runs a write with optional optimistic update, rollback and
//!   cache invalidation.

use std::sync::Arc;

use crate::error::ApiError;

mod mutation;
mod query;

pub use mutation::{Mutation, MutationState};
pub use query::{Query, QueryState};

type ErrorFn = Arc<dyn Fn(&ApiError) + Send + Sync>;
