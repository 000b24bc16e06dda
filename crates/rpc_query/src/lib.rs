// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Typed RPC client with query caching and mutation-driven invalidation.
//!
//! This crate sits between application code and a remote procedure call [`Transport`]. Reads go
//! through a per-client query cache; writes go through [`Mutation`] executors whose success
//! hooks typically invalidate the cached reads they made stale.
//!
//! # Queries
//!
//! A query is addressed by a [`QueryKey`]: the procedure path plus the canonical JSON of its
//! input. [`Client::query`] returns a [`QueryHandle`] observing the entry for that key. The first
//! subscriber creates the entry and issues the fetch; later subscribers join it, so concurrent
//! readers of the same key never cause duplicate calls.
//!
//! Entries move through [`QueryState`]: `Idle`, `Loading`, then `Success` or `Error`. Data and
//! error information are never present at the same time.
//!
//! # Invalidation
//!
//! [`Client::invalidate`] moves an entry back to loading and re-fetches it. The state change
//! happens immediately; awaiting the returned [`Invalidation`] waits for the refetch. When
//! invalidations overlap, only the most recently issued fetch may publish its result.
//!
//! # Mutations
//!
//! ```
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use rpc_query::{Client, MutationProcedure, Procedure, QueryProcedure, RpcError, RpcRequest, Transport};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Counters(AtomicU64);
//!
//! impl Transport for Counters {
//!     async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError> {
//!         match request.procedure() {
//!             "counter.get" => Ok(json!(self.0.load(Ordering::SeqCst))),
//!             "counter.bump" => Ok(json!(self.0.fetch_add(1, Ordering::SeqCst))),
//!             other => Err(RpcError::NotFound(format!("No procedure '{other}'"))),
//!         }
//!     }
//! }
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct IdInput {
//!     id: String,
//! }
//!
//! struct Counter;
//!
//! impl Procedure for Counter {
//!     const PATH: &'static str = "counter.get";
//!     type Input = IdInput;
//!     type Output = u64;
//! }
//!
//! impl QueryProcedure for Counter {}
//!
//! struct Bump;
//!
//! impl Procedure for Bump {
//!     const PATH: &'static str = "counter.bump";
//!     type Input = IdInput;
//!     type Output = u64;
//! }
//!
//! impl MutationProcedure for Bump {}
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let client = Client::new(Counters::default());
//! let mut counter = client.query::<Counter>(IdInput { id: "c1".into() });
//! assert_eq!(counter.settled().await.data(), Some(&0));
//!
//! // Bumping refreshes the counter before the mutation reports success.
//! let bump = client.mutation::<Bump>().invalidates::<Counter, _>(Clone::clone);
//! bump.execute(IdInput { id: "c1".into() }).await.unwrap();
//! assert_eq!(counter.data(), Some(1));
//! # });
//! ```
//!
//! # Logging
//!
//! Clients emit structured [`tracing`] events named `query.event` and `mutation.event`, carrying
//! `rpc.client`, `rpc.procedure`, `rpc.activity` and, for queries, `rpc.key`. Use
//! [`ClientBuilder::logging`] to turn them off.
//!
//! # Features
//!
//! - `test-util`: exposes [`testing::MockTransport`].

mod client;
mod error;
mod mutation;
mod procedure;
mod query;
mod state;
mod telemetry;
#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;
mod transport;

pub use client::{Client, ClientBuilder};
pub use error::{ErrorInfo, ErrorKind, NO_RESPONSE, Result, RpcError};
pub use mutation::Mutation;
pub use procedure::{MutationProcedure, Procedure, ProcedureKind, QueryKey, QueryProcedure, RpcRequest};
pub use query::{Invalidation, QueryHandle};
pub use state::{MutationState, MutationStatus, QueryState, QueryStatus};
pub use transport::Transport;
