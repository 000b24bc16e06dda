// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory stand-in for the post procedures.
//!
//! [`InMemoryPosts`] implements [`Transport`] by serving `post.byId` and `post.resolve` from a
//! map, which makes the page runnable and testable without a server.

use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::Mutex;
use rpc_query::{Procedure, RpcError, RpcRequest, Transport};

use crate::{ById, Post, PostIdInput, Resolve};

type FailRule = Box<dyn Fn(&RpcRequest) -> Option<RpcError> + Send + Sync>;

/// Posts kept in memory and served through the [`Transport`] contract.
///
/// Clones share the same posts. Every call is recorded and failures can be injected with
/// [`fail_when`](Self::fail_when).
///
/// # Examples
///
/// ```
/// use post_view::{ById, memory::InMemoryPosts};
/// use rpc_query::{ErrorKind, Procedure, ProcedureKind, RpcError, RpcRequest, Transport};
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let posts = InMemoryPosts::new();
/// let request = RpcRequest::new(ById::PATH, ProcedureKind::Query, json!({ "id": "p9" }));
///
/// let error = posts.call(request).await.unwrap_err();
/// assert_eq!(error.kind(), ErrorKind::NotFound);
/// assert_eq!(error.to_string(), "No post with id 'p9'");
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryPosts {
    posts: Arc<Mutex<BTreeMap<String, Post>>>,
    calls: Arc<Mutex<Vec<RpcRequest>>>,
    fail_when: Arc<Mutex<Option<FailRule>>>,
}

impl fmt::Debug for InMemoryPosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryPosts")
            .field("posts", &self.posts.lock().len())
            .field("calls", &self.calls.lock().len())
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl InMemoryPosts {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `posts`.
    #[must_use]
    pub fn with_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        let store = Self::new();
        for post in posts {
            store.insert(post);
        }
        store
    }

    /// Inserts or replaces a post.
    pub fn insert(&self, post: Post) {
        self.posts.lock().insert(post.id.clone(), post);
    }

    /// Returns the stored post with `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Post> {
        self.posts.lock().get(id).cloned()
    }

    /// Fails every call for which `rule` returns an error. Failing calls are still recorded.
    pub fn fail_when<F>(&self, rule: F)
    where
        F: Fn(&RpcRequest) -> Option<RpcError> + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(rule));
    }

    /// Stops injecting failures.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RpcRequest> {
        self.calls.lock().clone()
    }

    /// Returns how many calls were made to `procedure`.
    #[must_use]
    pub fn call_count(&self, procedure: &str) -> usize {
        self.calls.lock().iter().filter(|call| call.procedure() == procedure).count()
    }

    fn by_id(&self, input: &PostIdInput) -> Result<serde_json::Value, RpcError> {
        let post = self.get(&input.id).ok_or_else(|| not_found(&input.id))?;
        Ok(serde_json::to_value(post)?)
    }

    fn resolve(&self, input: &PostIdInput) -> Result<serde_json::Value, RpcError> {
        let mut posts = self.posts.lock();
        let post = posts.get_mut(&input.id).ok_or_else(|| not_found(&input.id))?;
        post.resolved = true;
        Ok(serde_json::Value::Null)
    }
}

fn not_found(id: &str) -> RpcError {
    RpcError::NotFound(format!("No post with id '{id}'"))
}

fn decode(request: &RpcRequest) -> Result<PostIdInput, RpcError> {
    request
        .decode_input()
        .map_err(|error| RpcError::Validation(format!("invalid input for '{}': {error}", request.procedure())))
}

impl Transport for InMemoryPosts {
    async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError> {
        self.calls.lock().push(request.clone());

        if let Some(error) = self.fail_when.lock().as_ref().and_then(|rule| rule(&request)) {
            return Err(error);
        }

        match request.procedure() {
            ById::PATH => self.by_id(&decode(&request)?),
            Resolve::PATH => self.resolve(&decode(&request)?),
            other => Err(RpcError::NotFound(format!("No procedure '{other}'"))),
        }
    }
}
