// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The client: one transport paired with one query cache.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{
    ErrorInfo, Invalidation, Mutation, MutationProcedure, QueryHandle, QueryKey, QueryProcedure, QueryState, Transport,
    query::{Entry, ErasedEntry},
    telemetry::{QueryActivity, Telemetry},
};

const DEFAULT_NAME: &str = "rpc_query";

/// A typed RPC client with a query cache.
///
/// The client pairs one [`Transport`] with one cache of query results. Create it once at startup
/// and hand clones to every consumer; clones share the transport and the cache.
///
/// Queries issued through [`query`](Self::query) are deduplicated per [`QueryKey`]: concurrent
/// subscribers to the same key observe the same entry and share one in-flight fetch. Entries are
/// only ever written by the cache itself; callers request changes through
/// [`invalidate`](Self::invalidate) and its variants.
///
/// # Examples
///
/// ```
/// use rpc_query::{Client, Procedure, QueryProcedure, QueryStatus, RpcError, RpcRequest, Transport};
/// use serde_json::json;
///
/// struct Greeter;
///
/// impl Transport for Greeter {
///     async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError> {
///         Ok(json!(format!("hello {}", request.input())))
///     }
/// }
///
/// struct Greet;
///
/// impl Procedure for Greet {
///     const PATH: &'static str = "greet";
///     type Input = String;
///     type Output = String;
/// }
///
/// impl QueryProcedure for Greet {}
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let client = Client::new(Greeter);
/// let mut greeting = client.query::<Greet>("world".to_string());
/// assert_eq!(greeting.status(), QueryStatus::Loading);
///
/// let state = greeting.settled().await;
/// assert_eq!(state.data().map(String::as_str), Some("hello \"world\""));
/// # });
/// ```
pub struct Client<T> {
    inner: Arc<ClientInner<T>>,
}

struct ClientInner<T> {
    transport: Arc<T>,
    telemetry: Telemetry,
    name: &'static str,
    entries: Mutex<HashMap<QueryKey, Arc<dyn ErasedEntry>>>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.inner.name)
            .field("entries", &self.inner.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client with default settings.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }

    /// Creates a builder for configuring a client.
    ///
    /// # Examples
    ///
    /// ```
    /// # use rpc_query::{Client, RpcError, RpcRequest, Transport};
    /// # struct Offline;
    /// # impl Transport for Offline {
    /// #     async fn call(&self, _: RpcRequest) -> Result<serde_json::Value, RpcError> {
    /// #         Err(RpcError::Transport("offline".into()))
    /// #     }
    /// # }
    /// let client = Client::builder(Offline).name("posts").logging(false).build();
    /// assert_eq!(client.name(), "posts");
    /// ```
    #[must_use]
    pub fn builder(transport: T) -> ClientBuilder<T> {
        ClientBuilder::new(transport)
    }

    /// Returns the name used to identify this client in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub(crate) fn shared_transport(&self) -> Arc<T> {
        Arc::clone(&self.inner.transport)
    }

    pub(crate) fn telemetry(&self) -> Telemetry {
        self.inner.telemetry
    }

    /// Subscribes to the result of a query procedure.
    ///
    /// If no entry exists for the key, one is created in loading state and a fetch is issued.
    /// Otherwise the returned handle observes the existing entry and no new fetch is issued.
    /// Failures, including inputs that cannot be encoded, surface as an error state on the
    /// handle rather than as a return value.
    pub fn query<P: QueryProcedure>(&self, input: P::Input) -> QueryHandle<P::Output> {
        let key = match QueryKey::new::<P>(&input) {
            Ok(key) => key,
            Err(error) => return QueryHandle::detached(error),
        };

        let mut entries = self.inner.entries.lock();
        if let Some(existing) = entries.get(&key) {
            return match Arc::clone(existing).into_any().downcast::<Entry<P, T>>() {
                Ok(entry) => {
                    self.inner.telemetry.query(P::PATH, &key, QueryActivity::Joined, None);
                    entry.handle()
                }
                Err(_) => QueryHandle::detached(mismatch::<P>()),
            };
        }

        let entry = Entry::<P, T>::new(key.clone(), input, self.shared_transport(), self.inner.telemetry);
        entries.insert(key.clone(), Arc::clone(&entry) as Arc<dyn ErasedEntry>);
        self.inner.telemetry.query(P::PATH, &key, QueryActivity::Created, None);

        // Issued under the lock so that no subscriber ever joins an idle entry.
        drop(entry.fetch());
        drop(entries);

        entry.handle()
    }

    /// Returns the current state of a cached query without subscribing or fetching.
    ///
    /// Returns `None` if nothing has subscribed to the key yet.
    #[must_use]
    pub fn peek<P: QueryProcedure>(&self, input: &P::Input) -> Option<QueryState<P::Output>> {
        let key = QueryKey::new::<P>(input).ok()?;
        let existing = self.inner.entries.lock().get(&key).cloned()?;
        existing.into_any().downcast::<Entry<P, T>>().ok().map(|entry| entry.state())
    }

    /// Discards the cached result for `key` and fetches it again.
    ///
    /// The entry moves to loading and the fetch is issued before this method returns. If an
    /// earlier fetch for the key is still in flight, its result is ignored when it arrives.
    /// Await the returned [`Invalidation`] to wait for the new fetch. Unknown keys are ignored.
    pub fn invalidate(&self, key: &QueryKey) -> Invalidation {
        let entry = self.inner.entries.lock().get(key).cloned();
        Invalidation::new(entry.into_iter().map(ErasedEntry::refetch).collect())
    }

    /// Invalidates every cached key of the query procedure `P`.
    pub fn invalidate_procedure<P: QueryProcedure>(&self) -> Invalidation {
        self.invalidate_matching(|key| key.procedure() == P::PATH)
    }

    /// Invalidates every cached key.
    pub fn invalidate_all(&self) -> Invalidation {
        self.invalidate_matching(|_| true)
    }

    fn invalidate_matching(&self, predicate: impl Fn(&QueryKey) -> bool) -> Invalidation {
        let matching: Vec<_> = self
            .inner
            .entries
            .lock()
            .values()
            .filter(|entry| predicate(entry.key()))
            .cloned()
            .collect();

        Invalidation::new(matching.into_iter().map(ErasedEntry::refetch).collect())
    }

    /// Creates an executor for the mutation procedure `P`.
    #[must_use]
    pub fn mutation<P: MutationProcedure>(&self) -> Mutation<P, T> {
        Mutation::new(self.clone())
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

fn mismatch<P: QueryProcedure>() -> ErrorInfo {
    ErrorInfo::internal(format!("procedure '{}' is cached with a different output type", P::PATH))
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder<T> {
    transport: T,
    name: &'static str,
    logging: bool,
}

impl<T: Transport> ClientBuilder<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            name: DEFAULT_NAME,
            logging: true,
        }
    }

    /// Sets the name that identifies the client in logs.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Enables or disables structured log events. Enabled by default.
    #[must_use]
    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Builds the client.
    #[must_use]
    pub fn build(self) -> Client<T> {
        Client {
            inner: Arc::new(ClientInner {
                transport: Arc::new(self.transport),
                telemetry: Telemetry::new(self.name, self.logging),
                name: self.name,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }
}
