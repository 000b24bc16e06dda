// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Query cache entries and the handles subscribers observe them through.

use std::{any::Any, fmt, marker::PhantomData, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    ErrorInfo, ProcedureKind, QueryKey, QueryProcedure, QueryState, QueryStatus, Transport,
    telemetry::{QueryActivity, Telemetry},
    transport,
};

/// One cached query: the single writer of its [`QueryState`].
///
/// The generation counter orders fetches by issue time. A fetch only publishes its result if no
/// later fetch has been issued for the same entry, and the check and the publish happen under
/// the same lock as the bump.
pub(crate) struct Entry<P: QueryProcedure, T> {
    key: QueryKey,
    input: P::Input,
    transport: Arc<T>,
    telemetry: Telemetry,
    generation: Mutex<u64>,
    sender: watch::Sender<QueryState<P::Output>>,
    _procedure: PhantomData<fn() -> P>,
}

impl<P, T> Entry<P, T>
where
    P: QueryProcedure,
    T: Transport,
{
    pub(crate) fn new(key: QueryKey, input: P::Input, transport: Arc<T>, telemetry: Telemetry) -> Arc<Self> {
        let (sender, _) = watch::channel(QueryState::Idle);
        Arc::new(Self {
            key,
            input,
            transport,
            telemetry,
            generation: Mutex::new(0),
            sender,
            _procedure: PhantomData,
        })
    }

    pub(crate) fn handle(self: &Arc<Self>) -> QueryHandle<P::Output> {
        QueryHandle {
            key: Some(self.key.clone()),
            receiver: self.sender.subscribe(),
            entry: Some(Arc::clone(self) as Arc<dyn ErasedEntry>),
        }
    }

    pub(crate) fn state(&self) -> QueryState<P::Output> {
        self.sender.borrow().clone()
    }

    /// Moves the entry to loading and issues a fetch that supersedes any fetch still in flight.
    pub(crate) fn fetch(self: &Arc<Self>) -> JoinHandle<()> {
        let issued = {
            let mut generation = self.generation.lock();
            *generation += 1;
            self.sender.send_replace(QueryState::Loading);
            *generation
        };

        let entry = Arc::clone(self);
        tokio::spawn(async move {
            let call = transport::call::<P, T>(&*entry.transport, ProcedureKind::Query, &entry.input);
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(output)) => entry.settle(issued, Ok(output), QueryActivity::Succeeded),
                Ok(Err(error)) => entry.settle(issued, Err(error), QueryActivity::Failed),
                Err(panic) => {
                    let error = ErrorInfo::internal(format!("fetching '{}' panicked", entry.key));
                    entry.settle(issued, Err(error), QueryActivity::Panicked);
                    std::panic::resume_unwind(panic);
                }
            }
        })
    }

    fn settle(&self, issued: u64, outcome: crate::Result<P::Output>, activity: QueryActivity) {
        let generation = self.generation.lock();
        if *generation != issued {
            self.telemetry.query(P::PATH, &self.key, QueryActivity::Superseded, None);
            return;
        }

        self.telemetry.query(P::PATH, &self.key, activity, outcome.as_ref().err());
        self.sender.send_replace(QueryState::settle(outcome));
    }
}

/// Type-erased view of an entry, used by key-based operations that do not know the procedure.
pub(crate) trait ErasedEntry: Send + Sync {
    fn key(&self) -> &QueryKey;

    fn refetch(self: Arc<Self>) -> JoinHandle<()>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<P, T> ErasedEntry for Entry<P, T>
where
    P: QueryProcedure,
    T: Transport,
{
    fn key(&self) -> &QueryKey {
        &self.key
    }

    fn refetch(self: Arc<Self>) -> JoinHandle<()> {
        self.telemetry.query(P::PATH, &self.key, QueryActivity::Invalidated, None);
        self.fetch()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A subscription to one query cache entry.
///
/// The handle always exposes the entry's current state and can wait for changes. Any number of
/// handles may observe the same entry; none of them can write to it directly, but any of them
/// can ask the cache to [`refetch`](Self::refetch).
#[derive(Clone)]
pub struct QueryHandle<V> {
    key: Option<QueryKey>,
    receiver: watch::Receiver<QueryState<V>>,
    entry: Option<Arc<dyn ErasedEntry>>,
}

impl<V: fmt::Debug> fmt::Debug for QueryHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("key", &self.key)
            .field("state", &*self.receiver.borrow())
            .finish_non_exhaustive()
    }
}

impl<V: Clone> QueryHandle<V> {
    /// A handle that is not backed by a cache entry, used when no key could be built.
    pub(crate) fn detached(error: ErrorInfo) -> Self {
        let (_, receiver) = watch::channel(QueryState::Error(error));
        Self {
            key: None,
            receiver,
            entry: None,
        }
    }

    /// Returns the key of the observed entry, or `None` if the handle is not backed by one.
    #[must_use]
    pub fn key(&self) -> Option<&QueryKey> {
        self.key.as_ref()
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> QueryState<V> {
        self.receiver.borrow().clone()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> QueryStatus {
        self.receiver.borrow().status()
    }

    /// Returns the current data, present only when the status is success.
    #[must_use]
    pub fn data(&self) -> Option<V> {
        self.receiver.borrow().data().cloned()
    }

    /// Returns the current error, present only when the status is error.
    #[must_use]
    pub fn error(&self) -> Option<ErrorInfo> {
        self.receiver.borrow().error().cloned()
    }

    /// Invalidates the observed entry, exactly like [`Client::invalidate`](crate::Client::invalidate)
    /// with this handle's key.
    ///
    /// Detached handles have nothing to refetch and return an empty [`Invalidation`].
    pub fn refetch(&self) -> Invalidation {
        Invalidation::new(self.entry.iter().map(|entry| Arc::clone(entry).refetch()).collect())
    }

    /// Waits until the state changes after the last observation.
    ///
    /// Returns `false` if the entry can no longer change.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Waits until the latest fetch has settled and returns the settled state.
    ///
    /// Returns immediately if the entry is already settled.
    pub async fn settled(&mut self) -> QueryState<V> {
        if let Ok(state) = self.receiver.wait_for(QueryState::is_settled).await {
            return (*state).clone();
        }

        // The entry is gone; report whatever was last published.
        self.state()
    }
}

/// Refetches started by an invalidation.
///
/// The entries move to loading and their fetches are issued as soon as the invalidation is
/// requested. Awaiting this value waits until those fetches have settled; dropping it does not
/// cancel them.
#[derive(Debug, Default)]
pub struct Invalidation {
    fetches: Vec<JoinHandle<()>>,
}

impl Invalidation {
    pub(crate) fn new(fetches: Vec<JoinHandle<()>>) -> Self {
        Self { fetches }
    }

    /// Returns how many entries were invalidated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fetches.len()
    }

    /// Returns `true` if no entry matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fetches.is_empty()
    }
}

impl IntoFuture for Invalidation {
    type Output = ();
    type IntoFuture = BoxFuture<'static, ()>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            for fetch in self.fetches {
                if let Err(error) = fetch.await {
                    tracing::error!(error = %error, "query fetch task failed");
                }
            }
        })
    }
}
