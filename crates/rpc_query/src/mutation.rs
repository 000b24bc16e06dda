// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mutation execution with success hooks.

use std::{fmt, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::watch;

use crate::{
    Client, ErrorInfo, MutationProcedure, MutationState, MutationStatus, Procedure, ProcedureKind, QueryKey,
    QueryProcedure, Transport,
    telemetry::{MutationActivity, Telemetry},
    transport,
};

type Hook<P> =
    Arc<dyn Fn(<P as Procedure>::Output, <P as Procedure>::Input) -> BoxFuture<'static, ()> + Send + Sync>;

/// Executes one mutation procedure and tracks the state of its latest invocation.
///
/// An invocation moves the state to [`Pending`](MutationState::Pending) as soon as
/// [`execute`](Self::execute) is called. When the call succeeds, every success hook runs in
/// registration order and is awaited; only after the last one completes does the state become
/// [`Success`](MutationState::Success). A failed call publishes [`Error`](MutationState::Error)
/// and runs no hooks.
///
/// Only one invocation runs at a time. A call made while another is pending is rejected with a
/// conflict error and does not disturb the running one. Dropping the future returned by
/// [`execute`](Self::execute) before it completes publishes an internal error, so the mutation
/// never stays pending without an invocation to finish it.
///
/// Clones share state and hooks.
pub struct Mutation<P: MutationProcedure, T> {
    client: Client<T>,
    sender: Arc<watch::Sender<MutationState<P::Output>>>,
    hooks: Vec<Hook<P>>,
}

impl<P: MutationProcedure, T> Clone for Mutation<P, T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            sender: Arc::clone(&self.sender),
            hooks: self.hooks.clone(),
        }
    }
}

impl<P, T> fmt::Debug for Mutation<P, T>
where
    P: MutationProcedure,
    P::Output: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("procedure", &P::PATH)
            .field("state", &*self.sender.borrow())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl<P, T> Mutation<P, T>
where
    P: MutationProcedure,
    T: Transport,
{
    pub(crate) fn new(client: Client<T>) -> Self {
        Self {
            client,
            sender: Arc::new(watch::Sender::new(MutationState::Idle)),
            hooks: Vec::new(),
        }
    }

    /// Registers a hook that runs after every successful call, before success is published.
    ///
    /// Hooks receive the call's output and input and run in registration order.
    #[must_use]
    pub fn on_success<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(P::Output, P::Input) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.push(Arc::new(move |output, input| hook(output, input).boxed()));
        self
    }

    /// Registers a hook that invalidates the `Q` entry whose input is derived from the
    /// mutation input, and waits for its refetch.
    #[must_use]
    pub fn invalidates<Q, F>(self, input: F) -> Self
    where
        Q: QueryProcedure,
        F: Fn(&P::Input) -> Q::Input + Send + Sync + 'static,
    {
        let client = self.client.clone();
        self.on_success(move |_, mutation_input| {
            // An input that cannot be encoded has no cache entry to invalidate.
            let invalidation = QueryKey::new::<Q>(&input(&mutation_input))
                .ok()
                .map(|key| client.invalidate(&key));

            async move {
                if let Some(invalidation) = invalidation {
                    invalidation.await;
                }
            }
        })
    }

    /// Registers a hook that invalidates every cached entry of `Q` and waits for the refetches.
    #[must_use]
    pub fn invalidates_all<Q: QueryProcedure>(self) -> Self {
        let client = self.client.clone();
        self.on_success(move |_, _| client.invalidate_procedure::<Q>().into_future())
    }

    /// Executes the mutation.
    ///
    /// The state moves to pending before this method returns; the returned future drives the
    /// call and the hooks and resolves with the outcome that is also published as state. If the
    /// future is dropped first, an internal error is published in its place.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure of the call, or a conflict error if another invocation is
    /// still pending.
    ///
    /// # Panics
    ///
    /// A panic raised by a success hook is resumed after an internal error has been published.
    pub fn execute(&self, input: P::Input) -> impl Future<Output = crate::Result<P::Output>> + Send + use<P, T> {
        let started = self.sender.send_if_modified(|state| {
            if state.is_pending() {
                return false;
            }

            *state = MutationState::Pending;
            true
        });

        let telemetry = self.client.telemetry();
        let admission = if started {
            telemetry.mutation(P::PATH, MutationActivity::Started, None);
            Ok(PendingGuard::new(P::PATH, Arc::clone(&self.sender), telemetry))
        } else {
            let error = ErrorInfo::conflict(format!("mutation '{}' is already pending", P::PATH));
            telemetry.mutation(P::PATH, MutationActivity::Rejected, Some(&error));
            Err(error)
        };

        let transport = self.client.shared_transport();
        let hooks = self.hooks.clone();

        async move {
            let guard = admission?;

            let output = match transport::call::<P, T>(&*transport, ProcedureKind::Mutation, &input).await {
                Ok(output) => output,
                Err(error) => {
                    telemetry.mutation(P::PATH, MutationActivity::Failed, Some(&error));
                    guard.settle(MutationState::Error(error.clone()));
                    return Err(error);
                }
            };

            for hook in &hooks {
                let run = AssertUnwindSafe(async { hook(output.clone(), input.clone()).await })
                    .catch_unwind()
                    .await;

                if let Err(panic) = run {
                    let error = ErrorInfo::internal(format!("a success hook of mutation '{}' panicked", P::PATH));
                    telemetry.mutation(P::PATH, MutationActivity::HookPanicked, Some(&error));
                    guard.settle(MutationState::Error(error));
                    std::panic::resume_unwind(panic);
                }
            }

            telemetry.mutation(P::PATH, MutationActivity::Succeeded, None);
            guard.settle(MutationState::Success(output.clone()));
            Ok(output)
        }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> MutationState<P::Output> {
        self.sender.borrow().clone()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> MutationStatus {
        self.sender.borrow().status()
    }

    /// Returns `true` while an invocation is running.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.sender.borrow().is_pending()
    }

    /// Returns the failure of the last invocation.
    #[must_use]
    pub fn error(&self) -> Option<ErrorInfo> {
        self.sender.borrow().error().cloned()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<MutationState<P::Output>> {
        self.sender.subscribe()
    }

    /// Returns a settled mutation to idle. Has no effect while an invocation is pending.
    pub fn reset(&self) {
        self.sender.send_if_modified(|state| {
            if matches!(state, MutationState::Idle | MutationState::Pending) {
                return false;
            }

            *state = MutationState::Idle;
            true
        });
    }
}

/// Owns the pending state of one invocation until it settles.
///
/// Dropped unsettled, it publishes an internal error so that later invocations are accepted.
struct PendingGuard<V> {
    procedure: &'static str,
    sender: Option<Arc<watch::Sender<MutationState<V>>>>,
    telemetry: Telemetry,
}

impl<V> PendingGuard<V> {
    fn new(procedure: &'static str, sender: Arc<watch::Sender<MutationState<V>>>, telemetry: Telemetry) -> Self {
        Self {
            procedure,
            sender: Some(sender),
            telemetry,
        }
    }

    fn settle(mut self, state: MutationState<V>) {
        if let Some(sender) = self.sender.take() {
            sender.send_replace(state);
        }
    }
}

impl<V> Drop for PendingGuard<V> {
    fn drop(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };

        let error = ErrorInfo::internal(format!("mutation '{}' was cancelled before it settled", self.procedure));
        self.telemetry.mutation(self.procedure, MutationActivity::Cancelled, Some(&error));
        sender.send_replace(MutationState::Error(error));
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use static_assertions::assert_impl_all;
    use tracing_test::traced_test;

    use super::*;
    use crate::{ErrorKind, QueryStatus, RpcError, testing::MockTransport};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct IdInput {
        id: String,
    }

    struct Archive;

    impl Procedure for Archive {
        const PATH: &'static str = "item.archive";
        type Input = IdInput;
        type Output = u32;
    }

    impl MutationProcedure for Archive {}

    struct Lookup;

    impl Procedure for Lookup {
        const PATH: &'static str = "item.lookup";
        type Input = IdInput;
        type Output = u32;
    }

    impl QueryProcedure for Lookup {}

    fn id(id: &str) -> IdInput {
        IdInput { id: id.to_string() }
    }

    #[test]
    fn mutation_is_thread_safe() {
        assert_impl_all!(Mutation<Archive, MockTransport>: Send, Sync, Clone);
    }

    #[tokio::test]
    async fn pending_is_published_at_call_time() {
        let (transport, mut calls) = MockTransport::manual();
        let mutation = Client::new(transport).mutation::<Archive>();
        assert_eq!(mutation.status(), MutationStatus::Idle);

        let execution = tokio::spawn(mutation.execute(id("p1")));
        assert!(mutation.is_pending());

        let call = calls.next().await.unwrap();
        assert_eq!(call.request().kind(), ProcedureKind::Mutation);
        assert_eq!(call.request().input(), &json!({ "id": "p1" }));
        call.succeed(&7);

        assert_eq!(execution.await.unwrap(), Ok(7));
        assert_eq!(mutation.state(), MutationState::Success(7));
    }

    #[tokio::test]
    async fn hooks_run_in_order_before_success() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (transport, mut calls) = MockTransport::manual();

        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let mutation = Client::new(transport)
            .mutation::<Archive>()
            .on_success(move |output, input: IdInput| {
                let order = Arc::clone(&first);
                async move {
                    tokio::task::yield_now().await;
                    order.lock().push(format!("first:{}:{output}", input.id));
                }
            })
            .on_success(move |_, _| {
                let order = Arc::clone(&second);
                async move { order.lock().push("second".to_string()) }
            });

        let observer = mutation.clone();
        let checked = Arc::clone(&order);
        let mutation = mutation.on_success(move |_, _| {
            // Hooks observe the invocation as still pending.
            assert!(observer.is_pending());
            checked.lock().push("third".to_string());
            async {}
        });

        let execution = tokio::spawn(mutation.execute(id("p1")));
        calls.next().await.unwrap().succeed(&3);
        execution.await.unwrap().unwrap();

        assert_eq!(*order.lock(), ["first:p1:3", "second", "third"]);
        assert_eq!(mutation.status(), MutationStatus::Success);
    }

    #[tokio::test]
    async fn failure_skips_hooks() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let transport = MockTransport::with_handler(|_| Err(RpcError::NotFound("No item with id 'p9'".into())));

        let mutation = Client::new(transport).mutation::<Archive>().on_success(move |_, _| {
            flag.store(true, Ordering::SeqCst);
            async {}
        });

        let error = mutation.execute(id("p9")).await.unwrap_err();
        assert_eq!(error.code(), 404);
        assert_eq!(mutation.error(), Some(error));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    #[traced_test]
    async fn concurrent_execute_is_rejected() {
        let (transport, mut calls) = MockTransport::manual();
        let mutation = Client::new(transport.clone()).mutation::<Archive>();

        let running = tokio::spawn(mutation.execute(id("p1")));
        let rejected = mutation.execute(id("p2")).await.unwrap_err();

        assert_eq!(rejected.kind(), ErrorKind::Conflict);
        assert_eq!(rejected.code(), 409);
        assert!(mutation.is_pending());
        assert!(logs_contain("mutation.rejected"));

        calls.next().await.unwrap().succeed(&1);
        assert_eq!(running.await.unwrap(), Ok(1));
        assert_eq!(transport.call_count(Archive::PATH), 1);

        // A settled mutation accepts new invocations.
        let next = tokio::spawn(mutation.execute(id("p2")));
        calls.next().await.unwrap().succeed(&2);
        assert_eq!(next.await.unwrap(), Ok(2));
    }

    #[tokio::test]
    #[traced_test]
    async fn panicking_hook_publishes_internal_error() {
        let mutation = Client::new(MockTransport::with_handler(|_| Ok(json!(1))))
            .mutation::<Archive>()
            .on_success(|_, _| async { panic!("hook exploded"); });

        let outcome = tokio::spawn(mutation.execute(id("p1"))).await;
        assert!(outcome.unwrap_err().is_panic());

        let error = mutation.error().expect("panic should be published as an error");
        assert_eq!(error.code(), 500);
        assert!(logs_contain("mutation.hook_panicked"));
    }

    #[tokio::test]
    #[traced_test]
    async fn dropped_execution_releases_pending() {
        let mutation = Client::new(MockTransport::with_handler(|_| Ok(json!(4)))).mutation::<Archive>();

        drop(mutation.execute(id("p1")));

        let error = mutation.error().expect("cancellation should be published");
        assert_eq!(error.code(), 500);
        assert!(logs_contain("mutation.cancelled"));

        mutation.reset();
        assert_eq!(mutation.status(), MutationStatus::Idle);
        assert_eq!(mutation.execute(id("p1")).await, Ok(4));
    }

    #[tokio::test]
    async fn timed_out_execution_can_be_retried() {
        let (transport, mut calls) = MockTransport::manual();
        let mutation = Client::new(transport).mutation::<Archive>();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), mutation.execute(id("p1"))).await;
        assert!(timed_out.is_err());
        assert_eq!(mutation.status(), MutationStatus::Error);

        // The abandoned call reached the transport; nobody waits for its answer.
        drop(calls.next().await.unwrap());

        let retry = tokio::spawn(mutation.execute(id("p1")));
        calls.next().await.unwrap().succeed(&8);
        assert_eq!(retry.await.unwrap(), Ok(8));
        assert_eq!(mutation.state(), MutationState::Success(8));
    }

    #[tokio::test]
    async fn invalidates_refetches_derived_query() {
        let version = Arc::new(Mutex::new(1_u32));
        let current = Arc::clone(&version);
        let transport = MockTransport::with_handler(move |request| match request.procedure() {
            "item.lookup" => Ok(json!(*current.lock())),
            _ => {
                *current.lock() += 1;
                Ok(json!(0))
            }
        });

        let client = Client::new(transport.clone());
        let mut lookup = client.query::<Lookup>(id("p1"));
        let mut other = client.query::<Lookup>(id("p2"));
        assert_eq!(lookup.settled().await.data(), Some(&1));
        other.settled().await;

        let mutation = client.mutation::<Archive>().invalidates::<Lookup, _>(Clone::clone);
        mutation.execute(id("p1")).await.unwrap();

        // The refetch settled before the mutation reported success.
        assert_eq!(lookup.status(), QueryStatus::Success);
        assert_eq!(lookup.data(), Some(2));
        assert_eq!(other.data(), Some(1));
        assert_eq!(transport.call_count(Lookup::PATH), 3);

        let mutation = client.mutation::<Archive>().invalidates_all::<Lookup>();
        mutation.execute(id("p1")).await.unwrap();
        assert_eq!(other.data(), Some(3));
        assert_eq!(transport.call_count(Lookup::PATH), 5);
    }

    #[tokio::test]
    async fn reset_returns_settled_mutation_to_idle() {
        let mutation = Client::new(MockTransport::with_handler(|_| Ok(json!(5)))).mutation::<Archive>();
        let mut watcher = mutation.watch();

        mutation.execute(id("p1")).await.unwrap();
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), MutationState::Success(5));

        mutation.reset();
        assert_eq!(mutation.state(), MutationState::Idle);
    }
}
