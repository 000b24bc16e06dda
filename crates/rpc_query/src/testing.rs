// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock transport implementation for testing.
//!
//! This module provides `MockTransport`, a configurable transport that records every call and
//! either answers immediately through a handler or hands each call to the test, which then
//! decides when and how it completes.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::{RpcError, RpcRequest, Transport};

type Handler = Box<dyn Fn(&RpcRequest) -> Result<serde_json::Value, RpcError> + Send + Sync>;
type FailPredicate = Box<dyn Fn(&RpcRequest) -> bool + Send + Sync>;

enum Responder {
    Handler(Handler),
    Manual(mpsc::UnboundedSender<PendingCall>),
}

/// A configurable mock transport for testing.
///
/// All calls are recorded for later verification.
///
/// # Examples
///
/// ```
/// use rpc_query::{ProcedureKind, RpcError, RpcRequest, Transport, testing::MockTransport};
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let transport = MockTransport::with_handler(|request| match request.procedure() {
///     "post.byId" => Ok(json!({ "title": "Hello" })),
///     other => Err(RpcError::NotFound(format!("No procedure '{other}'"))),
/// });
///
/// let request = RpcRequest::new("post.byId", ProcedureKind::Query, json!({ "id": "p1" }));
/// assert_eq!(transport.call(request).await.unwrap(), json!({ "title": "Hello" }));
/// assert_eq!(transport.call_count("post.byId"), 1);
/// # });
/// ```
///
/// # Controlling Response Order
///
/// ```
/// use rpc_query::{ProcedureKind, RpcRequest, Transport, testing::MockTransport};
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let (transport, mut calls) = MockTransport::manual();
///
/// let request = RpcRequest::new("post.byId", ProcedureKind::Query, json!({ "id": "p1" }));
/// let response = tokio::spawn(async move { transport.call(request).await });
///
/// let pending = calls.next().await.unwrap();
/// assert_eq!(pending.request().procedure(), "post.byId");
/// pending.succeed(&"late");
///
/// assert_eq!(response.await.unwrap().unwrap(), json!("late"));
/// # });
/// ```
#[derive(Clone)]
pub struct MockTransport {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<RpcRequest>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &*self.responder {
            Responder::Handler(_) => "handler",
            Responder::Manual(_) => "manual",
        };

        f.debug_struct("MockTransport")
            .field("mode", &mode)
            .field("calls", &self.calls)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a transport that answers every call with `null`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handler(|_| Ok(serde_json::Value::Null))
    }

    /// Creates a transport that answers every call through `handler`.
    #[must_use]
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&RpcRequest) -> Result<serde_json::Value, RpcError> + Send + Sync + 'static,
    {
        Self::from_responder(Responder::Handler(Box::new(handler)))
    }

    /// Creates a transport whose calls stay pending until the test answers them through the
    /// returned [`CallQueue`].
    #[must_use]
    pub fn manual() -> (Self, CallQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::from_responder(Responder::Manual(sender)), CallQueue { receiver })
    }

    fn from_responder(responder: Responder) -> Self {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Configures the transport to fail calls matching the predicate with a transport error.
    ///
    /// Failing calls are still recorded.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&RpcRequest) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
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

    /// Clears the recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn should_fail(&self, request: &RpcRequest) -> bool {
        self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(request))
    }
}

impl Transport for MockTransport {
    async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError> {
        self.calls.lock().push(request.clone());

        if self.should_fail(&request) {
            return Err(RpcError::Transport(format!("injected failure for '{}'", request.procedure())));
        }

        match &*self.responder {
            Responder::Handler(handler) => handler(&request),
            Responder::Manual(queue) => {
                let (responder, response) = oneshot::channel();
                queue
                    .send(PendingCall { request, responder })
                    .map_err(|error| RpcError::Transport(format!("call queue was dropped: {error}")))?;

                response
                    .await
                    .unwrap_or_else(|_| Err(RpcError::Transport("call was dropped without a response".to_string())))
            }
        }
    }
}

/// Calls made through a [`MockTransport::manual`] transport, in arrival order.
#[derive(Debug)]
pub struct CallQueue {
    receiver: mpsc::UnboundedReceiver<PendingCall>,
}

impl CallQueue {
    /// Waits for the next call.
    ///
    /// Returns `None` once every clone of the transport is gone.
    pub async fn next(&mut self) -> Option<PendingCall> {
        self.receiver.recv().await
    }

    /// Returns the next call if one has already arrived.
    pub fn try_next(&mut self) -> Option<PendingCall> {
        self.receiver.try_recv().ok()
    }
}

/// A call waiting for the test to answer it.
///
/// Dropping it without answering fails the call with a transport error.
#[derive(Debug)]
pub struct PendingCall {
    request: RpcRequest,
    responder: oneshot::Sender<Result<serde_json::Value, RpcError>>,
}

impl PendingCall {
    /// Returns the request as the transport received it.
    #[must_use]
    pub fn request(&self) -> &RpcRequest {
        &self.request
    }

    /// Completes the call with a raw response.
    pub fn respond(self, response: Result<serde_json::Value, RpcError>) {
        // The caller may have gone away; nobody is left to observe the response then.
        let _ = self.responder.send(response);
    }

    /// Completes the call successfully with `output` encoded as JSON.
    ///
    /// If `output` cannot be encoded, the call fails with [`RpcError::Decode`] instead.
    pub fn succeed<V: Serialize + ?Sized>(self, output: &V) {
        let response = serde_json::to_value(output).map_err(RpcError::from);
        self.respond(response);
    }

    /// Completes the call with an error.
    pub fn fail(self, error: RpcError) {
        self.respond(Err(error));
    }
}
