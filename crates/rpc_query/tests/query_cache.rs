// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the query cache, driven through a transport whose responses the test
//! releases one at a time.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use rpc_query::{Client, Procedure, QueryProcedure, QueryStatus, RpcError, RpcRequest, Transport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;

type Reply = oneshot::Sender<Result<serde_json::Value, RpcError>>;

/// Parks every call until the test replies to it.
#[derive(Clone, Default)]
struct Gate {
    parked: Arc<Mutex<VecDeque<(RpcRequest, Reply)>>>,
}

impl Gate {
    fn parked(&self) -> usize {
        self.parked.lock().len()
    }

    fn reply_to_oldest(&self, value: serde_json::Value) {
        let (_, reply) = self.parked.lock().pop_front().expect("a call should be parked");
        reply.send(Ok(value)).expect("caller should be waiting");
    }

    fn reply_to_newest(&self, value: serde_json::Value) {
        let (_, reply) = self.parked.lock().pop_back().expect("a call should be parked");
        reply.send(Ok(value)).expect("caller should be waiting");
    }
}

impl Transport for Gate {
    async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError> {
        let (reply, response) = oneshot::channel();
        self.parked.lock().push_back((request, reply));
        response
            .await
            .unwrap_or_else(|_| Err(RpcError::Transport("gate closed".to_string())))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TitleInput {
    id: String,
}

struct Title;

impl Procedure for Title {
    const PATH: &'static str = "post.title";
    type Input = TitleInput;
    type Output = String;
}

impl QueryProcedure for Title {}

fn p1() -> TitleInput {
    TitleInput { id: "p1".to_string() }
}

async fn let_tasks_run() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn stale_response_arriving_last_is_discarded() {
    let gate = Gate::default();
    let client = Client::new(gate.clone());

    let handle = client.query::<Title>(p1());
    let_tasks_run().await;
    assert_eq!(gate.parked(), 1);

    let invalidation = client.invalidate(handle.key().unwrap());
    let_tasks_run().await;
    assert_eq!(gate.parked(), 2);

    gate.reply_to_newest(json!("fresh"));
    invalidation.await;
    assert_eq!(handle.data().as_deref(), Some("fresh"));

    gate.reply_to_oldest(json!("stale"));
    let_tasks_run().await;
    assert_eq!(handle.data().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn stale_response_arriving_first_keeps_entry_loading() {
    let gate = Gate::default();
    let client = Client::new(gate.clone());

    let handle = client.query::<Title>(p1());
    let_tasks_run().await;

    let invalidation = client.invalidate(handle.key().unwrap());
    let_tasks_run().await;

    gate.reply_to_oldest(json!("stale"));
    let_tasks_run().await;
    assert_eq!(handle.status(), QueryStatus::Loading);
    assert!(handle.data().is_none());

    gate.reply_to_oldest(json!("fresh"));
    invalidation.await;
    assert_eq!(handle.data().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn data_and_error_never_coexist_across_transitions() {
    let gate = Gate::default();
    let client = Client::new(gate.clone());

    let mut handle = client.query::<Title>(p1());
    let mut observed = vec![handle.state()];

    let_tasks_run().await;
    let (_, reply) = gate.parked.lock().pop_front().unwrap();
    reply.send(Err(RpcError::NotFound("No post with id 'p1'".into()))).unwrap();
    observed.push(handle.settled().await);

    let invalidation = handle.refetch();
    observed.push(handle.state());
    let_tasks_run().await;
    gate.reply_to_oldest(json!("found"));
    invalidation.await;
    observed.push(handle.state());

    let statuses: Vec<_> = observed.iter().map(|state| state.status()).collect();
    assert_eq!(
        statuses,
        [QueryStatus::Loading, QueryStatus::Error, QueryStatus::Loading, QueryStatus::Success]
    );

    for state in &observed {
        assert!(!(state.data().is_some() && state.error().is_some()));
        assert_eq!(state.data().is_some(), state.status() == QueryStatus::Success);
        assert_eq!(state.error().is_some(), state.status() == QueryStatus::Error);
    }
}

#[tokio::test]
async fn subscribers_joining_mid_flight_share_the_fetch() {
    let gate = Gate::default();
    let client = Client::new(gate.clone());

    let mut first = client.query::<Title>(p1());
    let_tasks_run().await;
    let mut second = client.query::<Title>(p1());
    let_tasks_run().await;
    assert_eq!(gate.parked(), 1);

    gate.reply_to_oldest(json!("shared"));
    assert_eq!(first.settled().await, second.settled().await);
    assert_eq!(second.data().as_deref(), Some("shared"));
}
