// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Drives the post page through load, a failed resolve, and a successful resolve.
//!
//! Run with `RUST_LOG=debug` to see the cache and mutation events.

use post_view::{Post, PostPage, Resolve, memory::InMemoryPosts};
use rpc_query::{Client, Procedure, RpcError};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let posts = InMemoryPosts::with_posts([Post {
        id: "p1".to_string(),
        title: "Hello".to_string(),
        text: "This post still needs attention.".to_string(),
        created_at: "2024-01-02T12:00:00Z".parse().expect("valid timestamp"),
        resolved: false,
    }]);

    let client = Client::builder(posts.clone()).name("post_page").build();

    let mut missing = PostPage::open(&client, Some("p404"));
    println!("{}\n", missing.settled().await);

    let mut page = PostPage::open(&client, Some("p1"));
    println!("{}\n", page.view());
    println!("{}\n", page.settled().await);

    // The first attempt fails; the page keeps its content and shows the message inline.
    posts.fail_when(|request| {
        (request.procedure() == Resolve::PATH).then(|| RpcError::Server {
            code: 503,
            message: "Resolving is temporarily unavailable".to_string(),
        })
    });
    page.resolve().await;
    println!("{}\n", page.view());

    posts.clear_failures();
    page.resolve().await;
    println!("{}", page.view());
}
