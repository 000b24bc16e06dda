// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end tests of the post page against the in-memory backend.

#![cfg(feature = "memory")]

use jiff::tz::{self, TimeZone};
use post_view::{ById, ErrorPage, PageView, Post, PostIdInput, PostPage, Resolve, memory::InMemoryPosts};
use rpc_query::{Client, MutationStatus, Procedure, QueryStatus, RpcError};
use rstest::rstest;
use tracing_test::traced_test;

fn post(id: &str, resolved: bool) -> Post {
    Post {
        id: id.to_string(),
        title: "Hello".to_string(),
        text: "First post".to_string(),
        created_at: "2024-01-02T12:00:00Z".parse().unwrap(),
        resolved,
    }
}

fn backend() -> InMemoryPosts {
    InMemoryPosts::with_posts([post("p1", false)])
}

#[tokio::test]
async fn loads_post() {
    let posts = backend();
    let client = Client::new(posts.clone());

    let mut page = PostPage::open(&client, Some("p1")).with_time_zone(TimeZone::UTC);
    assert_eq!(page.view(), PageView::Loading);
    assert_eq!(page.post().status(), QueryStatus::Loading);

    let PageView::Content(content) = page.settled().await else {
        panic!("post should load");
    };

    assert_eq!(content.post, post("p1", false));
    assert_eq!(content.created_label, "Created 1/2/2024");
    let control = content.resolve.expect("unresolved posts offer the Resolve control");
    assert!(!control.disabled);
    assert!(control.error.is_none());
    assert_eq!(posts.call_count(ById::PATH), 1);
}

#[rstest]
#[case::utc(TimeZone::UTC, "Created 1/2/2024")]
#[case::far_east(TimeZone::fixed(tz::offset(13)), "Created 1/3/2024")]
#[case::far_west(TimeZone::fixed(tz::offset(-11)), "Created 1/2/2024")]
#[tokio::test]
async fn created_label_uses_page_time_zone(#[case] zone: TimeZone, #[case] expected: &str) {
    let client = Client::new(backend());
    let mut page = PostPage::open(&client, Some("p1")).with_time_zone(zone);

    let PageView::Content(content) = page.settled().await else {
        panic!("post should load");
    };
    assert_eq!(content.created_label, expected);
}

#[tokio::test]
async fn raw_data_is_indented_by_four_spaces() {
    let client = Client::new(backend());
    let mut page = PostPage::open(&client, Some("p1"));

    let PageView::Content(content) = page.settled().await else {
        panic!("post should load");
    };

    let expected = r#"{
    "id": "p1",
    "title": "Hello",
    "text": "First post",
    "createdAt": "2024-01-02T12:00:00Z",
    "resolved": false
}"#;
    assert_eq!(content.raw, expected);
    assert!(PageView::Content(content).to_string().contains("## Raw data:"));
}

#[rstest]
#[case::unknown_id(Some("missing"), "No post with id 'missing'")]
#[case::absent_id(None, "No post with id ''")]
#[tokio::test]
async fn missing_post_shows_error_page(#[case] route_id: Option<&str>, #[case] title: &str) {
    let posts = backend();
    let client = Client::new(posts.clone());

    let mut page = PostPage::open(&client, route_id);
    let view = page.settled().await;

    assert_eq!(
        view,
        PageView::Error(ErrorPage {
            title: title.to_string(),
            status_code: 404,
        })
    );
    assert!(page.post().data().is_none());
    assert_eq!(page.post().error().map(|error| error.code()), Some(404));
    // The id always reaches the server, even when absent.
    assert_eq!(posts.calls()[0].decode_input::<PostIdInput>().unwrap().id, route_id.unwrap_or_default());
}

#[tokio::test]
async fn transport_failure_falls_back_to_status_500() {
    let posts = backend();
    posts.fail_when(|_| Some(RpcError::Transport("connection refused".to_string())));
    let client = Client::new(posts);

    let mut page = PostPage::open(&client, Some("p1"));
    let PageView::Error(error) = page.settled().await else {
        panic!("transport failures show the error page");
    };

    assert_eq!(error.status_code, 500);
    assert_eq!(page.post().error().map(|error| error.code()), Some(0));
}

#[tokio::test]
async fn resolve_refetches_post() {
    let posts = backend();
    let client = Client::new(posts.clone());
    let mut page = PostPage::open(&client, Some("p1"));
    page.settled().await;

    page.resolve().await;

    assert_eq!(page.resolve_mutation().status(), MutationStatus::Success);
    assert_eq!(page.post().status(), QueryStatus::Success);
    assert!(page.post().data().unwrap().resolved);
    assert_eq!(posts.call_count(ById::PATH), 2);
    assert_eq!(posts.call_count(Resolve::PATH), 1);

    let PageView::Content(content) = page.view() else {
        panic!("post should stay visible");
    };
    assert!(content.resolve.is_none());
}

#[tokio::test]
async fn pending_resolve_disables_control() {
    let client = Client::new(backend());
    let mut page = PostPage::open(&client, Some("p1"));
    page.settled().await;

    let resolving = page.resolve();

    let PageView::Content(content) = page.view() else {
        panic!("post should stay visible");
    };
    assert_eq!(content.resolve.map(|control| control.disabled), Some(true));

    // A second submission while pending is rejected and leaves the first one running.
    let rejected = page.resolve_mutation().execute(PostIdInput::new("p1")).await.unwrap_err();
    assert_eq!(rejected.code(), 409);

    resolving.await;
    assert_eq!(page.resolve_state().status(), MutationStatus::Success);
    assert!(page.post().data().unwrap().resolved);
}

#[tokio::test]
#[traced_test]
async fn failed_resolve_keeps_cached_post_and_shows_inline_error() {
    let posts = backend();
    let client = Client::new(posts.clone());
    let mut page = PostPage::open(&client, Some("p1"));
    page.settled().await;
    let before = page.post().state();

    posts.fail_when(|request| {
        (request.procedure() == Resolve::PATH).then(|| RpcError::NotFound("No post with id 'p1'".to_string()))
    });
    page.resolve().await;

    let error = page.resolve_mutation().error().expect("the failure should be published");
    assert_eq!(error.code(), 404);
    assert_eq!(error.message(), "No post with id 'p1'");

    assert_eq!(page.post().state(), before);
    assert_eq!(posts.call_count(ById::PATH), 1);

    let PageView::Content(content) = page.view() else {
        panic!("a failed resolve keeps the content");
    };
    let control = content.resolve.expect("post is still unresolved");
    assert!(!control.disabled);
    assert_eq!(control.error.as_deref(), Some("No post with id 'p1'"));
    assert!(logs_contain("failed to resolve post"));
}

#[tokio::test]
async fn pages_for_the_same_post_share_one_fetch() {
    let posts = backend();
    let client = Client::new(posts.clone());

    let mut first = PostPage::open(&client, Some("p1"));
    let mut second = PostPage::open(&client, Some("p1"));
    assert_eq!(first.settled().await, second.settled().await);
    assert_eq!(posts.call_count(ById::PATH), 1);

    // Resolving on one page refreshes the other.
    first.resolve().await;
    assert!(second.post().data().unwrap().resolved);
}
