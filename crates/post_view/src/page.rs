// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! View model of the post detail page.

use std::fmt;

use jiff::tz::TimeZone;
use rpc_query::{Client, Mutation, MutationState, QueryHandle, QueryState, Transport};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::{ById, Post, PostIdInput, Resolve};

/// The detail page of one post.
///
/// The page subscribes to `post.byId` for the id taken from the route and owns the `post.resolve`
/// mutation. A successful resolve invalidates the page's own post, so the page shows the resolved
/// post once the mutation reports success. The page only reads cache state; every change goes
/// through the client.
///
/// # Examples
///
/// ```
/// use jiff::tz::TimeZone;
/// use post_view::{PageView, Post, PostPage, memory::InMemoryPosts};
/// use rpc_query::Client;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let posts = InMemoryPosts::new();
/// posts.insert(Post {
///     id: "p1".into(),
///     title: "Hello".into(),
///     text: "First post".into(),
///     created_at: "2024-01-02T12:00:00Z".parse().unwrap(),
///     resolved: false,
/// });
///
/// let client = Client::new(posts);
/// let mut page = PostPage::open(&client, Some("p1")).with_time_zone(TimeZone::UTC);
/// assert_eq!(page.view(), PageView::Loading);
///
/// let PageView::Content(content) = page.settled().await else {
///     panic!("post should load");
/// };
/// assert_eq!(content.created_label, "Created 1/2/2024");
/// assert!(content.resolve.is_some());
/// # });
/// ```
#[derive(Debug)]
pub struct PostPage<T: Transport> {
    id: String,
    post: QueryHandle<Post>,
    resolve: Mutation<Resolve, T>,
    time_zone: TimeZone,
}

impl<T: Transport> PostPage<T> {
    /// Opens the page for the id found in the route.
    ///
    /// A missing id is sent as the empty string; the server decides that no such post exists.
    /// Dates are shown in the system time zone.
    pub fn open(client: &Client<T>, route_id: Option<&str>) -> Self {
        let id = route_id.unwrap_or_default().to_string();
        let post = client.query::<ById>(PostIdInput::new(id.clone()));
        let resolve = client.mutation::<Resolve>().invalidates::<ById, _>(Clone::clone);

        Self {
            id,
            post,
            resolve,
            time_zone: TimeZone::system(),
        }
    }

    /// Shows dates in `zone` instead of the system time zone.
    #[must_use]
    pub fn with_time_zone(mut self, zone: TimeZone) -> Self {
        self.time_zone = zone;
        self
    }

    /// Returns the id the page was opened for.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the subscription to the page's post.
    #[must_use]
    pub fn post(&self) -> &QueryHandle<Post> {
        &self.post
    }

    /// Returns the resolve mutation.
    #[must_use]
    pub fn resolve_mutation(&self) -> &Mutation<Resolve, T> {
        &self.resolve
    }

    /// Returns the current state of the resolve mutation.
    #[must_use]
    pub fn resolve_state(&self) -> MutationState<()> {
        self.resolve.state()
    }

    /// Builds what the page currently shows.
    #[must_use]
    pub fn view(&self) -> PageView {
        match self.post.state() {
            QueryState::Error(error) => PageView::Error(ErrorPage {
                title: error.message().to_string(),
                status_code: error.http_status(),
            }),
            QueryState::Success { data, .. } => PageView::Content(self.content(data)),
            QueryState::Idle | QueryState::Loading => PageView::Loading,
        }
    }

    fn content(&self, post: Post) -> PostView {
        let resolve = (!post.resolved).then(|| ResolveControl {
            disabled: self.resolve.is_pending(),
            error: self.resolve.error().map(|error| error.message().to_string()),
        });

        let raw = raw_json(&post).unwrap_or_else(|error| {
            tracing::warn!(post.id = %post.id, error = %error, "failed to render raw post data");
            String::new()
        });

        PostView {
            created_label: format!("Created {}", post.created_date(&self.time_zone)),
            raw,
            resolve,
            post,
        }
    }

    /// Waits until the post has loaded or failed and returns the view.
    pub async fn settled(&mut self) -> PageView {
        self.post.settled().await;
        self.view()
    }

    /// Waits until the post state changes. Returns `false` if it can no longer change.
    pub async fn changed(&mut self) -> bool {
        self.post.changed().await
    }

    /// Resolves the post, as the Resolve control does when submitted.
    ///
    /// The control is disabled as soon as this method returns, before the returned future is
    /// polled. The outcome is shown through [`ResolveControl::error`]; failures are also logged
    /// here and otherwise not reported to the caller.
    pub fn resolve(&self) -> impl Future<Output = ()> + Send + use<T> {
        let id = self.id.clone();
        let execution = self.resolve.execute(PostIdInput::new(id.clone()));

        async move {
            if let Err(error) = execution.await {
                tracing::error!(post.id = %id, error = %error, "failed to resolve post");
            }
        }
    }
}

fn raw_json(post: &Post) -> serde_json::Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    post.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// What the page shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageView {
    /// The post is being fetched; a skeleton is shown.
    Loading,
    /// The post could not be fetched; a full error page replaces the content.
    Error(ErrorPage),
    /// The post is shown.
    Content(PostView),
}

/// A full-page error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorPage {
    /// Error message used as the page title.
    pub title: String,
    /// HTTP status shown on the page; 500 when no server answered.
    pub status_code: u16,
}

/// The content of a loaded post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostView {
    /// The post itself.
    pub post: Post,
    /// `Created M/D/YYYY`.
    pub created_label: String,
    /// The post as JSON indented by four spaces.
    pub raw: String,
    /// The Resolve control; absent once the post is resolved.
    pub resolve: Option<ResolveControl>,
}

/// The Resolve control and its inline feedback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveControl {
    /// Set while a resolve is pending.
    pub disabled: bool,
    /// Message of the last failed resolve.
    pub error: Option<String>,
}

impl fmt::Display for PageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => f.write_str("Loading..."),
            Self::Error(page) => write!(f, "{}: {}", page.status_code, page.title),
            Self::Content(view) => {
                writeln!(f, "Home")?;
                writeln!(f, "# {}", view.post.title)?;
                writeln!(f, "{}", view.created_label)?;
                writeln!(f)?;
                writeln!(f, "{}", view.post.text)?;

                if let Some(control) = &view.resolve {
                    writeln!(f)?;
                    let button = if control.disabled { "[Resolve] (disabled)" } else { "[Resolve]" };
                    writeln!(f, "{button}")?;
                    if let Some(error) = &control.error {
                        writeln!(f, "! {error}")?;
                    }
                }

                writeln!(f)?;
                writeln!(f, "## Raw data:")?;
                write!(f, "{}", view.raw)
            }
        }
    }
}
