// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Detail page for a single post.
//!
//! [`PostPage`] fetches one post through `post.byId`, turns the query state into a [`PageView`],
//! and offers the `post.resolve` mutation. Resolving invalidates the cached post, so the page
//! picks up the resolved post without writing cache state itself.
//!
//! The page is written against [`rpc_query::Transport`] and works with any transport. The
//! `memory` feature, enabled by default, adds [`memory::InMemoryPosts`], a transport that serves
//! the procedures from memory.

#[cfg(feature = "memory")]
#[cfg_attr(docsrs, doc(cfg(feature = "memory")))]
pub mod memory;
mod page;
mod post;
mod procedures;

pub use page::{ErrorPage, PageView, PostPage, PostView, ResolveControl};
pub use post::{Post, PostIdInput};
pub use procedures::{ById, Resolve};
