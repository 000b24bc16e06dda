// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The remote procedures the page calls.

use rpc_query::{MutationProcedure, Procedure, QueryProcedure};

use crate::{Post, PostIdInput};

/// `post.byId`: fetches one post. Fails with not found if no post matches the id.
#[derive(Debug)]
pub struct ById;

impl Procedure for ById {
    const PATH: &'static str = "post.byId";
    type Input = PostIdInput;
    type Output = Post;
}

impl QueryProcedure for ById {}

/// `post.resolve`: marks a post resolved. Fails with not found if no post matches the id.
#[derive(Debug)]
pub struct Resolve;

impl Procedure for Resolve {
    const PATH: &'static str = "post.resolve";
    type Input = PostIdInput;
    type Output = ();
}

impl MutationProcedure for Resolve {}
