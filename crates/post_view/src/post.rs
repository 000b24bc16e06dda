// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use jiff::{Timestamp, tz::TimeZone};
use serde::{Deserialize, Serialize};

/// One post as returned by the `post.byId` procedure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Identifier of the post.
    pub id: String,
    /// Title shown as the page heading.
    pub title: String,
    /// Body text.
    pub text: String,
    /// When the post was created.
    pub created_at: Timestamp,
    /// Whether the post has been resolved.
    pub resolved: bool,
}

impl Post {
    /// Returns the creation date as `M/D/YYYY` in `zone`, without zero padding.
    #[must_use]
    pub fn created_date(&self, zone: &TimeZone) -> String {
        let created = self.created_at.to_zoned(zone.clone());
        format!("{}/{}/{}", created.month(), created.day(), created.year())
    }
}

/// Input of every post procedure: the identifier taken from the route.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostIdInput {
    /// Identifier of the post; empty when the route carried none.
    pub id: String,
}

impl PostIdInput {
    /// Creates the input for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
