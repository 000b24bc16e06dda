// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed procedure definitions, wire requests, and cache keys.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};

use crate::{ErrorInfo, RpcError};

/// A named remote procedure with typed input and output.
///
/// Procedures are zero-sized marker types; the client uses them to pick the wire path and to
/// encode inputs and decode outputs.
///
/// # Examples
///
/// ```
/// use rpc_query::{Procedure, QueryProcedure};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize)]
/// struct ByIdInput {
///     id: String,
/// }
///
/// #[derive(Clone, Deserialize)]
/// struct Post {
///     title: String,
/// }
///
/// struct ById;
///
/// impl Procedure for ById {
///     const PATH: &'static str = "post.byId";
///     type Input = ByIdInput;
///     type Output = Post;
/// }
///
/// impl QueryProcedure for ById {}
/// ```
pub trait Procedure: 'static {
    /// Dot-separated path the transport routes on, e.g. `post.byId`.
    const PATH: &'static str;

    /// Input payload.
    type Input: Serialize + Clone + Send + Sync + 'static;

    /// Success payload.
    type Output: DeserializeOwned + Clone + Send + Sync + 'static;
}

/// A side-effect free procedure whose results may be cached.
pub trait QueryProcedure: Procedure {}

/// A side-effecting procedure executed through a [`Mutation`](crate::Mutation).
pub trait MutationProcedure: Procedure {}

/// Whether a request reads or changes remote state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcedureKind {
    /// Idempotent read.
    Query,
    /// Remote side effect.
    Mutation,
}

impl ProcedureKind {
    /// Returns a short, stable name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// One call handed to a [`Transport`](crate::Transport).
#[derive(Clone, Debug, PartialEq)]
pub struct RpcRequest {
    procedure: &'static str,
    kind: ProcedureKind,
    input: serde_json::Value,
}

impl RpcRequest {
    /// Creates a request for an already encoded input.
    #[must_use]
    pub fn new(procedure: &'static str, kind: ProcedureKind, input: serde_json::Value) -> Self {
        Self { procedure, kind, input }
    }

    pub(crate) fn encode<P: Procedure>(kind: ProcedureKind, input: &P::Input) -> Result<Self, RpcError> {
        Ok(Self::new(P::PATH, kind, serde_json::to_value(input)?))
    }

    /// Returns the procedure path.
    #[must_use]
    pub fn procedure(&self) -> &'static str {
        self.procedure
    }

    /// Returns whether the call is a query or a mutation.
    #[must_use]
    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    /// Returns the encoded input.
    #[must_use]
    pub fn input(&self) -> &serde_json::Value {
        &self.input
    }

    /// Decodes the input into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Decode`] if the input does not match `I`.
    pub fn decode_input<I: DeserializeOwned>(&self) -> Result<I, RpcError> {
        Ok(I::deserialize(&self.input)?)
    }
}

/// Address of exactly one query cache entry: a procedure path plus the canonical input.
///
/// The input is stored as compact JSON with object keys in sorted order, so structurally equal
/// inputs always produce equal keys.
///
/// # Examples
///
/// ```
/// use rpc_query::QueryKey;
/// use serde_json::json;
///
/// let a = QueryKey::from_value("post.byId", &json!({"id": "p1", "lang": "en"}));
/// let b = QueryKey::from_value("post.byId", &json!({"lang": "en", "id": "p1"}));
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), r#"post.byId({"id":"p1","lang":"en"})"#);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    procedure: &'static str,
    input: String,
}

impl QueryKey {
    /// Builds the key for a typed procedure input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be encoded.
    pub fn new<P: QueryProcedure>(input: &P::Input) -> crate::Result<Self> {
        serde_json::to_value(input)
            .map(|value| Self::from_value(P::PATH, &value))
            .map_err(|error| ErrorInfo::from(RpcError::from(error)))
    }

    /// Builds the key for an already encoded input.
    #[must_use]
    pub fn from_value(procedure: &'static str, input: &serde_json::Value) -> Self {
        Self {
            procedure,
            input: input.to_string(),
        }
    }

    /// Returns the procedure path.
    #[must_use]
    pub fn procedure(&self) -> &'static str {
        self.procedure
    }

    /// Returns the canonical JSON form of the input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.procedure, self.input)
    }
}
