// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Observable lifecycle states of queries and mutations.

use jiff::Timestamp;

use crate::ErrorInfo;

/// Coarse status of a query entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// No fetch has been issued yet.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The latest fetch succeeded.
    Success,
    /// The latest fetch failed.
    Error,
}

/// State of one query cache entry.
///
/// Data is carried only by [`Success`](Self::Success) and error information only by
/// [`Error`](Self::Error), so the two can never be observed together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum QueryState<V> {
    /// No fetch has been issued yet.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The latest fetch succeeded.
    Success {
        /// The fetched value.
        data: V,
        /// When the value arrived.
        fetched_at: Timestamp,
    },
    /// The latest fetch failed.
    Error(ErrorInfo),
}

impl<V> QueryState<V> {
    /// Returns the coarse status.
    #[must_use]
    pub fn status(&self) -> QueryStatus {
        match self {
            Self::Idle => QueryStatus::Idle,
            Self::Loading => QueryStatus::Loading,
            Self::Success { .. } => QueryStatus::Success,
            Self::Error(_) => QueryStatus::Error,
        }
    }

    /// Returns the fetched value when the status is success.
    #[must_use]
    pub fn data(&self) -> Option<&V> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Returns the failure when the status is error.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Returns when the current value was fetched.
    #[must_use]
    pub fn fetched_at(&self) -> Option<Timestamp> {
        match self {
            Self::Success { fetched_at, .. } => Some(*fetched_at),
            _ => None,
        }
    }

    /// Returns `true` once the latest fetch has either succeeded or failed.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error(_))
    }

    /// Returns `true` while a fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub(crate) fn settle(outcome: crate::Result<V>) -> Self {
        match outcome {
            Ok(data) => Self::Success {
                data,
                fetched_at: Timestamp::now(),
            },
            Err(error) => Self::Error(error),
        }
    }
}

/// Coarse status of a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationStatus {
    /// Not executed since creation or the last reset.
    Idle,
    /// A call is in flight or its success hooks are running.
    Pending,
    /// The last invocation succeeded and its hooks completed.
    Success,
    /// The last invocation failed.
    Error,
}

/// State of a [`Mutation`](crate::Mutation).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MutationState<V> {
    /// Not executed since creation or the last reset.
    #[default]
    Idle,
    /// A call is in flight or its success hooks are running.
    Pending,
    /// The last invocation succeeded and its hooks completed.
    Success(V),
    /// The last invocation failed.
    Error(ErrorInfo),
}

impl<V> MutationState<V> {
    /// Returns the coarse status.
    #[must_use]
    pub fn status(&self) -> MutationStatus {
        match self {
            Self::Idle => MutationStatus::Idle,
            Self::Pending => MutationStatus::Pending,
            Self::Success(_) => MutationStatus::Success,
            Self::Error(_) => MutationStatus::Error,
        }
    }

    /// Returns `true` while an invocation is running.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns the output of the last successful invocation.
    #[must_use]
    pub fn data(&self) -> Option<&V> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the failure of the last invocation.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }
}
