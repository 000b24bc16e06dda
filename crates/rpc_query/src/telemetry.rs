// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured log events emitted by the query cache and mutation executor.
//!
//! Field names follow the dot-separated convention used across the workspace. Every event
//! carries the client name, the procedure path, and the activity; query events also carry the
//! cache key.

use tracing::Level;

use crate::ErrorInfo;

#[cfg(test)]
pub(crate) const CLIENT_NAME: &str = "rpc.client";

#[cfg(test)]
pub(crate) const PROCEDURE_NAME: &str = "rpc.procedure";

#[cfg(test)]
pub(crate) const KEY_NAME: &str = "rpc.key";

#[cfg(test)]
pub(crate) const ACTIVITY_NAME: &str = "rpc.activity";

#[cfg(test)]
pub(crate) const QUERY_EVENT: &str = "query.event";

#[cfg(test)]
pub(crate) const MUTATION_EVENT: &str = "mutation.event";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryActivity {
    /// A new entry was created and its first fetch issued.
    Created,
    /// A subscriber joined an existing entry.
    Joined,
    /// An entry was reset to loading and re-fetched.
    Invalidated,
    Succeeded,
    Failed,
    /// A response arrived for a fetch that a later invalidation replaced.
    Superseded,
    /// The transport or the decoder panicked while fetching.
    Panicked,
}

impl QueryActivity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Created => "query.created",
            Self::Joined => "query.joined",
            Self::Invalidated => "query.invalidated",
            Self::Succeeded => "query.succeeded",
            Self::Failed => "query.failed",
            Self::Superseded => "query.superseded",
            Self::Panicked => "query.panicked",
        }
    }

    fn level(self) -> Level {
        match self {
            Self::Panicked => Level::ERROR,
            Self::Failed => Level::WARN,
            Self::Invalidated => Level::INFO,
            Self::Created | Self::Joined | Self::Succeeded | Self::Superseded => Level::DEBUG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MutationActivity {
    Started,
    /// A call arrived while another invocation was still pending.
    Rejected,
    Succeeded,
    Failed,
    HookPanicked,
    /// The invocation was dropped before it settled.
    Cancelled,
}

impl MutationActivity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Started => "mutation.started",
            Self::Rejected => "mutation.rejected",
            Self::Succeeded => "mutation.succeeded",
            Self::Failed => "mutation.failed",
            Self::HookPanicked => "mutation.hook_panicked",
            Self::Cancelled => "mutation.cancelled",
        }
    }

    fn level(self) -> Level {
        match self {
            Self::HookPanicked => Level::ERROR,
            Self::Rejected | Self::Failed | Self::Cancelled => Level::WARN,
            Self::Started | Self::Succeeded => Level::INFO,
        }
    }
}

/// Emits events for one client instance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Telemetry {
    client: &'static str,
    enabled: bool,
}

impl Telemetry {
    pub(crate) fn new(client: &'static str, enabled: bool) -> Self {
        Self { client, enabled }
    }

    pub(crate) fn query(self, procedure: &'static str, key: &dyn std::fmt::Display, activity: QueryActivity, error: Option<&ErrorInfo>) {
        if !self.enabled {
            return;
        }

        let client = self.client;
        let act = activity.as_str();
        let error = error.map(ToString::to_string);

        // Tracing levels must be constant, so the level is picked through a macro.
        // Field names must match the constants above.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    rpc.client = client,
                    rpc.procedure = procedure,
                    rpc.key = %key,
                    rpc.activity = act,
                    rpc.error = ?error,
                    "query.event"
                )
            };
        }

        let level = activity.level();
        if level == Level::ERROR {
            emit_event!(error);
        } else if level == Level::WARN {
            emit_event!(warn);
        } else if level == Level::INFO {
            emit_event!(info);
        } else {
            emit_event!(debug);
        }
    }

    pub(crate) fn mutation(self, procedure: &'static str, activity: MutationActivity, error: Option<&ErrorInfo>) {
        if !self.enabled {
            return;
        }

        let client = self.client;
        let act = activity.as_str();
        let error = error.map(ToString::to_string);

        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    rpc.client = client,
                    rpc.procedure = procedure,
                    rpc.activity = act,
                    rpc.error = ?error,
                    "mutation.event"
                )
            };
        }

        let level = activity.level();
        if level == Level::ERROR {
            emit_event!(error);
        } else if level == Level::WARN {
            emit_event!(warn);
        } else {
            emit_event!(info);
        }
    }
}
