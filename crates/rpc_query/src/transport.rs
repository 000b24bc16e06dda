// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The transport contract and the typed call layer on top of it.

use std::sync::Arc;

use crate::{ErrorInfo, Procedure, ProcedureKind, RpcError, RpcRequest};

/// Executes named procedures on a remote system.
///
/// Implementations own framing, encoding, retries, and timeouts. The client only hands over an
/// [`RpcRequest`] and expects either the JSON success payload or an [`RpcError`].
///
/// # Examples
///
/// ```
/// use rpc_query::{RpcError, RpcRequest, Transport};
///
/// struct Echo;
///
/// impl Transport for Echo {
///     async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError> {
///         Ok(request.input().clone())
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Executes one call.
    fn call(&self, request: RpcRequest) -> impl Future<Output = Result<serde_json::Value, RpcError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn call(&self, request: RpcRequest) -> impl Future<Output = Result<serde_json::Value, RpcError>> + Send {
        (**self).call(request)
    }
}

/// Encodes the input, performs the call, and decodes the output.
pub(crate) async fn call<P, T>(transport: &T, kind: ProcedureKind, input: &P::Input) -> Result<P::Output, ErrorInfo>
where
    P: Procedure,
    T: Transport,
{
    let request = RpcRequest::encode::<P>(kind, input)?;
    let response = transport.call(request).await?;
    Ok(serde_json::from_value(response).map_err(RpcError::from)?)
}
