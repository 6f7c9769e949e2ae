//! Client side of the streaming transport channel
//!
//! A [`Connection`] wraps one physical channel to the server. Each
//! [`StateClient`] created from it issues unary calls and opens
//! [`StateStream`]s. Every level owns a [`crate::Scope`], so cancelling a
//! connection tears down its clients and their streams.
//!
//! The wire itself sits behind [`StateTransport`]: [`GrpcTransport`] talks to
//! a remote server over tonic, [`LocalTransport`] calls an in-process
//! [`crate::StateStore`] directly.

pub mod grpc;

mod client;
mod connection;
mod local_transport;
mod requests;
mod stream;

pub use client::*;
pub use connection::*;
pub use grpc::grpc_transport::GrpcTransport;
pub use local_transport::*;
pub(crate) use requests::*;
pub use stream::*;

#[cfg(test)]
mod network_test;

//---
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::proto::StateUpdate;
use crate::proto::SubscribeStateUpdatesRequest;
use crate::proto::UpdateLocksRequest;
use crate::proto::UpdateLocksResponse;
use crate::proto::UpdateStateRequest;
use crate::proto::UpdateStateResponse;
use crate::Result;

/// Server push stream as seen by a client.
pub type StateUpdateStream = BoxStream<'static, Result<StateUpdate>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateTransport: Send + Sync + 'static {
    /// Applies one all-or-nothing batch of state changes.
    ///
    /// A lock conflict is `success = false`, not an error. Errors are
    /// reserved for transport failures.
    async fn update_state(
        &self,
        request: UpdateStateRequest,
    ) -> Result<UpdateStateResponse>;

    /// Acquires and/or releases a batch of locks as one unit.
    async fn update_locks(
        &self,
        request: UpdateLocksRequest,
    ) -> Result<UpdateLocksResponse>;

    /// Opens the server push stream of [`StateUpdate`]s.
    async fn subscribe_state_updates(
        &self,
        request: SubscribeStateUpdatesRequest,
    ) -> Result<StateUpdateStream>;
}
