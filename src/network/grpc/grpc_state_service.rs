//! Server side of the `shared_state.StateService` gRPC service.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tracing::debug;

use crate::network::handle_update_locks;
use crate::network::handle_update_state;
use crate::network::requested_interval;
use crate::proto::state_service_server::StateService;
use crate::proto::StateUpdate;
use crate::proto::SubscribeStateUpdatesRequest;
use crate::proto::UpdateLocksRequest;
use crate::proto::UpdateLocksResponse;
use crate::proto::UpdateStateRequest;
use crate::proto::UpdateStateResponse;
use crate::StateStore;

/// Adapts a [`StateStore`] to the generated service trait.
#[derive(Debug, Clone)]
pub struct StateServer {
    store: Arc<StateStore>,
}

impl StateServer {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }
}

#[tonic::async_trait]
impl StateService for StateServer {
    type SubscribeStateUpdatesStream = BoxStream<'static, Result<StateUpdate, Status>>;

    async fn subscribe_state_updates(
        &self,
        request: Request<SubscribeStateUpdatesRequest>,
    ) -> Result<Response<Self::SubscribeStateUpdatesStream>, Status> {
        let remote = request.remote_addr();
        let request = request.into_inner();
        debug!(?remote, update_interval = request.update_interval, "subscribe_state_updates");

        let rx = self.store.subscribe(requested_interval(&request));
        Ok(Response::new(ReceiverStream::new(rx).map(Ok).boxed()))
    }

    async fn update_state(
        &self,
        request: Request<UpdateStateRequest>,
    ) -> Result<Response<UpdateStateResponse>, Status> {
        handle_update_state(&self.store, request.into_inner()).map(Response::new)
    }

    async fn update_locks(
        &self,
        request: Request<UpdateLocksRequest>,
    ) -> Result<Response<UpdateLocksResponse>, Status> {
        handle_update_locks(&self.store, request.into_inner()).map(Response::new)
    }
}
