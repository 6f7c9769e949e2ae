use std::sync::Arc;

use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tonic::async_trait;

use super::handle_update_locks;
use super::handle_update_state;
use super::requested_interval;
use super::StateTransport;
use super::StateUpdateStream;
use crate::proto::SubscribeStateUpdatesRequest;
use crate::proto::UpdateLocksRequest;
use crate::proto::UpdateLocksResponse;
use crate::proto::UpdateStateRequest;
use crate::proto::UpdateStateResponse;
use crate::Result;
use crate::StateStore;

/// Transport that calls an in-process [`StateStore`] without any network
/// hop. Requests are validated exactly like the gRPC service does.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    store: Arc<StateStore>,
}

impl LocalTransport {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }
}

#[async_trait]
impl StateTransport for LocalTransport {
    async fn update_state(
        &self,
        request: UpdateStateRequest,
    ) -> Result<UpdateStateResponse> {
        Ok(handle_update_state(&self.store, request)?)
    }

    async fn update_locks(
        &self,
        request: UpdateLocksRequest,
    ) -> Result<UpdateLocksResponse> {
        Ok(handle_update_locks(&self.store, request)?)
    }

    async fn subscribe_state_updates(
        &self,
        request: SubscribeStateUpdatesRequest,
    ) -> Result<StateUpdateStream> {
        let rx = self.store.subscribe(requested_interval(&request));
        Ok(ReceiverStream::new(rx).map(Ok).boxed())
    }
}
