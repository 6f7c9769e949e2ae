//! tonic implementation of [`StateTransport`].

use std::time::Duration;

use futures::StreamExt;
use tonic::async_trait;
use tonic::codec::CompressionEncoding;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tracing::debug;

use crate::network::StateTransport;
use crate::network::StateUpdateStream;
use crate::proto::state_service_client::StateServiceClient;
use crate::proto::SubscribeStateUpdatesRequest;
use crate::proto::UpdateLocksRequest;
use crate::proto::UpdateLocksResponse;
use crate::proto::UpdateStateRequest;
use crate::proto::UpdateStateResponse;
use crate::ClientConfig;
use crate::Error;
use crate::NetworkError;
use crate::Result;

#[derive(Debug, Clone)]
pub struct GrpcTransport {
    // Tonic's client is a cheap handle over a shared channel.
    client: StateServiceClient<Channel>,
    request_timeout: Duration,
}

impl GrpcTransport {
    pub async fn connect(
        address: &str,
        port: u16,
        config: &ClientConfig,
    ) -> Result<Self> {
        let channel = Self::create_channel(endpoint_uri(address, port), config).await?;
        Ok(Self::from_channel(channel, config))
    }

    pub fn from_channel(
        channel: Channel,
        config: &ClientConfig,
    ) -> Self {
        let mut client = StateServiceClient::new(channel);
        if config.enable_compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }

        Self {
            client,
            request_timeout: config.request_timeout(),
        }
    }

    pub(crate) async fn create_channel(
        uri: String,
        config: &ClientConfig,
    ) -> Result<Channel> {
        debug!("create_channel, uri = {:?}", &uri);
        let endpoint = Endpoint::try_from(uri.clone()).map_err(|_| NetworkError::InvalidURI(uri))?;

        // No endpoint-wide timeout: it would cut the long-lived update stream.
        // Unary calls carry their own deadline instead.
        endpoint
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(Some(config.tcp_keepalive()))
            .http2_keep_alive_interval(config.http2_keep_alive_interval())
            .keep_alive_timeout(config.http2_keep_alive_timeout())
            .connect()
            .await
            .map_err(Into::into)
    }

    fn unary<T>(
        &self,
        message: T,
    ) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.request_timeout);
        request
    }
}

#[async_trait]
impl StateTransport for GrpcTransport {
    async fn update_state(
        &self,
        request: UpdateStateRequest,
    ) -> Result<UpdateStateResponse> {
        let mut client = self.client.clone();
        let response = client.update_state(self.unary(request)).await?;
        Ok(response.into_inner())
    }

    async fn update_locks(
        &self,
        request: UpdateLocksRequest,
    ) -> Result<UpdateLocksResponse> {
        let mut client = self.client.clone();
        let response = client.update_locks(self.unary(request)).await?;
        Ok(response.into_inner())
    }

    async fn subscribe_state_updates(
        &self,
        request: SubscribeStateUpdatesRequest,
    ) -> Result<StateUpdateStream> {
        let mut client = self.client.clone();
        let stream = client.subscribe_state_updates(request).await?.into_inner();
        Ok(stream.map(|item| item.map_err(Error::from)).boxed())
    }
}

/// `http://` URI for a host that may be a bare IPv6 address.
pub(crate) fn endpoint_uri(
    address: &str,
    port: u16,
) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("http://[{address}]:{port}")
    } else {
        format!("http://{address}:{port}")
    }
}
