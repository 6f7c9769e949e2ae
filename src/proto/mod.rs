//! Wire messages of the `shared_state.StateService` gRPC service.
//!
//! Messages are declared directly with prost derives; the service client and
//! server are generated by `build.rs`.

/// Push of changed keys. A `null` value means the key was removed.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StateUpdate {
    #[prost(message, optional, tag = "1")]
    pub changed_keys: ::core::option::Option<::prost_types::Struct>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeStateUpdatesRequest {
    /// Requested interval between pushes, in seconds.
    #[prost(float, tag = "1")]
    pub update_interval: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateStateRequest {
    #[prost(string, tag = "1")]
    pub access_token: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub update: ::core::option::Option<StateUpdate>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct UpdateStateResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateLocksRequest {
    #[prost(string, tag = "1")]
    pub access_token: ::prost::alloc::string::String,
    /// Key to lock duration in seconds, or `null` to release.
    #[prost(message, optional, tag = "2")]
    pub lock_keys: ::core::option::Option<::prost_types::Struct>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct UpdateLocksResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[allow(clippy::all)]
mod generated {
    include!(concat!(env!("OUT_DIR"), "/shared_state.StateService.rs"));
}

pub use generated::state_service_client;
pub use generated::state_service_server;
