use tonic_build::manual::Builder;
use tonic_build::manual::Method;
use tonic_build::manual::Service;

const CODEC: &str = "tonic::codec::ProstCodec";

fn method(
    name: &str,
    route_name: &str,
    input_type: &str,
    output_type: &str,
) -> tonic_build::manual::MethodBuilder {
    Method::builder()
        .name(name)
        .route_name(route_name)
        .input_type(input_type)
        .output_type(output_type)
        .codec_path(CODEC)
}

fn main() {
    // Messages are hand-written prost structs in `src/proto`, so only the
    // service glue is generated and no protoc binary is needed.
    let state_service = Service::builder()
        .name("StateService")
        .package("shared_state")
        .comment("Shared key-value state with per-key optimistic locks.")
        .method(
            method(
                "subscribe_state_updates",
                "SubscribeStateUpdates",
                "crate::proto::SubscribeStateUpdatesRequest",
                "crate::proto::StateUpdate",
            )
            .server_streaming()
            .build(),
        )
        .method(
            method(
                "update_state",
                "UpdateState",
                "crate::proto::UpdateStateRequest",
                "crate::proto::UpdateStateResponse",
            )
            .build(),
        )
        .method(
            method(
                "update_locks",
                "UpdateLocks",
                "crate::proto::UpdateLocksRequest",
                "crate::proto::UpdateLocksResponse",
            )
            .build(),
        )
        .build();

    Builder::new().compile(&[state_service]);
}
