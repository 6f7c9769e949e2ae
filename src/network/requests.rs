//! Request handling shared by the gRPC service and the in-process transport.

use std::collections::BTreeMap;
use std::time::Duration;

use tonic::Status;

use crate::proto::SubscribeStateUpdatesRequest;
use crate::proto::UpdateLocksRequest;
use crate::proto::UpdateLocksResponse;
use crate::proto::UpdateStateRequest;
use crate::proto::UpdateStateResponse;
use crate::AccessToken;
use crate::StateChanges;
use crate::StateStore;
use crate::Value;

pub(crate) fn handle_update_state(
    store: &StateStore,
    request: UpdateStateRequest,
) -> std::result::Result<UpdateStateResponse, Status> {
    let token = access_token(request.access_token)?;
    let changes = request.update.map(StateChanges::from).unwrap_or_default();

    Ok(UpdateStateResponse {
        success: store.update_state(&token, changes),
    })
}

pub(crate) fn handle_update_locks(
    store: &StateStore,
    request: UpdateLocksRequest,
) -> std::result::Result<UpdateLocksResponse, Status> {
    let token = access_token(request.access_token)?;
    let lock_keys: BTreeMap<String, Value> = request
        .lock_keys
        .map(|s| s.fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
        .unwrap_or_default();

    Ok(UpdateLocksResponse {
        success: store.update_locks_from_values(&token, lock_keys),
    })
}

/// Requested push interval. Negative or non-finite requests read as zero and
/// end up at the store's minimum.
pub(crate) fn requested_interval(request: &SubscribeStateUpdatesRequest) -> Duration {
    Duration::try_from_secs_f32(request.update_interval).unwrap_or(Duration::ZERO)
}

fn access_token(raw: String) -> std::result::Result<AccessToken, Status> {
    if raw.is_empty() {
        return Err(Status::invalid_argument("access token must not be empty"));
    }
    Ok(AccessToken::from(raw))
}
