use axum::{
    Json,
    extract::{FromRequestParts, Path, State},
    http::{HeaderMap, StatusCode, request::Parts},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use shellcast_core::{
    OutputPolicy, Owner, SessionId, SessionInfo, StreamMode, StreamRequest,
};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Header carrying the user name established by the authenticating proxy.
pub const REMOTE_USER_HEADER: &str = "x-remote-user";

/// The caller's identity, trusted as set by the fronting proxy.
#[derive(Debug, Clone)]
pub struct RemoteUser(pub Owner);

impl RemoteUser {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(REMOTE_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(|user| Self(Owner::new(user)))
    }
}

impl<S> FromRequestParts<S> for RemoteUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers).ok_or_else(|| {
            AppError::unauthorized("Missing authenticated user")
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateStreamRequest {
    pub filename: String,
    #[serde(default)]
    pub mode: Option<StreamMode>,
    #[serde(default)]
    pub policy: Option<OutputPolicy>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStreamResponse {
    pub session_id: SessionId,
    pub m3u8: String,
    /// Subtitle manifest URL; the file appears once extraction finishes
    pub subtitles: Option<String>,
}

/// Start a session for the caller, replacing any session they already
/// have. Responds once the playlist is playable.
pub async fn create_stream_handler(
    State(state): State<AppState>,
    RemoteUser(owner): RemoteUser,
    Json(body): Json<CreateStreamRequest>,
) -> AppResult<Json<CreateStreamResponse>> {
    let source = state.media.resolve(&body.filename).await?;
    let mode = body.mode.unwrap_or(StreamMode::Video);
    let policy = body.policy.unwrap_or_default();

    info!(
        %owner,
        mode = mode.label(),
        policy = policy.label(),
        filename = %body.filename,
        "stream requested"
    );

    let request =
        StreamRequest::new(owner.as_str(), mode, source).with_policy(policy);
    let session = state.registry.create(request).await?;

    Ok(Json(CreateStreamResponse {
        session_id: session.id(),
        m3u8: session.manifest_url(),
        subtitles: session
            .mode()
            .carries_subtitles()
            .then(|| session.subtitles_url()),
    }))
}

pub async fn get_stream_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SessionInfo>> {
    let id: SessionId = id
        .parse()
        .map_err(|_| AppError::not_found(format!("Session {id} not found")))?;
    Ok(Json(state.registry.get(&id)?))
}

/// Stop the caller's session. Always 204: unknown ids, foreign sessions
/// and repeated calls are all already "not running" from the caller's view.
pub async fn stop_stream_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StatusCode {
    let (Some(RemoteUser(owner)), Ok(id)) =
        (RemoteUser::from_headers(&headers), id.parse::<SessionId>())
    else {
        return StatusCode::NO_CONTENT;
    };

    if !state.registry.stop_owned(&id, &owner).await {
        debug!(session_id = %id, %owner, "stop ignored: no such session for owner");
    }
    StatusCode::NO_CONTENT
}
