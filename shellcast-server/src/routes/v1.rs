use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, stream::stream_handlers};

pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/streams", post(stream_handlers::create_stream_handler))
        .route(
            "/streams/{id}",
            get(stream_handlers::get_stream_handler)
                .delete(stream_handlers::stop_stream_handler),
        )
}
