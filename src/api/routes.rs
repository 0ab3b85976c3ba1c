use std::sync::Arc;

use warp::http::StatusCode;
use warp::Filter;

use super::websocket;
use crate::collab::room::is_valid_room_id;
use crate::collab::CollabServer;

/// Creates the collaboration WebSocket route
pub fn collab_websocket_route(
    server: Arc<CollabServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("collab")
        .and(warp::ws())
        .and(with_collab_server(server))
        .map(|ws: warp::ws::Ws, server: Arc<CollabServer>| {
            ws.on_upgrade(move |websocket| {
                websocket::handle_collab_websocket(websocket, server)
            })
        })
}

/// Room existence/validity lookup consumed by clients before they open a
/// WebSocket. Malformed ids are rejected with a message the caller can
/// surface; well-formed ids report whether the room currently exists
/// (a fresh id is joinable, the first join creates the room).
pub fn room_verify_route(
    server: Arc<CollabServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("room" / "verify" / String)
        .and(warp::get())
        .and(with_collab_server(server))
        .and_then(verify_room)
}

async fn verify_room(
    room_id: String,
    server: Arc<CollabServer>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if !is_valid_room_id(&room_id) {
        tracing::debug!(room_id = %room_id, "Rejected malformed room id");
        let body = serde_json::json!({
            "message": format!("Invalid room id: {}", room_id)
        });
        return Ok(warp::reply::with_status(
            warp::reply::json(&body),
            StatusCode::BAD_REQUEST,
        ));
    }

    let exists = server.rooms().room_exists(&room_id).await;
    let body = serde_json::json!({
        "roomId": room_id,
        "exists": exists
    });
    Ok(warp::reply::with_status(
        warp::reply::json(&body),
        StatusCode::OK,
    ))
}

pub fn collab_health_check() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("collab")
        .and(warp::path("health"))
        .and(warp::get())
        .map(|| {
            warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "Coderoom Server",
                "version": "1.0.0"
            }))
        })
}

pub fn collab_config_endpoint() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("collab")
        .and(warp::path("config"))
        .and(warp::get())
        .map(|| {
            use std::env;

            let config = serde_json::json!({
                "COLLAB_WEBSOCKET_URL": env::var("COLLAB_WEBSOCKET_URL").ok(),
                "EXECUTOR_URL": env::var("EXECUTOR_URL").ok(),
            });

            warp::reply::json(&config)
        })
}

fn with_collab_server(
    server: Arc<CollabServer>,
) -> impl Filter<Extract = (Arc<CollabServer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || server.clone())
}
