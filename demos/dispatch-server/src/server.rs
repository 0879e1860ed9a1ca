//! HTTP + WebSocket front of the dispatch backend.

use crate::dispatch::{Dispatch, Refusal};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use farmhaul_core::{DeliveryJob, JobId, JobStatus, NotificationEvent, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

struct AppState {
    token: String,
    dispatch: RwLock<Dispatch>,
    events: broadcast::Sender<NotificationEvent>,
}

type Shared = Arc<AppState>;

pub async fn run(port: u16, token: String) -> anyhow::Result<()> {
    let (events, _) = broadcast::channel(64);
    let state = Arc::new(AppState {
        token,
        dispatch: RwLock::new(Dispatch::seeded()),
        events,
    });

    let app = Router::new()
        .route("/deliveries/available", get(list_available))
        .route("/deliveries/mine", get(list_mine))
        .route("/deliveries/{id}/accept", post(accept))
        .route("/deliveries/{id}/status", post(report_status))
        .route("/deliveries/{id}/complete", post(complete))
        .route("/notifications/unread-count", get(unread_count))
        .route("/ws/notifications", get(ws_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

struct Failure(StatusCode, String);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "message": self.1 }))).into_response()
    }
}

impl From<Refusal> for Failure {
    fn from(refusal: Refusal) -> Self {
        match refusal {
            Refusal::NotFound => Failure(StatusCode::NOT_FOUND, "Delivery not found".into()),
            Refusal::Conflict(message) => Failure(StatusCode::CONFLICT, message),
            Refusal::BadRequest(message) => Failure(StatusCode::BAD_REQUEST, message),
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Failure> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(state.token.as_str()) {
        Ok(())
    } else {
        Err(Failure(StatusCode::UNAUTHORIZED, "Invalid credentials".into()))
    }
}

fn announce(state: &AppState, events: Vec<NotificationEvent>) {
    for event in events {
        tracing::info!("{} {}", event.kind, event.title);
        // No subscribers is fine; the event is still in the replay log.
        let _ = state.events.send(event);
    }
}

async fn list_available(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Vec<DeliveryJob>>, Failure> {
    authorize(&state, &headers)?;
    Ok(Json(state.dispatch.read().await.available()))
}

#[derive(Deserialize)]
struct MineQuery {
    transporter: String,
}

async fn list_mine(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<MineQuery>,
) -> Result<Json<Vec<DeliveryJob>>, Failure> {
    authorize(&state, &headers)?;
    Ok(Json(state.dispatch.read().await.assigned_to(&query.transporter)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptBody {
    transporter_id: String,
}

async fn accept(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AcceptBody>,
) -> Result<StatusCode, Failure> {
    authorize(&state, &headers)?;
    let events = state
        .dispatch
        .write()
        .await
        .accept(&JobId::from(id), &body.transporter_id)?;
    announce(&state, events);
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct StatusBody {
    status: JobStatus,
}

async fn report_status(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<StatusCode, Failure> {
    authorize(&state, &headers)?;
    let events = state
        .dispatch
        .write()
        .await
        .report(&JobId::from(id), body.status)?;
    announce(&state, events);
    Ok(StatusCode::OK)
}

async fn complete(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, Failure> {
    authorize(&state, &headers)?;
    let events = state.dispatch.write().await.complete(&JobId::from(id))?;
    announce(&state, events);
    Ok(StatusCode::OK)
}

async fn unread_count(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, Failure> {
    authorize(&state, &headers)?;
    Ok(Json(json!({ "count": state.dispatch.read().await.unread() })))
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Shared>,
    Query(query): Query<WsQuery>,
) -> Response {
    if query.token.as_deref() != Some(state.token.as_str()) {
        return Failure(StatusCode::UNAUTHORIZED, "Invalid credentials".into()).into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Shared) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the replay so nothing falls in between.
    let mut events = state.events.subscribe();
    let replay: Vec<NotificationEvent> = state.dispatch.read().await.replay().cloned().collect();
    for event in replay {
        if !send_event(&mut sender, event).await {
            return;
        }
    }
    tracing::info!("Notification client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_event(&mut sender, event).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Client lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!("Notification client disconnected");
}

async fn send_event<S>(sender: &mut S, event: NotificationEvent) -> bool
where
    S: futures_util::Sink<Message> + Unpin,
{
    let text = match ServerMessage::notification(event).to_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Cannot encode notification: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
