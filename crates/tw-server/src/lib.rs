//! Unified websocket hosting server: a single `/ws` endpoint carries the
//! command/event protocol (§6) for every session; `/health` is a bare
//! liveness probe.

pub mod args;
pub mod config;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::App;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::Responder;
use actix_web::middleware::Logger;
use actix_web::web;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tw_core::ADDRESS_RATE_LIMIT_SWEEP_INTERVAL;
use tw_core::CLIENT_BUFFER_HARD_CEILING;
use tw_core::CLIENT_BUFFER_WARN_THRESHOLD;
use tw_core::DRAIN_POLL_INTERVAL;
use tw_core::DRAIN_TIMEOUT;
use tw_core::TICK_INTERVAL;
use tw_core::now_ms;
use tw_registry::Registry;
use tw_store::GLOBAL_CHANNEL;
use tw_store::Pubsub;
use tw_store::session_channel;
use tw_transport::AddressLimiter;
use tw_transport::Command;
use tw_transport::ConnectionContext;
use tw_transport::ConnectionLimiter;
use tw_transport::Event;
use tw_transport::Router;

pub struct AppState {
    pub registry: Arc<Registry>,
    pub router: Arc<Router>,
    pub pubsub: Arc<dyn Pubsub>,
    pub address_limits: Mutex<AddressLimiter>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, pubsub: Arc<dyn Pubsub>) -> Arc<Self> {
        let router = Arc::new(Router::new(registry.clone()));
        Arc::new(Self {
            registry,
            router,
            pubsub,
            address_limits: Mutex::new(AddressLimiter::new()),
        })
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

/// Relays to every client currently subscribed on a session's channel and,
/// on the shared tier, to every other instance subscribed to the same
/// channel — the registry never publishes mutation events itself, only
/// the transport layer that knows the wire format does.
async fn publish_events(pubsub: &Arc<dyn Pubsub>, session_id: &str, events: &[Event]) {
    for event in events {
        if let Err(e) = pubsub.publish(&session_channel(session_id), &event.to_json()).await {
            log::warn!("[ws] publish to session {session_id} failed: {e}");
        }
    }
}

async fn ws_route(req: HttpRequest, body: web::Payload, state: web::Data<Arc<AppState>>) -> actix_web::Result<HttpResponse> {
    let address = req
        .peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if !state.address_limits.lock().await.admit_connection(&address) {
        return Ok(HttpResponse::TooManyRequests().body("rate limit exceeded"));
    }
    let (response, mut session, mut stream) = actix_ws::handle(&req, body)?;
    let state = state.into_inner();
    let client_id = uuid::Uuid::new_v4().to_string();

    actix_web::rt::spawn(async move {
        let mut ctx = ConnectionContext {
            client_id: client_id.clone(),
            session_id: None,
        };
        let mut limiter = ConnectionLimiter::new();
        let mut global_rx = match state.pubsub.subscribe(GLOBAL_CHANNEL).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                log::warn!("[ws] subscribing to the global channel failed: {e}");
                None
            }
        };
        let mut session_rx: Option<UnboundedReceiver<String>> = None;

        if session
            .text(Event::ClientId { client_id: ctx.client_id.clone() }.to_json())
            .await
            .is_err()
        {
            return;
        }

        log::debug!("[ws] {} connected", ctx.client_id);

        'conn: loop {
            tokio::select! {
                biased;

                msg = recv_or_pending(&mut global_rx) => match msg {
                    Some(_payload) => {
                        let event = Event::ShutdownWarning {
                            message: "server is shutting down".to_string(),
                            timeout: DRAIN_TIMEOUT.as_millis() as i64,
                        };
                        if session.text(event.to_json()).await.is_err() {
                            break 'conn;
                        }
                    }
                    None => global_rx = None,
                },

                msg = recv_or_pending(&mut session_rx) => match msg {
                    Some(payload) => {
                        if payload.len() > CLIENT_BUFFER_HARD_CEILING {
                            log::warn!("[ws] {} oversized relay dropped", ctx.client_id);
                            continue 'conn;
                        }
                        if payload.len() > CLIENT_BUFFER_WARN_THRESHOLD {
                            log::warn!("[ws] {} outbound message exceeds warn threshold", ctx.client_id);
                        }
                        if session.text(payload).await.is_err() {
                            break 'conn;
                        }
                    }
                    None => session_rx = None,
                },

                msg = stream.next() => match msg {
                    Some(Ok(actix_ws::Message::Text(text))) => {
                        if !limiter.admit_message() || !state.address_limits.lock().await.admit_message(&address) {
                            let _ = session.text(Event::error("Rate limit exceeded").to_json()).await;
                            continue 'conn;
                        }
                        handle_command(&state, &mut ctx, &mut session, &mut session_rx, &text).await;
                    }
                    Some(Ok(actix_ws::Message::Close(_))) | None => break 'conn,
                    Some(Err(_)) => break 'conn,
                    _ => continue 'conn,
                },
            }
        }

        if let Some(id) = &ctx.session_id {
            state.registry.client_disconnected(id).await;
        }
        log::debug!("[ws] {} disconnected", ctx.client_id);
    });

    Ok(response)
}

/// `rx.recv()` when a subscription is live, otherwise a future that never
/// resolves so the `select!` branch is simply skipped.
async fn recv_or_pending(rx: &mut Option<UnboundedReceiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_command(
    state: &Arc<AppState>,
    ctx: &mut ConnectionContext,
    session: &mut actix_ws::Session,
    session_rx: &mut Option<UnboundedReceiver<String>>,
    text: &str,
) {
    let command: Command = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(_) => {
            let _ = session.text(Event::error("Invalid request").to_json()).await;
            return;
        }
    };

    let previous_session = ctx.session_id.clone();
    let outcome = match state.router.dispatch(ctx, command).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = session.text(Event::error(e.message()).to_json()).await;
            return;
        }
    };

    if outcome.session_id != previous_session {
        if let Some(old) = &previous_session {
            state.registry.client_disconnected(old).await;
        }
        if let Some(new) = &outcome.session_id {
            state.registry.client_connected(new).await;
            *session_rx = match state.pubsub.subscribe(&session_channel(new)).await {
                Ok(rx) => Some(rx),
                Err(e) => {
                    log::warn!("[ws] subscribing to session {new} failed: {e}");
                    None
                }
            };
        }
        ctx.session_id = outcome.session_id.clone();
    }

    if let Some(id) = &outcome.session_id {
        publish_events(&state.pubsub, id, &outcome.broadcast).await;
    }
    for event in &outcome.private {
        if session.text(event.to_json()).await.is_err() {
            break;
        }
    }
}

/// Ticks every live session on [`TICK_INTERVAL`] and relays the resulting
/// events the same way a dispatched command's broadcast would be relayed.
fn spawn_ticker(registry: Arc<Registry>, pubsub: Arc<dyn Pubsub>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            for (id, events) in registry.tick_all(now_ms()).await {
                let wire = match registry.public_state(&id).await {
                    Ok(state) => tw_transport::protocol::encode_all(&events, &state),
                    Err(_) => continue,
                };
                publish_events(&pubsub, &id, &wire).await;
            }
        }
    });
}

/// Periodically evicts stale per-address rate-limit windows, the
/// rate-limit-cleanup timer stopped alongside persistence/reap/heartbeat
/// during drain.
fn spawn_address_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ADDRESS_RATE_LIMIT_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            state.address_limits.lock().await.sweep();
        }
    })
}

/// Watches [`tw_core::shutdown_requested`] and drives the drain sequence
/// once it flips, stopping the HTTP server only after every connection has
/// gone quiet or the drain timeout elapses.
fn spawn_shutdown_watcher(
    registry: Arc<Registry>,
    handle: actix_web::dev::ServerHandle,
    address_sweeper: tokio::task::JoinHandle<()>,
) {
    tokio::spawn(async move {
        loop {
            if tw_core::shutdown_requested() {
                let _ = registry.drain(DRAIN_TIMEOUT, DRAIN_POLL_INTERVAL).await;
                address_sweeper.abort();
                handle.stop(true).await;
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });
}

pub async fn run(bind: &str, port: u16, registry: Arc<Registry>, pubsub: Arc<dyn Pubsub>) -> std::io::Result<()> {
    let state = web::Data::new(AppState::new(registry.clone(), pubsub.clone()));
    spawn_ticker(registry.clone(), pubsub.clone());
    let address_sweeper = spawn_address_sweeper(state.get_ref().clone());

    log::info!("[server] listening on {bind}:{port}");
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%r %s %Ts"))
            .wrap(Cors::default().allow_any_origin().allow_any_method().allow_any_header())
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .route("/ws", web::get().to(ws_route))
    })
    .bind((bind, port))?
    .run();

    spawn_shutdown_watcher(registry, server.handle(), address_sweeper);
    server.await
}
