use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use warp::Filter;
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket, Ws};

use crate::channel::{Inbox, Outbox};
use crate::driver::{Controls, Frame};

/// Handles the HTTP layer shares with the driver.
#[derive(Clone)]
pub struct WebState {
    pub controls: Controls,
    pub inbox: Inbox,
    pub outbox: Outbox,
    pub frames: watch::Receiver<Frame>,
}

fn with_state(state: WebState) -> impl Filter<Extract = (WebState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn routes(state: WebState) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let ws_route = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_state(state.clone()))
        .map(|ws: Ws, st: WebState| ws.on_upgrade(move |socket| client(socket, st)));

    let control_route = warp::path!("control" / String)
        .and(warp::post())
        .and(with_state(state.clone()))
        .map(|cmd: String, st: WebState| {
            let c = &st.controls;
            match cmd.as_str() {
                "start" => c.start(),
                "pause" => c.pause(),
                "stop" => c.stop(),
                "train" => c.start_training(),
                "stop-training" => c.stop_training(),
                _ => {
                    return warp::reply::with_status(
                        warp::reply::json(&json!({ "error": format!("unknown command {cmd}") })),
                        StatusCode::NOT_FOUND,
                    );
                }
            }
            tracing::info!(command = %cmd, "control request");
            warp::reply::with_status(warp::reply::json(&json!({ "mode": c.mode() })), StatusCode::OK)
        });

    let state_route = warp::path("state")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .map(|st: WebState| {
            let frame = st.frames.borrow().clone();
            warp::reply::json(&frame)
        });

    ws_route.or(control_route).or(state_route)
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: WebState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), warp::Error> {
    let (bound, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    tracing::info!(addr = %bound, "web server listening (ws at /ws, controls at /control/*)");
    server.await;
    Ok(())
}

// one websocket client: outbound broadcast -> socket, socket -> inbox
async fn client(socket: WebSocket, st: WebState) {
    let (mut sink, mut stream) = socket.split();
    let mut outbound = st.outbox.subscribe();
    tracing::info!("websocket client connected");

    let forward = async {
        loop {
            match outbound.recv().await {
                Ok(msg) => {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::warn!(error = %e, "could not encode outbound message");
                            continue;
                        }
                    };
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "websocket client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    let receive = async {
        while let Some(result) = stream.next().await {
            let msg = match result {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "websocket error");
                    break;
                }
            };
            if msg.is_close() {
                break;
            }
            let Ok(text) = msg.to_str() else {
                continue;
            };
            if let Err(e) = st.inbox.deliver_text(text) {
                tracing::warn!(error = %e, payload = text, "dropping inbound message");
            }
        }
    };

    tokio::select! {
        _ = forward => {}
        _ = receive => {}
    }
    tracing::info!("websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Mailbox, WireMessage, mailbox};
    use crate::config::SessionConfig;
    use crate::driver::{InteractionDriver, Mode};
    use crate::session::Session;
    use crate::snake::Action;
    use std::time::Duration;

    fn state() -> (WebState, Mailbox) {
        let session = Session::new(&SessionConfig { env_seed: Some(1), ..SessionConfig::default() }).unwrap();
        let controls = Controls::new();
        let (inbox, mb) = mailbox();
        let outbox = Outbox::new(16);
        let (_, driver_mb) = mailbox();
        let driver = InteractionDriver::new(session, controls.clone(), driver_mb, outbox.clone());
        let frames = driver.frames();
        // the receiver stays valid after the driver is dropped
        drop(driver);
        (WebState { controls, inbox, outbox, frames }, mb)
    }

    #[tokio::test]
    async fn control_endpoints_flip_mode() {
        let (st, _mb) = state();
        let controls = st.controls.clone();
        let api = routes(st);

        let res = warp::test::request().method("POST").path("/control/start").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(controls.mode(), Mode::Interactive);

        let res = warp::test::request().method("POST").path("/control/train").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(controls.mode(), Mode::Training);

        let res = warp::test::request().method("POST").path("/control/stop-training").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(controls.mode(), Mode::Idle);

        let res = warp::test::request().method("POST").path("/control/jump").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn state_endpoint_returns_frame() {
        let (st, _mb) = state();
        let api = routes(st);
        let res = warp::test::request().method("GET").path("/state").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["mode"], "idle");
        assert_eq!(body["state"]["body"][0]["x"], 5);
    }

    #[tokio::test]
    async fn websocket_relays_both_ways() {
        let (st, mut mb) = state();
        let outbox = st.outbox.clone();
        let api = routes(st);
        let mut client = warp::test::ws().path("/ws").handshake(api).await.unwrap();

        client.send_text("not json").await;
        client.send_text(r#"{"action": 1}"#).await;
        let mut got = None;
        for _ in 0..200 {
            got = mb.latest();
            if got.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(got, Some(WireMessage::Action { action: 1 }));

        assert!(outbox.send(WireMessage::action(Action::Right)));
        let msg = client.recv().await.unwrap();
        assert_eq!(msg.to_str().unwrap(), r#"{"action":3}"#);
    }
}
