use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tungstenite::Message;
use tracing::{info, warn};
use uuid::Uuid;

use wheeled_vehicle::physics::{ChassisSettings, PhysicsWorld};
use wheeled_vehicle::VehicleSettings;

use crate::state::{ClientMessage, ServerMessage, Session, SharedGameState};

/// What every new client gets spawned with.
pub struct SpawnConfig {
    pub vehicle: VehicleSettings,
    pub chassis: ChassisSettings,
    pub position: [f32; 3],
}

pub async fn start_websocket_server(
    listen: SocketAddr,
    state: Arc<Mutex<SharedGameState>>,
    physics: Arc<Mutex<PhysicsWorld>>,
    spawn: Arc<SpawnConfig>,
) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind websocket listener on {listen}"))?;
    info!("websocket listening on ws://{listen}");

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(?err, "accept failed");
                continue;
            }
        };
        let state = Arc::clone(&state);
        let physics = Arc::clone(&physics);
        let spawn = Arc::clone(&spawn);

        tokio::spawn(async move {
            if let Err(err) = handle_client(raw, peer, state, physics, spawn).await {
                warn!(?peer, ?err, "client session ended with error");
            }
        });
    }
}

async fn handle_client(
    raw: TcpStream,
    peer: SocketAddr,
    state: Arc<Mutex<SharedGameState>>,
    physics: Arc<Mutex<PhysicsWorld>>,
    spawn: Arc<SpawnConfig>,
) -> Result<()> {
    let ws = accept_async(raw).await.context("websocket handshake")?;
    let (mut write, mut read) = ws.split();

    // outgoing channel + send loop
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // vehicle for this player
    let player_id = Uuid::new_v4().to_string();
    let chassis = {
        let mut phys = physics.lock().await;
        phys.spawn_vehicle(spawn.vehicle.clone(), &spawn.chassis, spawn.position)?
    };
    state.lock().await.add_session(Session {
        id: player_id.clone(),
        chassis,
        tx: tx.clone(),
    });
    info!(player = %player_id, ?peer, chassis = ?chassis, "player connected");

    let welcome = serde_json::to_string(&ServerMessage::Welcome { player_id: &player_id, chassis })?;
    let _ = tx.send(welcome);

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(err) => {
                warn!(player = %player_id, ?err, "websocket receive error");
                break;
            }
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else { continue };

        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Ping) => {
                if let Ok(pong) = serde_json::to_string(&ServerMessage::Pong) {
                    let _ = tx.send(pong);
                }
            }
            Ok(ClientMessage::Input(input)) => {
                physics.lock().await.set_input(chassis, input);
            }
            Err(err) => warn!(player = %player_id, ?err, "ignoring malformed message"),
        }
    }

    info!(player = %player_id, "player disconnected");
    state.lock().await.remove_session(&player_id);
    physics.lock().await.despawn_vehicle(chassis);
    Ok(())
}
