use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use wheeled_vehicle::physics::PhysicsWorld;
use wheeled_vehicle::telemetry::VehicleTelemetry;
use wheeled_vehicle::vehicle::{ChassisId, DriverInput};

/// Messages a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Input(DriverInput),
    Ping,
}

/// Messages the server sends.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    Welcome { player_id: &'a str, chassis: ChassisId },
    Pong,
    Telemetry { tick: u64, vehicles: Vec<VehicleSnapshot<'a>> },
}

#[derive(Debug, Serialize)]
pub struct VehicleSnapshot<'a> {
    pub id: &'a str,
    #[serde(flatten)]
    pub telemetry: VehicleTelemetry,
}

pub struct Session {
    pub id: String,
    pub chassis: ChassisId,
    pub tx: UnboundedSender<String>,
}

pub struct SharedGameState {
    pub tick: u64,
    pub sessions: HashMap<String, Session>,
}

impl SharedGameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            sessions: HashMap::new(),
        }
    }

    pub fn add_session(&mut self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn remove_session(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Build one telemetry message for every vehicle and send it to all clients.
    pub fn broadcast_telemetry(&self, world: &PhysicsWorld) {
        let vehicles = self
            .sessions
            .values()
            .filter_map(|s| {
                let controller = world.vehicle(s.chassis)?;
                let chassis = world.chassis_state(s.chassis);
                Some(VehicleSnapshot {
                    id: &s.id,
                    telemetry: VehicleTelemetry::capture(
                        controller,
                        chassis.as_ref(),
                        world.last_impulses.get(&s.chassis),
                    ),
                })
            })
            .collect();

        let json = match serde_json::to_string(&ServerMessage::Telemetry { tick: self.tick, vehicles }) {
            Ok(json) => json,
            Err(err) => {
                warn!(?err, "failed to serialize telemetry");
                return;
            }
        };

        for session in self.sessions.values() {
            let _ = session.tx.send(json.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_messages_parse_with_missing_fields() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"input","forward":0.5,"right":-1.0}"#).unwrap();
        match msg {
            ClientMessage::Input(input) => {
                assert_eq!(input.forward, 0.5);
                assert_eq!(input.right, -1.0);
                assert_eq!(input.brake, 0.0);
                assert!(!input.shift_up);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#),
            Ok(ClientMessage::Ping)
        ));
    }

    #[test]
    fn telemetry_reaches_every_session() {
        let mut world = PhysicsWorld::new();
        let chassis = world
            .spawn_vehicle(Default::default(), &Default::default(), [0.0, 1.0, 0.0])
            .unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut game = SharedGameState::new();
        game.add_session(Session { id: "a".into(), chassis, tx });

        world.step(1.0 / 60.0);
        game.broadcast_telemetry(&world);

        let json = rx.try_recv().unwrap();
        assert!(json.starts_with(r#"{"type":"telemetry""#));
        assert!(json.contains(r#""id":"a""#));
    }
}
