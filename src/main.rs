mod net;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wheeled_vehicle::physics::{ChassisSettings, PhysicsWorld};
use wheeled_vehicle::VehicleSettings;

use crate::net::{start_websocket_server, SpawnConfig};
use crate::state::SharedGameState;

#[derive(Parser, Debug)]
#[command(author, version, about = "Wheeled vehicle physics server")]
struct Args {
    /// WebSocket listen address
    #[arg(long, default_value = "0.0.0.0:9001")]
    listen: SocketAddr,
    /// Fixed simulation rate
    #[arg(long, default_value_t = 60)]
    tick_hz: u32,
    /// Vehicle settings (JSON). Defaults to the built-in sample car.
    #[arg(long)]
    vehicle: Option<PathBuf>,
    /// Print the effective vehicle settings as JSON and exit
    #[arg(long)]
    dump_vehicle: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if args.tick_hz == 0 {
        bail!("--tick-hz must be positive");
    }

    let vehicle = match &args.vehicle {
        Some(path) => VehicleSettings::load(path)
            .with_context(|| format!("loading vehicle settings from {}", path.display()))?,
        None => VehicleSettings::default(),
    };
    if args.dump_vehicle {
        println!("{}", vehicle.to_json_pretty()?);
        return Ok(());
    }

    info!(tick_hz = args.tick_hz, "starting vehicle physics server");

    let state = Arc::new(Mutex::new(SharedGameState::new()));
    let physics = Arc::new(Mutex::new(PhysicsWorld::new()));
    let spawn = Arc::new(SpawnConfig {
        vehicle,
        chassis: ChassisSettings::default(),
        position: [0.0, 1.0, 0.0],
    });

    let server = tokio::spawn(start_websocket_server(
        args.listen,
        Arc::clone(&state),
        Arc::clone(&physics),
        spawn,
    ));

    let dt = 1.0 / args.tick_hz as f32;
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut phys = physics.lock().await;
                let mut game = state.lock().await;

                phys.step(dt);

                game.tick += 1;
                game.broadcast_telemetry(&phys);
            }
            res = tokio::signal::ctrl_c() => {
                res.context("waiting for ctrl-c")?;
                info!("shutting down");
                break;
            }
        }
        if server.is_finished() {
            break;
        }
    }

    if server.is_finished() {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(?err, "websocket server stopped");
                return Err(err);
            }
            Err(err) => return Err(err).context("websocket server task"),
        }
    }
    Ok(())
}
