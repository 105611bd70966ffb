use std::sync::{Arc, Mutex};
use std::time::Duration;

use netcall::prelude::*;
use netcall::protocol::JsonCodec;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Game functions
// ---------------------------------------------------------------------------

/// Client → server: a level name, its header, and the tile data.
const UPLOAD_LEVEL: FunctionId = FunctionId(1);
/// Server → client: acknowledges an upload with the number of tiles stored.
const LEVEL_STORED: FunctionId = FunctionId(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LevelHeader {
    width: u32,
    height: u32,
    author: String,
}

/// Uploads the server has received and not yet acknowledged.
type Acks = Arc<Mutex<Vec<(PeerId, u64)>>>;

/// Both nodes run the same game code, so both register every function; the
/// role decides which side actually runs each handler.
fn registry(acks: &Acks, done: &Arc<Mutex<bool>>) -> Result<FunctionRegistry, NetcallError> {
    let mut registry = FunctionRegistry::new();

    let acks = Arc::clone(acks);
    registry.register_handler(UPLOAD_LEVEL, Role::ServerOnly, 3, move |ctx, r| {
        let name = r.read_string()?;
        let header: LevelHeader = r.read_record(&JsonCodec)?;
        let tiles = r.read_blob()?;
        tracing::info!(
            peer = %ctx.peer,
            %name,
            author = %header.author,
            width = header.width,
            height = header.height,
            tiles = tiles.len(),
            "level uploaded"
        );
        if let Ok(mut acks) = acks.lock() {
            acks.push((ctx.peer, tiles.len() as u64));
        }
        Ok(())
    })?;

    let done = Arc::clone(done);
    registry.register_handler(LEVEL_STORED, Role::ClientOnly, 1, move |ctx, r| {
        let tiles = r.read_u64()?;
        tracing::info!(peer = %ctx.peer, tiles, "server stored the level");
        if let Ok(mut done) = done.lock() {
            *done = true;
        }
        Ok(())
    })?;
    Ok(registry)
}

/// Reads a JSON `NodeConfig` from `NETCALL_CONFIG`, if set. Fields left out
/// keep their defaults.
fn load_config() -> Result<NodeConfig, Box<dyn std::error::Error>> {
    match std::env::var("NETCALL_CONFIG") {
        Ok(json) => Ok(serde_json::from_str(&json)?),
        Err(_) => Ok(NodeConfig {
            protocol: ProtocolConfig {
                split_threshold: 64 * 1024,
                max_buffer_size: 256 * 1024,
                ..ProtocolConfig::default()
            },
            ..NodeConfig::default()
        }),
    }
}

/// A random tile map that LZ4 cannot shrink much.
fn tiles(len: usize) -> Vec<u8> {
    let mut tiles = vec![0u8; len];
    rand::rng().fill_bytes(&mut tiles);
    tiles
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let acks = Acks::default();
    let done = Arc::new(Mutex::new(false));

    let mut server: Node<MemoryConnection> = NodeBuilder::new(NodeRole::Server)
        .config(config.clone())
        .registry(registry(&acks, &done)?)
        .build()?;
    let mut client: Node<MemoryConnection> = NodeBuilder::new(NodeRole::Client)
        .config(config)
        .registry(registry(&acks, &done)?)
        .build()?;

    let (client_end, server_end) = memory_pair();
    let server_id = client.attach(client_end);
    server.attach(server_end);

    let header = LevelHeader {
        width: 1024,
        height: 1024,
        author: "loopback".into(),
    };
    let transfer_id = client.invoke(
        Recipient::Peer(server_id),
        UPLOAD_LEVEL,
        Role::ServerOnly,
        DeliveryPolicy::Reliable,
        &[
            "canyon".into(),
            Value::record(&JsonCodec, &header)?,
            tiles(2 * 1024 * 1024).into(),
        ],
    )?;
    tracing::info!(%transfer_id, "upload queued");

    let mut ticker = tokio::time::interval(Duration::from_millis(5));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);

    while !done.lock().map(|d| *d).unwrap_or(true) {
        if tokio::time::Instant::now() > deadline {
            return Err("timed out waiting for the upload".into());
        }
        ticker.tick().await;
        client.tick().await;
        server.tick().await;

        let pending: Vec<(PeerId, u64)> = match acks.lock() {
            Ok(mut acks) => acks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for (peer, stored) in pending {
            server.invoke(
                Recipient::Peer(peer),
                LEVEL_STORED,
                Role::ClientOnly,
                DeliveryPolicy::Reliable,
                &[stored.into()],
            )?;
        }
    }

    client.detach(server_id).await;
    tracing::info!("done");
    Ok(())
}
