//! # siyi-agent
//!
//! Siyi binary. `serve` runs an echo server; `listen` runs an agent that
//! keeps a connection to a server and announces itself after every connect.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::json;
use siyi_client::{ClientConfig, ClientEngine, ConnectionState};
use siyi_core::{Event, Request, Response, to_params};
use siyi_server::{Connection, ServerConfig, ServerRegistry};
use siyi_settings::{ClientSettings, ServerSettings, SiyiSettings};
use tracing::{info, warn};

/// Siyi messaging endpoint.
#[derive(Parser, Debug)]
#[command(name = "siyi-agent", about = "Siyi messaging server and agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit newline-delimited JSON logs.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept agent connections and echo their requests.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides settings).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Connect to a server, reconnecting until interrupted.
    Listen {
        /// Server URL (overrides settings).
        #[arg(long)]
        url: Option<String>,

        /// Identity reported in `agent.started` (overrides settings).
        #[arg(long)]
        agent_id: Option<String>,
    },
}

impl Command {
    fn apply(&self, settings: &mut SiyiSettings) {
        match self {
            Self::Serve { host, port } => {
                if let Some(host) = host {
                    settings.server.host.clone_from(host);
                }
                if let Some(port) = port {
                    settings.server.port = *port;
                }
            }
            Self::Listen { url, agent_id } => {
                if let Some(url) = url {
                    settings.client.url.clone_from(url);
                }
                if let Some(agent_id) = agent_id {
                    settings.client.agent_id.clone_from(agent_id);
                }
            }
        }
    }
}

// ── serve ───────────────────────────────────────────────────────────────

async fn echo(_conn: Arc<Connection>, req: Request) -> Result<Response> {
    match req.command() {
        "echo" => Ok(Response::success(req.id().clone(), json!({ "echo": req.params() }))),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn build_server(settings: &ServerSettings) -> ServerRegistry {
    let registry = ServerRegistry::new(ServerConfig::from_settings(settings));
    registry.on_request(echo);
    registry.on_event(|conn: Arc<Connection>, ev: Event| async move {
        info!(conn_id = conn.id(), event = ev.name(), data = ?ev.data(), "event received");
        Ok(())
    });
    registry.on_connect(|conn: Arc<Connection>| async move {
        info!(conn_id = conn.id(), peer = conn.peer().unwrap_or("unknown"), "agent connected");
        Ok(())
    });
    registry.on_disconnect(|conn: Arc<Connection>| async move {
        info!(conn_id = conn.id(), age = ?conn.age(), "agent disconnected");
        Ok(())
    });
    registry
}

async fn serve(settings: &SiyiSettings) -> Result<()> {
    let registry = build_server(&settings.server);
    let addr = registry.listen().await.context("Failed to bind server")?;
    info!(%addr, "siyi server listening");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("shutting down");
    registry.stop().await;
    info!("shutdown complete");
    Ok(())
}

// ── listen ──────────────────────────────────────────────────────────────

async fn pong(req: Request) -> Result<Response> {
    match req.command() {
        "ping" => Ok(Response::success(req.id().clone(), json!({ "pong": true }))),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn build_agent(settings: &ClientSettings) -> ClientEngine {
    let engine = ClientEngine::new(ClientConfig::from_settings(settings));
    engine.on_request(pong);
    engine.on_event(|ev: Event| async move {
        info!(event = ev.name(), data = ?ev.data(), "event received");
        Ok(())
    });
    engine
}

/// Send `agent.started` every time the engine reaches `Connected`.
async fn announce_on_connect(engine: ClientEngine, agent_id: String) {
    let mut state = engine.subscribe_state();
    loop {
        let current = *state.borrow_and_update();
        if current == ConnectionState::Connected {
            let data = to_params(json!({ "agent_id": agent_id })).ok();
            match engine.send_event("agent.started", data).await {
                Ok(()) => info!(agent_id = %agent_id, "announced to server"),
                Err(e) => warn!(error = %e, "failed to announce agent"),
            }
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

async fn listen(settings: &SiyiSettings) -> Result<()> {
    let engine = build_agent(&settings.client);
    let announcer = tokio::spawn(announce_on_connect(engine.clone(), settings.client.agent_id.clone()));
    let driver = engine.spawn(true);
    info!(url = %engine.url(), agent_id = %settings.client.agent_id, "agent started");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            info!("shutting down");
            engine.disconnect().await;
        }
        outcome = driver => {
            outcome.context("connection task failed")??;
        }
    }

    announcer.abort();
    info!("shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        siyi_logging::init_json_subscriber(&cli.log_level);
    } else {
        siyi_logging::init_subscriber(&cli.log_level);
    }

    let mut settings = siyi_settings::load_settings().context("Failed to load settings")?;
    cli.command.apply(&mut settings);

    match cli.command {
        Command::Serve { .. } => serve(&settings).await,
        Command::Listen { .. } => listen(&settings).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use siyi_core::{Message, memory_pair};
    use std::time::Duration;

    #[test]
    fn cli_serve_defaults() {
        let cli = Cli::parse_from(["siyi-agent", "serve"]);
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
        assert!(matches!(cli.command, Command::Serve { host: None, port: None }));
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["siyi-agent", "listen", "--log-level", "debug", "--json-logs"]);
        assert_eq!(cli.log_level, "debug");
        assert!(cli.json_logs);
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["siyi-agent"]).is_err());
    }

    #[test]
    fn serve_flags_override_settings() {
        let cli = Cli::parse_from(["siyi-agent", "serve", "--host", "0.0.0.0", "--port", "9000"]);
        let mut settings = SiyiSettings::default();
        cli.command.apply(&mut settings);
        assert_eq!(settings.server.bind_addr(), "0.0.0.0:9000");
        assert_eq!(settings.client, ClientSettings::default());
    }

    #[test]
    fn listen_flags_override_settings() {
        let cli = Cli::parse_from([
            "siyi-agent",
            "listen",
            "--url",
            "ws://10.0.0.2:8765",
            "--agent-id",
            "relay_7",
        ]);
        let mut settings = SiyiSettings::default();
        cli.command.apply(&mut settings);
        assert_eq!(settings.client.url, "ws://10.0.0.2:8765");
        assert_eq!(settings.client.agent_id, "relay_7");
        assert_eq!(settings.server, ServerSettings::default());
    }

    #[tokio::test]
    async fn pong_answers_ping_only() {
        let req = Request::new("ping").unwrap();
        let resp = pong(req.clone()).await.unwrap();
        assert_eq!(resp.id(), req.id());
        assert_eq!(resp.data(), Some(&json!({"pong": true})));
        assert!(pong(Request::new("reboot").unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn server_echoes_and_rejects_unknown_commands() {
        let settings = ServerSettings {
            heartbeat_interval_secs: 0.0,
            ..ServerSettings::default()
        };
        let registry = build_server(&settings);
        let (local, mut peer) = memory_pair(8);
        let server = registry.clone();
        let _serve = tokio::spawn(async move { server.serve_connection(local).await });

        let params = to_params(json!({"message": "hello"})).unwrap();
        let req = Request::new("echo").unwrap().with_params(params);
        peer.sink.send(Message::from(req.clone()).encode().unwrap()).await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), peer.stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Response(resp) = Message::decode(&frame).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.id(), req.id());
        assert_eq!(resp.data(), Some(&json!({"echo": {"message": "hello"}})));

        peer.sink
            .send(Message::from(Request::new("reboot").unwrap()).encode().unwrap())
            .await
            .unwrap();
        let frame = peer.stream.next().await.unwrap().unwrap();
        let Message::Response(resp) = Message::decode(&frame).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(resp.error(), Some("unknown command: reboot"));
        registry.stop().await;
    }
}
