//! skillbot-gateway: HTTP server for the skill agent.
//!
//! Provides:
//! - Token auth gate applied before any agent or model work
//! - `POST /chat` agent endpoint, plain and streaming model endpoints
//! - Unauthenticated `GET /health`
//! - Skills directory hot-reload

pub mod auth;
pub mod routes;
pub mod skills_watcher;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use skillbot_agent::{ChatModel, OpenAiCompatModel, ReactAgent};
use skillbot_config::SkillBotConfig;
use skillbot_skills::SkillStore;
use skillbot_tools::{ShellSettings, Workspace, standard_registry};

pub use auth::{AuthError, AuthGate};
pub use routes::{GatewayState, build_router};

/// Build the agent with the configured OpenAI-compatible model.
pub fn build_agent(config: &SkillBotConfig, working_dir: &Path) -> anyhow::Result<ReactAgent> {
    let model = OpenAiCompatModel::from_config(&config.model, config.agent.model_timeout())
        .context("initializing model client")?;
    build_agent_with_model(config, working_dir, Arc::new(model))
}

/// Build the agent around an arbitrary model.
///
/// Skills and tools are loaded once here; a missing skills directory is fatal.
pub fn build_agent_with_model(
    config: &SkillBotConfig,
    working_dir: &Path,
    model: Arc<dyn ChatModel>,
) -> anyhow::Result<ReactAgent> {
    let skills_dir = config.skills_dir(working_dir);
    let skills = SkillStore::open(&skills_dir)
        .with_context(|| format!("loading skills from {}", skills_dir.display()))?;
    for warning in skills.snapshot().warnings() {
        warn!("Skipped skill definition: {warning}");
    }

    let root = config.tools_root(working_dir);
    let workspace = Workspace::new(&root)
        .with_context(|| format!("opening tool root {}", root.display()))?;
    let shell = ShellSettings {
        timeout: config.tools.shell.timeout(),
        max_output_bytes: config.tools.shell.max_output_bytes,
        sanitize_args: config.tools.shell.sanitize_args,
    };
    let tools = standard_registry(workspace, shell)?;
    info!(
        tools = ?tools.names(),
        root = %root.display(),
        "Tool registry ready"
    );

    Ok(ReactAgent::new(
        model,
        Arc::new(tools),
        Arc::new(skills),
        config.agent.clone(),
    ))
}

/// Start the gateway server.
///
/// Everything is constructed eagerly before the listener binds. Returns
/// after Ctrl-C once in-flight requests have drained.
pub async fn start_gateway(
    config: SkillBotConfig,
    working_dir: &Path,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    config.auth.validate_for_gateway()?;
    let port = port_override.unwrap_or(config.gateway.port);
    let host = config.gateway.host.clone();

    let agent = Arc::new(build_agent(&config, working_dir)?);
    let gate = Arc::new(AuthGate::from_config(&config.auth)?);

    let shutdown = CancellationToken::new();
    let watcher = if config.skills.watch {
        skills_watcher::start_skills_watcher(agent.skills().clone(), shutdown.clone())
    } else {
        None
    };

    let state = Arc::new(GatewayState {
        agent,
        gate: gate.clone(),
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Gateway listening on {addr}");
    info!("  Agent:     POST http://{addr}/chat");
    info!("  Model:     GET  http://{addr}/model/simple/chat, /model/stream/chat");
    info!("  Health:    GET  http://{addr}/health");
    info!("  Auth header: {}", gate.header_name());
    if watcher.is_some() {
        info!("  Skills watcher: active");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = watcher {
        let _ = handle.await;
    }
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("Failed to listen for Ctrl-C: {e}");
                // without a signal handler only an explicit cancel stops us
                shutdown.cancelled().await;
            }
        }
        _ = shutdown.cancelled() => {}
    }
    info!("Shutting down gateway");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_skills_directory_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SkillBotConfig::default();
        let model: Arc<dyn ChatModel> = Arc::new(
            OpenAiCompatModel::new("http://127.0.0.1:9", "test", "key", std::time::Duration::from_secs(1))
                .unwrap(),
        );
        let err = build_agent_with_model(&config, tmp.path(), model)
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("loading skills"));
    }

    #[test]
    fn test_build_agent_with_skills_and_tools() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("skills")).unwrap();
        let config = SkillBotConfig::default();
        let model: Arc<dyn ChatModel> = Arc::new(
            OpenAiCompatModel::new("http://127.0.0.1:9", "test", "key", std::time::Duration::from_secs(1))
                .unwrap(),
        );
        let agent = build_agent_with_model(&config, tmp.path(), model).unwrap();
        assert_eq!(agent.name(), "skill-agent");
        assert_eq!(agent.tools().len(), 4);
        assert_eq!(agent.skills().count(), 0);
    }
}
