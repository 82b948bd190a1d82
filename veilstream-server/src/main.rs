//! # Veilstream Server
//!
//! Binary entry point for the veilstream moderation pipeline.
//!
//! ## Overview
//!
//! Loads a [`ModerationConfig`], wires a [`SessionRegistry`] with the
//! overload policy the config selects, and then either runs the scripted
//! `--demo` harness or idles waiting for the process to be told to shut
//! down. Attaching real broadcaster sources/sinks to a `Session` is the
//! responsibility of whatever SFU/signaling integration embeds this crate;
//! the binary here only proves the wiring compiles and runs end to end.

#[cfg(feature = "demo")]
mod demos;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use veilstream_config::ModerationConfig;
use veilstream_contracts::NoopObservability;
use veilstream_core::{build_overload_policy, SessionRegistry};

/// Command line arguments for the veilstream moderation server.
#[derive(Parser, Debug)]
#[command(name = "veilstream-server")]
#[command(about = "Real-time WebRTC video moderation pipeline")]
struct Args {
    /// Run the scripted in-process demo instead of idling for external
    /// signaling/broadcast integration.
    #[cfg(feature = "demo")]
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "veilstream_server=info,veilstream_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, source) = match ModerationConfig::load_from_env() {
        Ok(loaded) => loaded,
        Err(err) => {
            error!("failed to load configuration: {err}");
            return Err(anyhow::anyhow!(err));
        }
    };
    info!(?source, "configuration loaded");
    let config = Arc::new(config);

    #[cfg(feature = "demo")]
    if args.demo {
        let summary = demos::run_demo(config).await;
        info!(
            frames_published = summary.frames_published,
            frames_dropped = summary.frames_dropped,
            detections_observed = summary.detections_observed,
            peak_active_tracks = summary.peak_active_tracks,
            peak_active_regions = summary.peak_active_regions,
            "demo run complete"
        );
        return Ok(());
    }

    let observability = Arc::new(NoopObservability);
    let overload_policy = build_overload_policy(&config);
    let now_ms: Arc<dyn Fn() -> u64 + Send + Sync> = Arc::new(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    });

    // The concrete InferenceService is supplied by whatever detector
    // transport embeds this crate; there is no default remote endpoint to
    // dial here, so the production path is left for the embedder to
    // complete by swapping this registry construction for one backed by a
    // real `InferenceService` and a real SFU-facing `BroadcastSource`.
    warn!("no InferenceService wired; waiting for shutdown signal without attaching a broadcaster");
    let _registry = SessionRegistry::new(
        config,
        Arc::new(UnwiredInferenceService),
        observability,
        overload_policy,
        now_ms,
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}

/// Placeholder [`InferenceService`] for the idle (no `--demo`) path, where
/// no broadcaster is ever attached and no batch is ever submitted. Exists
/// only so [`SessionRegistry`] has something to construct `Session`s with.
struct UnwiredInferenceService;

#[async_trait::async_trait]
impl veilstream_contracts::InferenceService for UnwiredInferenceService {
    async fn detect(
        &self,
        _batch: veilstream_contracts::BatchRequest,
    ) -> Result<Vec<veilstream_contracts::FrameResult>, veilstream_contracts::InferenceTransportError>
    {
        Err(veilstream_contracts::InferenceTransportError::Permanent(
            "no inference transport configured".to_string(),
        ))
    }
}
