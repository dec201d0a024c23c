//! CLI command implementations

use crate::output::{print_json, OutputFormat};
use playout_core::backend::{backend_kind, DashEngine, HlsConfig, HlsEngine, Platform};
use playout_core::{negotiate as negotiate_matrix, select_offering, Drm, Error, Offering, PlayerConfig, PlayoutOptions, Protocol};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Runtime capabilities assumed for backend selection
pub struct Capabilities {
    pub hlsjs: bool,
    pub native_hls: bool,
}

impl Platform for Capabilities {
    fn hlsjs_supported(&self) -> bool {
        self.hlsjs
    }

    fn native_hls_supported(&self) -> bool {
        self.native_hls
    }

    fn create_hls_engine(&self, _config: &HlsConfig) -> playout_core::Result<Arc<dyn HlsEngine>> {
        Err(Error::BackendUnsupported("no hls.js engine outside a browser".to_string()))
    }

    fn create_dash_engine(&self) -> playout_core::Result<Arc<dyn DashEngine>> {
        Err(Error::BackendUnsupported("no dash.js engine outside a browser".to_string()))
    }
}

#[derive(Serialize)]
struct NegotiationReport {
    protocol: Protocol,
    drm: Drm,
    backend: Option<String>,
    backend_error: Option<String>,
    playout_url: Option<String>,
}

async fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

/// Negotiate protocol and DRM against a saved matrix
pub async fn negotiate(
    matrix_path: &Path,
    protocols: &[Protocol],
    drms: &[Drm],
    available: &[Drm],
    platform: &Capabilities,
    format: &str,
) -> anyhow::Result<()> {
    let matrix: PlayoutOptions = serde_json::from_value(read_json(matrix_path).await?)?;
    debug!(protocols = matrix.protocols.len(), "Loaded playout matrix");

    let (protocol, drm) = negotiate_matrix(protocols, drms, available, &matrix)?;
    let (backend, backend_error) = match backend_kind(platform, protocol, drm) {
        Ok(kind) => (Some(kind.to_string()), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let report = NegotiationReport {
        protocol,
        drm,
        backend,
        backend_error,
        playout_url: matrix.method(protocol, drm).map(|m| m.playout_url.clone()),
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("Negotiation:");
            println!("  Protocol: {}", report.protocol);
            println!("  DRM: {}", report.drm);
            match (&report.backend, &report.backend_error) {
                (Some(kind), _) => println!("  Backend: {}", kind),
                (None, Some(e)) => println!("  Backend: unavailable ({})", e),
                (None, None) => println!("  Backend: unknown"),
            }
            if let Some(url) = &report.playout_url {
                println!("  URL: {}", url);
            }
        }
    }

    Ok(())
}

/// Select an offering from an availability map
pub async fn offering(
    available_path: &Path,
    explicit: Option<&str>,
    preferences: &[String],
    format: &str,
) -> anyhow::Result<()> {
    let available: BTreeMap<String, Offering> = serde_json::from_value(read_json(available_path).await?)?;

    let Some(id) = select_offering(explicit, preferences, &available) else {
        anyhow::bail!(
            "no matching offering among: {}",
            available.keys().cloned().collect::<Vec<_>>().join(", ")
        );
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => print_json(&serde_json::json!({
            "offering": id,
            "uri": available.get(&id).map(|o| o.uri.clone()),
        }))?,
        OutputFormat::Text => {
            println!("Offering: {}", id);
            if let Some(o) = available.get(&id) {
                println!("  URI: {}", o.uri);
                if let Some(name) = &o.display_name {
                    println!("  Name: {}", name);
                }
            }
        }
    }

    Ok(())
}

/// Show the configuration produced by merging overrides over the defaults
pub async fn config(overrides_path: Option<&Path>, format: &str) -> anyhow::Result<()> {
    let overrides = match overrides_path {
        Some(path) => read_json(path).await?,
        None => Value::Object(Default::default()),
    };

    let config = PlayerConfig::from_overrides(&overrides)?;

    match OutputFormat::from(format) {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Text => {
            println!("Source:");
            println!("  Protocols: {:?}", config.source.protocols);
            println!("  DRMs: {:?}", config.source.drms);
            println!("  Live: {}", config.is_live());
            println!("Player:");
            println!("  Autoplay: {:?}", config.player.autoplay);
            println!("  Muted: {:?}", config.player.muted);
            println!("  Controls: {:?}", config.player.controls);
            println!("  Profile: {}", config.player.player_profile.label());
            if let Some(max) = config.player.max_bitrate {
                println!("  Max bitrate: {}", max);
            }
        }
    }

    Ok(())
}
