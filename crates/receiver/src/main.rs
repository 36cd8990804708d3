//! # Telemetria Receiver (headless)
//!
//! Conecta ao endpoint do ambiente configurado e imprime uma linha por
//! snapshot publicado. Útil para depurar a fonte sem o dashboard.
//!
//! ## Uso
//! ```bash
//! RUST_LOG=debug telemetry_receiver
//! ```

use std::sync::Arc;
use std::time::Duration;
use telemetry_core::config::AppConfig;
use telemetry_core::types::Snapshot;
use telemetry_receiver::ConnectionManager;
use tracing::{info, warn};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let mut client = ConnectionManager::from_config(&config);
    info!(
        "Ambiente {:?} → {}",
        config.client.environment(),
        client.endpoint()
    );

    client.subscribe(print_snapshot);
    client.start();

    // ── Loop principal ──
    loop {
        client.poll_timeout(Duration::from_millis(500));
    }
}

fn print_snapshot(snap: &Arc<Snapshot>) {
    let Some(last) = snap.window.last() else {
        println!("[{}] aguardando dados...", snap.connection);
        return;
    };
    println!(
        "[{}] #{:<6} flow {:>9.1} | pressure {:>9.1} | vibration {:>7.3} | {} | {:.1} ms | x{:.2} | {}",
        snap.connection,
        last.time,
        last.flow,
        last.pressure,
        last.vibration,
        snap.mode.as_deref().unwrap_or("..."),
        snap.latency_ms,
        snap.compression_ratio,
        snap.status_label()
    );
}
