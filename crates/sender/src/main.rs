//! # Telemetria Sender
//!
//! Fonte de desenvolvimento: servidor WebSocket que transmite leituras
//! sintéticas no formato de frame do stream, no endpoint que o Receiver usa
//! em builds de desenvolvimento (`ws://localhost:8000/ws/telemetry`).
//!
//! ## Uso
//! ```bash
//! telemetry_sender    # usa [sender] do config.toml
//! ```

mod generator;

use generator::SyntheticSensor;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::time::Instant;
use telemetry_core::config::{AppConfig, SenderConfig};
use telemetry_core::protocol::encode_frame;
use tracing::{debug, error, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::{Message, WebSocket};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let sender_cfg = config.sender.clone();
    let listener = match TcpListener::bind(&sender_cfg.bind_addr) {
        Ok(l) => l,
        Err(e) => {
            error!("Falha ao bind {}: {e}", sender_cfg.bind_addr);
            std::process::exit(1);
        }
    };

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ TELEMETRIA SENDER – ATIVO (WebSocket)");
    println!("══════════════════════════════════════════════");
    println!("  Endpoint:  ws://{}{}", sender_cfg.bind_addr, sender_cfg.path);
    println!("  Intervalo: {:.2}s", sender_cfg.interval().as_secs_f64());
    println!("  Falha a cada: {} frames", sender_cfg.fault_every);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop de aceitação ──
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let cfg = sender_cfg.clone();
                let spawned = std::thread::Builder::new()
                    .name("ws-client".into())
                    .spawn(move || serve_client(stream, &cfg));
                if let Err(e) = spawned {
                    error!("Falha ao criar thread de cliente: {e}");
                }
            }
            Err(e) => warn!("Erro ao aceitar conexão: {e}"),
        }
    }
}

fn serve_client(stream: TcpStream, cfg: &SenderConfig) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".into());

    let expected_path = cfg.path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == expected_path {
            Ok(resp)
        } else {
            let mut err = ErrorResponse::new(Some(format!("Caminho desconhecido: {}", req.uri().path())));
            *err.status_mut() = StatusCode::NOT_FOUND;
            Err(err)
        }
    };

    let mut ws = match tungstenite::accept_hdr(stream, check_path) {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake recusado de {peer}: {e}");
            return;
        }
    };
    info!("Cliente conectado: {peer}");

    let interval = cfg.interval();
    let mut sensor = SyntheticSensor::new(cfg.fault_every);

    loop {
        let cycle_start = Instant::now();
        let sample = sensor.next_sample();

        let frame = match encode_frame(&sample) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Erro ao serializar frame: {e}");
                return;
            }
        };
        if let Err(e) = ws.send(Message::text(frame)) {
            info!("Cliente {peer} desconectado: {e}");
            return;
        }
        debug!(
            "→ #{} para {peer} | flow {:.0} | pressure {:.0} | {}",
            sample.sequence_number, sample.sensors.flow, sample.sensors.pressure, sample.compression_mode
        );

        // Dormir pelo tempo restante do intervalo, atendendo close/ping
        if !drain_until(&mut ws, cycle_start + interval) {
            info!("Cliente {peer} encerrou a conexão");
            return;
        }
    }
}

/// Lê mensagens do cliente até `deadline`. Retorna `false` se a conexão
/// terminou.
fn drain_until(ws: &mut WebSocket<TcpStream>, deadline: Instant) -> bool {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        if ws.get_ref().set_read_timeout(Some(deadline - now)).is_err() {
            return false;
        }
        match ws.read() {
            Ok(Message::Close(_)) => return false,
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
            Err(_) => return false,
        }
    }
}
