//! Protocolo de frames do stream de telemetria.
//!
//! Cada mensagem do WebSocket carrega um objeto JSON com uma leitura:
//!
//! ```text
//! {
//!   "sequence_number": 17,
//!   "sensor_values": { "flow": 6500.0, "pressure": 31000.0, "vibration": 0.42 },
//!   "compression_mode": "lossless",
//!   "latency": 12.5,
//!   "compression_ratio": 3.1
//! }
//! ```
//!
//! Campos extras são ignorados. Qualquer campo obrigatório ausente ou com
//! tipo errado rejeita o frame inteiro.

use crate::types::{SensorValues, TelemetrySample};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;

/// Erros de decodificação de um frame. Sempre recuperáveis: o frame é
/// descartado e a ingestão continua.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("JSON malformado: {0}")]
    Malformed(String),

    #[error("Frame truncado: {0}")]
    Truncated(String),

    #[error("Frame fora do schema: {0}")]
    Schema(String),

    #[error("Frame binário não é UTF-8 válido")]
    NotUtf8,
}

/// Erros de codificação.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Erro de serialização: {0}")]
    Serialize(String),
}

// ──────────────────────────────────────────────
// Formato de fio
// ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct WireSensors {
    flow: f64,
    pressure: f64,
    vibration: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    sequence_number: i64,
    sensor_values: WireSensors,
    compression_mode: String,
    latency: f64,
    compression_ratio: f64,
}

impl From<WireFrame> for TelemetrySample {
    fn from(w: WireFrame) -> Self {
        Self {
            sequence_number: w.sequence_number,
            sensors: SensorValues {
                flow: w.sensor_values.flow,
                pressure: w.sensor_values.pressure,
                vibration: w.sensor_values.vibration,
            },
            compression_mode: w.compression_mode,
            latency_ms: w.latency,
            compression_ratio: w.compression_ratio,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Eof => DecodeError::Truncated(e.to_string()),
            Category::Syntax | Category::Io => DecodeError::Malformed(e.to_string()),
            Category::Data => DecodeError::Schema(e.to_string()),
        }
    }
}

// ──────────────────────────────────────────────
// Decode / encode
// ──────────────────────────────────────────────

/// Decodifica um frame textual em [`TelemetrySample`].
///
/// Função pura: nunca entra em pânico, qualquer problema vira [`DecodeError`].
pub fn decode_frame(raw: &str) -> Result<TelemetrySample, DecodeError> {
    let wire: WireFrame = serde_json::from_str(raw)?;
    Ok(wire.into())
}

/// Variante para mensagens binárias: exige UTF-8 e delega a [`decode_frame`].
pub fn decode_frame_bytes(raw: &[u8]) -> Result<TelemetrySample, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::NotUtf8)?;
    decode_frame(text)
}

/// Codifica uma amostra no formato de fio (usado pela fonte de desenvolvimento).
pub fn encode_frame(sample: &TelemetrySample) -> Result<String, ProtocolError> {
    let wire = WireFrame {
        sequence_number: sample.sequence_number,
        sensor_values: WireSensors {
            flow: sample.sensors.flow,
            pressure: sample.sensors.pressure,
            vibration: sample.sensors.vibration,
        },
        compression_mode: sample.compression_mode.clone(),
        latency: sample.latency_ms,
        compression_ratio: sample.compression_ratio,
    };
    serde_json::to_string(&wire).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
