//! Tipos de dados da telemetria de sensores.
//!
//! Uma [`TelemetrySample`] é criada pelo decoder a cada frame válido; um
//! [`Snapshot`] é o estado completo e imutável publicado para a camada de
//! apresentação.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ──────────────────────────────────────────────
// Amostra
// ──────────────────────────────────────────────

/// Leituras do trio de sensores.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SensorValues {
    /// Vazão
    pub flow: f64,
    /// Pressão
    pub pressure: f64,
    /// Vibração
    pub vibration: f64,
}

/// Amostra decodificada e validada de um frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    /// Ordinal atribuído pela fonte. Pode repetir ou chegar fora de ordem.
    pub sequence_number: i64,
    pub sensors: SensorValues,
    /// Rótulo do modo de compressão ativo (ex: "lossless")
    pub compression_mode: String,
    /// Latência fim-a-fim (ms)
    pub latency_ms: f64,
    pub compression_ratio: f64,
}

impl TelemetrySample {
    /// Ponto de gráfico correspondente; o eixo X é o `sequence_number`.
    pub fn point(&self) -> ChartPoint {
        ChartPoint {
            time: self.sequence_number,
            flow: self.sensors.flow,
            pressure: self.sensors.pressure,
            vibration: self.sensors.vibration,
        }
    }
}

/// Ponto da janela publicado no [`Snapshot`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ChartPoint {
    pub time: i64,
    pub flow: f64,
    pub pressure: f64,
    pub vibration: f64,
}

// ──────────────────────────────────────────────
// Conexão
// ──────────────────────────────────────────────

/// Estado do ciclo de vida da conexão com a fonte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    /// `true` quando existe (ou está sendo aberta) uma conexão viva.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

// ──────────────────────────────────────────────
// Snapshot
// ──────────────────────────────────────────────

/// Estado publicado, substituído por inteiro a cada atualização.
///
/// A janela é compartilhada via `Arc<[ChartPoint]>`; nenhum consumidor
/// consegue alterar o conteúdo.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Contador monotônico de publicações (0 = estado inicial).
    pub revision: u64,
    pub window: Arc<[ChartPoint]>,
    /// `None` até a primeira amostra.
    pub mode: Option<String>,
    pub latency_ms: f64,
    pub compression_ratio: f64,
    pub alert: bool,
    pub connection: ConnectionState,
    pub last_sequence: Option<i64>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            revision: 0,
            window: Arc::from(Vec::new()),
            mode: None,
            latency_ms: 0.0,
            compression_ratio: 0.0,
            alert: false,
            connection: ConnectionState::Disconnected,
            last_sequence: None,
        }
    }
}

impl Snapshot {
    /// Rótulo de status usado pelos consumidores de texto.
    pub fn status_label(&self) -> &'static str {
        if self.alert { "FAULT DETECTED" } else { "NORMAL" }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_empty_and_disconnected() {
        let s = Snapshot::default();
        assert_eq!(s.revision, 0);
        assert!(s.window.is_empty());
        assert!(s.mode.is_none());
        assert!(!s.alert);
        assert_eq!(s.connection, ConnectionState::Disconnected);
        assert_eq!(s.status_label(), "NORMAL");
    }

    #[test]
    fn point_uses_sequence_as_time() {
        let sample = TelemetrySample {
            sequence_number: 42,
            sensors: SensorValues {
                flow: 1.0,
                pressure: 2.0,
                vibration: 3.0,
            },
            ..Default::default()
        };
        let p = sample.point();
        assert_eq!(p.time, 42);
        assert_eq!((p.flow, p.pressure, p.vibration), (1.0, 2.0, 3.0));
    }

    #[test]
    fn live_states() {
        assert!(ConnectionState::Connecting.is_live());
        assert!(ConnectionState::Connected.is_live());
        assert!(!ConnectionState::Reconnecting.is_live());
        assert!(!ConnectionState::Disconnected.is_live());
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
