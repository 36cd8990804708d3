//! # Telemetry Core
//!
//! Crate compartilhada do monitor de telemetria: tipos de amostra e snapshot,
//! protocolo de frames JSON, janela deslizante, regras de falha, store de
//! estado e configuração TOML.
//!
//! ## Módulos
//! - [`types`] – Amostra, ponto de gráfico, snapshot e estado de conexão
//! - [`protocol`] – Decode/encode de frames do stream
//! - [`window`] – Histórico limitado em ordem de chegada
//! - [`alerts`] – Regras de falha (vazão/pressão)
//! - [`store`] – Estado derivado e notificação de assinantes
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod protocol;
pub mod window;
pub mod alerts;
pub mod store;
pub mod config;

// Re-exports convenientes
pub use types::{ChartPoint, ConnectionState, SensorValues, Snapshot, TelemetrySample};
pub use protocol::{DecodeError, decode_frame, decode_frame_bytes, encode_frame};
pub use window::{DEFAULT_WINDOW_SIZE, WindowBuffer};
pub use alerts::{FaultCause, FaultEvaluator, evaluate_fault};
pub use store::{StateStore, SubscriptionId};
pub use config::{AppConfig, ClientConfig, Environment, FaultThresholds, SenderConfig};
