//! # Telemetria Receiver
//!
//! Cliente de ingestão: mantém uma conexão WebSocket com a fonte de
//! telemetria, decodifica frames, mantém a janela e o alerta no
//! [`StateStore`](telemetry_core::StateStore) e publica snapshots para a
//! camada de apresentação.

pub mod connection;
pub mod net_thread;

pub use connection::{ClientStats, ConnectionManager};
pub use net_thread::{ConnectionError, Connector, FrameStream, InboundFrame, WsConnector};
