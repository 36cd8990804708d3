//! Gerenciador de conexão – ciclo de vida do stream e roteamento de frames.
//!
//! ```text
//! Disconnected → Connecting → Connected ─(close/erro)→ Disconnected
//!                    ↑                                      │
//!                    └──────────── Reconnecting ←───────────┘
//! ```
//!
//! Toda decodificação, mutação do store e notificação de assinantes acontece
//! dentro de [`ConnectionManager::poll`] / [`ConnectionManager::poll_timeout`],
//! no thread do chamador, um evento por vez e em ordem de chegada.

use crate::net_thread::{self, Connector, InboundFrame, NetEvent, NetWorker, WsConnector};
use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use telemetry_core::config::{AppConfig, BackoffConfig, ClientConfig, FaultThresholds};
use telemetry_core::protocol::{DecodeError, decode_frame, decode_frame_bytes};
use telemetry_core::store::{StateStore, SubscriptionId};
use telemetry_core::types::{ConnectionState, Snapshot, TelemetrySample};
use telemetry_core::{FaultEvaluator, WindowBuffer};
use tracing::{debug, error, info, warn};

/// Timeout padrão de abertura TCP + handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Contadores de diagnóstico do cliente.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Frames recebidos (válidos ou não)
    pub frames_received: u64,
    /// Frames descartados pelo decoder
    pub frames_dropped: u64,
    /// Conexões abertas com sucesso
    pub connections: u64,
    /// Tentativas de reconexão agendadas
    pub reconnect_attempts: u64,
}

/// Dono exclusivo da conexão e do [`StateStore`].
pub struct ConnectionManager {
    url: String,
    backoff: BackoffConfig,
    event_buffer: usize,
    connector: Arc<dyn Connector>,
    state: ConnectionState,
    store: StateStore,
    worker: Option<NetWorker>,
    /// Tentativa cujo backoff a thread de rede cumpre (ou cumprirá) a seguir
    next_retry: u32,
    stats: ClientStats,
}

impl ConnectionManager {
    pub fn new(
        client: &ClientConfig,
        faults: &FaultThresholds,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let store = StateStore::new(
            WindowBuffer::new(client.window_size),
            FaultEvaluator::new(faults.clone()),
        );

        Self {
            url: client.endpoint().to_owned(),
            backoff: client.backoff.clone(),
            event_buffer: client.event_buffer,
            connector,
            state: ConnectionState::Disconnected,
            store,
            worker: None,
            next_retry: 1,
            stats: ClientStats::default(),
        }
    }

    /// Cliente com o transporte WebSocket real.
    pub fn from_config(config: &AppConfig) -> Self {
        let connector = WsConnector::new(DEFAULT_CONNECT_TIMEOUT, config.client.read_timeout());
        Self::new(&config.client, &config.faults, Arc::new(connector))
    }

    // ── API do consumidor ──

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&Arc<Snapshot>) + Send + 'static,
    {
        self.store.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    /// Abre a conexão. Idempotente: com conexão viva não faz nada; durante
    /// o backoff antecipa a próxima tentativa na mesma thread.
    ///
    /// O pedido vale só para o backoff da tentativa `next_retry`. Se a
    /// thread já saiu dele, o pedido é descartado e o próximo backoff segue
    /// normal.
    pub fn start(&mut self) {
        if let Some(worker) = &self.worker {
            if self.state.is_live() {
                debug!("start() ignorado: já {}", self.state);
                return;
            }
            debug!(
                "start() durante {}: antecipando tentativa {}",
                self.state, self.next_retry
            );
            worker.reconnect_now(self.next_retry);
            self.set_state(ConnectionState::Connecting);
            return;
        }

        self.next_retry = 1;
        self.set_state(ConnectionState::Connecting);
        match net_thread::spawn_connection_thread(
            Arc::clone(&self.connector),
            self.url.clone(),
            self.backoff.clone(),
            self.event_buffer,
        ) {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                error!("Falha ao criar thread de rede: {e}");
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    /// Cancela backoff pendente, fecha a conexão e aguarda a thread de rede.
    /// Nenhum callback dispara depois do retorno.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            info!("Encerrando conexão com {}", self.url);
            worker.shutdown();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Processa todos os eventos pendentes sem bloquear. Retorna quantos.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let next = match &self.worker {
                Some(worker) => worker.events().try_recv(),
                None => return handled,
            };
            match next {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => return handled,
                Err(TryRecvError::Disconnected) => {
                    self.reap_worker();
                    return handled;
                }
            }
        }
    }

    /// Espera até `timeout` pelo próximo evento e então drena os pendentes.
    pub fn poll_timeout(&mut self, timeout: Duration) -> usize {
        let first = match &self.worker {
            Some(worker) => worker.events().recv_timeout(timeout),
            None => return 0,
        };
        match first {
            Ok(event) => {
                self.handle_event(event);
                1 + self.poll()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                self.reap_worker();
                0
            }
        }
    }

    fn handle_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Connecting { attempt } => {
                debug!("Tentativa de reconexão {attempt}");
                self.next_retry = attempt.saturating_add(1);
                self.set_state(ConnectionState::Connecting);
            }
            NetEvent::Opened => {
                self.stats.connections += 1;
                self.next_retry = 1;
                info!("WebSocket conectado a {}", self.url);
                self.set_state(ConnectionState::Connected);
            }
            NetEvent::Frame(frame) => self.ingest(frame),
            NetEvent::Closed(reason) => {
                warn!("WebSocket fechado: {reason}");
                self.set_state(ConnectionState::Disconnected);
            }
            NetEvent::Failed(reason) => {
                warn!("{reason}");
                self.set_state(ConnectionState::Disconnected);
            }
            NetEvent::Reconnecting { attempt, delay } => {
                self.stats.reconnect_attempts += 1;
                self.next_retry = attempt;
                info!(
                    "Reconectando em {}ms (tentativa {attempt})",
                    delay.as_millis()
                );
                self.set_state(ConnectionState::Reconnecting);
            }
        }
    }

    fn ingest(&mut self, frame: InboundFrame) {
        self.stats.frames_received += 1;

        let decoded: Result<TelemetrySample, DecodeError> = match &frame {
            InboundFrame::Text(text) => decode_frame(text),
            InboundFrame::Binary(bytes) => decode_frame_bytes(bytes),
        };

        match decoded {
            Ok(sample) => {
                debug!(
                    "Telemetria #{} flow={} pressure={} vibration={}",
                    sample.sequence_number,
                    sample.sensors.flow,
                    sample.sensors.pressure,
                    sample.sensors.vibration
                );
                self.store.apply_sample(&sample);
            }
            Err(e) => {
                self.stats.frames_dropped += 1;
                warn!("Frame descartado: {e}");
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.store.apply_connection_state(state);
    }

    /// A thread de rede terminou sozinha (só acontece com panic).
    fn reap_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
