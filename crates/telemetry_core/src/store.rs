//! Store de estado – compõe janela e regras de falha e publica snapshots.
//!
//! Toda mutação gera um [`Snapshot`] novo, entregue de forma síncrona a cada
//! assinante na ordem em que foi produzido.

use crate::alerts::FaultEvaluator;
use crate::types::{ConnectionState, Snapshot, TelemetrySample};
use crate::window::WindowBuffer;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback de assinante. Recebe apenas referência imutável.
pub type SnapshotCallback = Box<dyn Fn(&Arc<Snapshot>) + Send>;

/// Identificador devolvido por [`StateStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct StateStore {
    window: WindowBuffer,
    evaluator: FaultEvaluator,
    current: Arc<Snapshot>,
    subscribers: Vec<(SubscriptionId, SnapshotCallback)>,
    next_id: u64,
}

impl StateStore {
    pub fn new(window: WindowBuffer, evaluator: FaultEvaluator) -> Self {
        Self {
            window,
            evaluator,
            current: Arc::new(Snapshot::default()),
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    /// Snapshot publicado mais recente.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current)
    }

    pub fn window_size(&self) -> usize {
        self.window.size()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&Arc<Snapshot>) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove um assinante. Retorna `false` se o id já não existia.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Aplica uma amostra aceita: janela, alerta e campos escalares.
    pub fn apply_sample(&mut self, sample: &TelemetrySample) -> Arc<Snapshot> {
        let window = self.window.append(sample);
        let alert = self.evaluator.evaluate(sample);
        let prev = &self.current;

        if alert != prev.alert {
            if alert {
                warn!(
                    "Falha detectada em #{}: {:?}",
                    sample.sequence_number,
                    self.evaluator.causes(sample)
                );
            } else {
                info!("Falha normalizada em #{}", sample.sequence_number);
            }
        }

        let next = Snapshot {
            revision: prev.revision + 1,
            window,
            mode: Some(sample.compression_mode.clone()),
            latency_ms: sample.latency_ms,
            compression_ratio: sample.compression_ratio,
            alert,
            connection: prev.connection,
            last_sequence: Some(sample.sequence_number),
        };
        self.publish(next)
    }

    /// Atualiza o estado de conexão. Sem mudança real, não publica.
    pub fn apply_connection_state(&mut self, state: ConnectionState) -> Arc<Snapshot> {
        if self.current.connection == state {
            return self.snapshot();
        }

        let next = Snapshot {
            revision: self.current.revision + 1,
            connection: state,
            ..(*self.current).clone()
        };
        self.publish(next)
    }

    fn publish(&mut self, next: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(next);
        self.current = Arc::clone(&next);

        debug!(
            "Snapshot r{} ({} pontos, {}) para {} assinante(s)",
            next.revision,
            next.window.len(),
            next.connection,
            self.subscribers.len()
        );
        for (_, callback) in &self.subscribers {
            callback(&next);
        }

        next
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(WindowBuffer::default(), FaultEvaluator::default())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("window", &self.window)
            .field("current", &self.current)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
