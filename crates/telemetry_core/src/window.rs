//! Janela deslizante com as amostras mais recentes.

use crate::types::{ChartPoint, TelemetrySample};
use std::collections::VecDeque;
use std::sync::Arc;

/// Tamanho padrão: últimas 40 + a que acabou de chegar.
pub const DEFAULT_WINDOW_SIZE: usize = 41;

/// Histórico limitado em ordem de chegada.
///
/// Não reordena nem deduplica por `sequence_number`: o que chegar primeiro é
/// despejado primeiro.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    capacity: usize,
    points: VecDeque<ChartPoint>,
}

impl WindowBuffer {
    /// Capacidade mínima é 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity),
        }
    }

    /// Insere no fim, despeja do início enquanto exceder a capacidade e
    /// retorna uma cópia imutável da janela.
    pub fn append(&mut self, sample: &TelemetrySample) -> Arc<[ChartPoint]> {
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(sample.point());
        self.view()
    }

    pub fn size(&self) -> usize {
        self.points.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cópia imutável do conteúdo atual.
    pub fn view(&self) -> Arc<[ChartPoint]> {
        self.points.iter().copied().collect()
    }
}

impl Default for WindowBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
