//! Regras de falha – avaliação de thresholds por amostra.
//!
//! Sem histerese nem debounce: o alerta pode alternar a cada amostra.

use crate::config::FaultThresholds;
use crate::types::TelemetrySample;
use serde::{Deserialize, Serialize};

/// Regra que disparou o alerta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FaultCause {
    /// Vazão acima do máximo.
    FlowHigh { value: f64, limit: f64 },
    /// Pressão abaixo do mínimo.
    PressureLow { value: f64, limit: f64 },
}

/// Avaliador sem estado: `flow > flow_max || pressure < pressure_min`.
#[derive(Debug, Clone, Default)]
pub struct FaultEvaluator {
    thresholds: FaultThresholds,
}

impl FaultEvaluator {
    pub fn new(thresholds: FaultThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &FaultThresholds {
        &self.thresholds
    }

    pub fn evaluate(&self, sample: &TelemetrySample) -> bool {
        evaluate_fault(sample, &self.thresholds)
    }

    /// Lista as regras violadas (vazia = normal).
    pub fn causes(&self, sample: &TelemetrySample) -> Vec<FaultCause> {
        let th = &self.thresholds;
        let mut causes = Vec::new();

        if sample.sensors.flow > th.flow_max {
            causes.push(FaultCause::FlowHigh {
                value: sample.sensors.flow,
                limit: th.flow_max,
            });
        }
        if sample.sensors.pressure < th.pressure_min {
            causes.push(FaultCause::PressureLow {
                value: sample.sensors.pressure,
                limit: th.pressure_min,
            });
        }

        causes
    }
}

/// Predicado de falha para uma amostra.
pub fn evaluate_fault(sample: &TelemetrySample, thresholds: &FaultThresholds) -> bool {
    sample.sensors.flow > thresholds.flow_max || sample.sensors.pressure < thresholds.pressure_min
}
