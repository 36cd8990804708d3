//! Gerador de leituras sintéticas para a fonte de desenvolvimento.
//!
//! Formas de onda determinísticas (sem RNG) para que o dashboard mostre
//! movimento e os testes sejam reprodutíveis. A cada `fault_every` amostras
//! uma leitura fora dos limites é injetada, alternando vazão alta e pressão
//! baixa.

use telemetry_core::types::{SensorValues, TelemetrySample};

/// Modos de compressão em rodízio.
const MODES: [&str; 3] = ["lossless", "lossy", "adaptive"];

/// Amostras por modo antes de trocar.
const MODE_PERIOD: u64 = 20;

/// Estado do gerador de uma conexão.
#[derive(Debug, Clone)]
pub struct SyntheticSensor {
    sequence: i64,
    fault_every: u64,
    faults_injected: u64,
}

impl SyntheticSensor {
    pub fn new(fault_every: u64) -> Self {
        Self {
            sequence: 0,
            fault_every,
            faults_injected: 0,
        }
    }

    /// Próxima leitura; `sequence_number` começa em 1.
    pub fn next_sample(&mut self) -> TelemetrySample {
        self.sequence += 1;
        let seq = self.sequence;
        let step = seq as u64;
        let t = seq as f64;

        let mut sensors = SensorValues {
            flow: 4000.0 + 1500.0 * (t / 5.0).sin(),
            pressure: 32000.0 + 3000.0 * (t / 7.0).cos(),
            vibration: 0.4 + 0.1 * t.sin(),
        };

        if self.fault_every > 0 && step % self.fault_every == 0 {
            if self.faults_injected % 2 == 0 {
                sensors.flow = 8200.0;
            } else {
                sensors.pressure = 21000.0;
            }
            self.faults_injected += 1;
        }

        let mode_index = ((step - 1) / MODE_PERIOD) as usize % MODES.len();
        let compression_ratio = match MODES[mode_index] {
            "lossless" => 2.1,
            "lossy" => 6.4,
            _ => 3.8 + 0.5 * (t / 11.0).sin(),
        };

        TelemetrySample {
            sequence_number: seq,
            sensors,
            compression_mode: MODES[mode_index].into(),
            latency_ms: 8.0 + 3.0 * (t / 3.0).sin(),
            compression_ratio,
        }
    }
}
