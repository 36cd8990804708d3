//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável serve cliente e fonte de
//! desenvolvimento. Todas as seções aceitam arquivos parciais.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::window::DEFAULT_WINDOW_SIZE;

/// Erros de leitura/escrita da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de I/O em {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Erro ao serializar TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Ambiente de implantação que escolhe o endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// Ambiente implícito do build: debug → desenvolvimento, release → produção.
    pub fn from_build() -> Self {
        if cfg!(debug_assertions) {
            Environment::Development
        } else {
            Environment::Production
        }
    }
}

/// Política de backoff entre tentativas de reconexão.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Atraso da primeira tentativa (ms)
    pub initial_ms: u64,
    /// Teto do atraso (ms)
    pub max_ms: u64,
    /// Fator multiplicativo por tentativa
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Atraso antes da tentativa `attempt` (1 = primeira reconexão).
    ///
    /// Crescente e limitado a `max_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let raw = self.initial_ms as f64 * self.multiplier.max(1.0).powi(exp);
        let ms = raw.min(self.max_ms as f64).max(0.0);
        Duration::from_millis(ms as u64)
    }
}

/// Configuração do cliente de ingestão.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Ambiente explícito; ausente = decidido pelo perfil do build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    pub production_url: String,
    pub development_url: String,
    /// Número máximo de pontos na janela
    pub window_size: usize,
    /// Timeout de leitura do socket (ms); limita a latência do `stop()`
    pub read_timeout_ms: u64,
    /// Capacidade do channel entre a thread de rede e o dono do estado
    pub event_buffer: usize,
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: None,
            production_url: "wss://fgpa-dashboard-backend.onrender.com/ws/telemetry".into(),
            development_url: "ws://localhost:8000/ws/telemetry".into(),
            window_size: DEFAULT_WINDOW_SIZE,
            read_timeout_ms: 250,
            event_buffer: 64,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn environment(&self) -> Environment {
        self.environment.unwrap_or_else(Environment::from_build)
    }

    /// URL selecionada pelo ambiente.
    pub fn endpoint(&self) -> &str {
        match self.environment() {
            Environment::Production => &self.production_url,
            Environment::Development => &self.development_url,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

/// Thresholds das regras de falha.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultThresholds {
    /// Vazão acima disto é falha
    pub flow_max: f64,
    /// Pressão abaixo disto é falha
    pub pressure_min: f64,
}

impl Default for FaultThresholds {
    fn default() -> Self {
        Self {
            flow_max: 7000.0,
            pressure_min: 25000.0,
        }
    }
}

/// Configuração da fonte de desenvolvimento (Sender).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Endereço TCP do servidor WebSocket
    pub bind_addr: String,
    /// Caminho aceito no handshake
    pub path: String,
    /// Intervalo entre frames em segundos
    pub interval_secs: f64,
    /// A cada N frames injeta uma leitura em falha (0 = nunca)
    pub fault_every: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".into(),
            path: "/ws/telemetry".into(),
            interval_secs: 0.5,
            fault_every: 15,
        }
    }
}

impl SenderConfig {
    /// Intervalo entre frames, limitado a 0.05–60s. Valor não finito cai no padrão.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs.clamp(0.05, 60.0))
            .unwrap_or_else(|_| Duration::from_millis(500))
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub faults: FaultThresholds,
    pub sender: SenderConfig,
}

impl AppConfig {
    /// Lê e parseia um arquivo TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Carrega configuração; arquivo ausente ou inválido cai no padrão.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match Self::from_file(path) {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("{e}"),
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let client = &self.client;

        for (name, url) in [
            ("production_url", &client.production_url),
            ("development_url", &client.development_url),
        ] {
            if url.is_empty() {
                errors.push(format!("{name} não pode ser vazio"));
            } else if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                errors.push(format!("{name} deve usar ws:// ou wss://: {url}"));
            }
        }
        if client.window_size == 0 {
            errors.push("window_size deve ser >= 1".into());
        }
        if client.event_buffer == 0 {
            errors.push("event_buffer deve ser >= 1".into());
        }
        if client.backoff.initial_ms > client.backoff.max_ms {
            errors.push(format!(
                "Backoff inicial ({} ms) maior que o teto ({} ms)",
                client.backoff.initial_ms, client.backoff.max_ms
            ));
        }
        if client.backoff.multiplier < 1.0 {
            errors.push(format!(
                "Multiplicador de backoff inválido: {} (>= 1.0)",
                client.backoff.multiplier
            ));
        }
        if self.sender.interval_secs < 0.05 || self.sender.interval_secs > 60.0 {
            errors.push(format!(
                "Intervalo do sender inválido: {} (0.05–60.0)",
                self.sender.interval_secs
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn sender_interval_is_clamped() {
        let mut sender = SenderConfig::default();
        assert_eq!(sender.interval(), Duration::from_millis(500));

        sender.interval_secs = f64::INFINITY;
        assert_eq!(sender.interval(), Duration::from_secs(60));
        sender.interval_secs = 0.0;
        assert_eq!(sender.interval(), Duration::from_millis(50));
        sender.interval_secs = f64::NAN;
        assert_eq!(sender.interval(), Duration::from_millis(500));
    }

    #[test]
    fn infinite_interval_parses_and_is_reported() {
        let config: AppConfig = toml::from_str("[sender]\ninterval_secs = inf\n").unwrap();
        assert!(config.sender.interval_secs.is_infinite());
        assert_eq!(config.validate().len(), 1);
        assert_eq!(config.sender.interval(), Duration::from_secs(60));
    }

    #[test]
    fn roundtrip_toml() {
        let mut config = AppConfig::default();
        config.client.environment = Some(Environment::Production);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.client.environment, Some(Environment::Production));
        assert_eq!(parsed.client.window_size, 41);
        assert_eq!(parsed.faults, config.faults);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[client]
environment = "development"

[faults]
flow_max = 5000.0
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.client.endpoint(), "ws://localhost:8000/ws/telemetry");
        assert_eq!(config.faults.flow_max, 5000.0);
        // Outros campos devem ter valor padrão
        assert_eq!(config.faults.pressure_min, 25000.0);
        assert_eq!(config.client.backoff.initial_ms, 500);
        assert_eq!(config.sender.bind_addr, "127.0.0.1:8000");
    }

    #[test]
    fn production_environment_selects_production_url() {
        let mut client = ClientConfig::default();
        client.environment = Some(Environment::Production);
        assert!(client.endpoint().starts_with("wss://"));
    }

    #[test]
    fn backoff_grows_and_is_bounded() {
        let b = BackoffConfig {
            initial_ms: 100,
            max_ms: 1000,
            multiplier: 2.0,
        };
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(4), Duration::from_millis(800));
        assert_eq!(b.delay(5), Duration::from_millis(1000));
        assert_eq!(b.delay(500), Duration::from_millis(1000));
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = AppConfig::default();
        config.client.window_size = 0;
        config.client.development_url = "http://localhost".into();
        config.client.backoff.initial_ms = 60_000;
        let errors = config.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = AppConfig::load(Path::new("/definitely/not/here/config.toml"));
        assert_eq!(config.client.window_size, DEFAULT_WINDOW_SIZE);
    }
}
