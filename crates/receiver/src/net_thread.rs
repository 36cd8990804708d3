//! Thread de rede: abre o WebSocket, lê frames e envia eventos para o dono
//! do estado via channel.
//!
//! A thread nunca toca no [`StateStore`](telemetry_core::StateStore). Ela só
//! produz [`NetEvent`]s em ordem de chegada; quem decodifica e publica é o
//! `ConnectionManager`, no thread que chama `poll()`.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, unbounded};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use telemetry_core::config::BackoffConfig;
use tracing::{debug, error, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// Mensagem bruta recebida do stream, ainda não decodificada.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Falhas transitórias de conexão. Nunca sobem como erro para o chamador:
/// viram troca de estado + reconexão.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Falha ao conectar: {0}")]
    Connect(String),

    #[error("Conexão fechada pelo servidor{}", close_reason(.0))]
    Closed(Option<String>),

    #[error("Erro de transporte: {0}")]
    Transport(String),
}

fn close_reason(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

// ──────────────────────────────────────────────
// Transporte
// ──────────────────────────────────────────────

/// Uma conexão aberta que entrega frames.
pub trait FrameStream: Send {
    /// `Ok(Some)` = frame, `Ok(None)` = nada dentro do timeout de leitura,
    /// `Err` = conexão terminou.
    fn read_frame(&mut self) -> Result<Option<InboundFrame>, ConnectionError>;

    /// Fecha a conexão (best-effort).
    fn close(&mut self);
}

/// Abre conexões para uma URL.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> Result<Box<dyn FrameStream>, ConnectionError>;
}

/// Conector WebSocket real (`ws://` e `wss://`).
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> Result<Box<dyn FrameStream>, ConnectionError> {
        let socket = open_socket(url, self.connect_timeout, self.read_timeout)?;
        Ok(Box::new(WsFrameStream { socket }))
    }
}

type WsSocket = WebSocket<MaybeTlsStream<TcpStream>>;

fn open_socket(
    url: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<WsSocket, ConnectionError> {
    let request = url
        .into_client_request()
        .map_err(|e| ConnectionError::Connect(format!("URL inválida {url}: {e}")))?;

    let uri = request.uri();
    let host = uri
        .host()
        .ok_or_else(|| ConnectionError::Connect(format!("URL sem host: {url}")))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_owned();
    let default_port = if uri.scheme_str() == Some("wss") { 443 } else { 80 };
    let port = uri.port_u16().unwrap_or(default_port);

    let addrs = (host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| ConnectionError::Connect(format!("Falha ao resolver {host}: {e}")))?;

    let mut last_err: Option<io::Error> = None;
    let stream = addrs
        .into_iter()
        .find_map(|addr| match TcpStream::connect_timeout(&addr, connect_timeout) {
            Ok(s) => Some(s),
            Err(e) => {
                last_err = Some(e);
                None
            }
        })
        .ok_or_else(|| {
            let reason = last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "nenhum endereço".into());
            ConnectionError::Connect(format!("{host}:{port}: {reason}"))
        })?;

    // Handshake com timeout de conexão; depois passa para o timeout de leitura
    let io_err = |e: io::Error| ConnectionError::Connect(e.to_string());
    stream.set_read_timeout(Some(connect_timeout)).map_err(io_err)?;
    stream.set_write_timeout(Some(connect_timeout)).map_err(io_err)?;
    stream.set_nodelay(true).ok();

    let (socket, _response) = tungstenite::client_tls(request, stream)
        .map_err(|e| ConnectionError::Connect(format!("Handshake falhou: {e}")))?;

    set_read_timeout(socket.get_ref(), read_timeout).map_err(io_err)?;
    Ok(socket)
}

fn set_read_timeout(stream: &MaybeTlsStream<TcpStream>, timeout: Duration) -> io::Result<()> {
    match stream {
        MaybeTlsStream::Plain(s) => s.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(s) => s.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

struct WsFrameStream {
    socket: WsSocket,
}

impl FrameStream for WsFrameStream {
    fn read_frame(&mut self) -> Result<Option<InboundFrame>, ConnectionError> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(InboundFrame::Text(text.as_str().to_owned()))),
            Ok(Message::Binary(data)) => Ok(Some(InboundFrame::Binary(data.to_vec()))),
            Ok(Message::Close(frame)) => Err(ConnectionError::Closed(
                frame.map(|f| f.reason.as_str().to_owned()).filter(|r| !r.is_empty()),
            )),
            // Ping/Pong respondidos pela própria lib
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => Ok(None),
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                // Timeout normal, continua
                Ok(None)
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Err(ConnectionError::Closed(None))
            }
            Err(e) => Err(ConnectionError::Transport(e.to_string())),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.socket.close(None) {
            debug!("Close do WebSocket: {e}");
        }
        let _ = self.socket.flush();
    }
}

// ──────────────────────────────────────────────
// Thread de conexão
// ──────────────────────────────────────────────

/// Evento enviado da thread de rede para o dono do estado.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NetEvent {
    /// Nova tentativa (a primeira é implícita no `start()`).
    Connecting { attempt: u32 },
    Opened,
    Frame(InboundFrame),
    /// Conexão aberta terminou.
    Closed(ConnectionError),
    /// Tentativa de abertura falhou.
    Failed(ConnectionError),
    Reconnecting { attempt: u32, delay: Duration },
}

/// Comandos do dono para a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Stop,
    /// Pula o backoff da tentativa `attempt`. Comandos de outra tentativa
    /// são descartados.
    ReconnectNow { attempt: u32 },
}

/// Handle da thread de rede. Deve ser encerrado com [`NetWorker::shutdown`].
pub(crate) struct NetWorker {
    handle: JoinHandle<()>,
    control: Sender<Control>,
    events: Receiver<NetEvent>,
    stop: Arc<AtomicBool>,
}

impl NetWorker {
    pub(crate) fn events(&self) -> &Receiver<NetEvent> {
        &self.events
    }

    pub(crate) fn reconnect_now(&self, attempt: u32) {
        let _ = self.control.send(Control::ReconnectNow { attempt });
    }

    /// Sinaliza parada, descarta eventos pendentes e aguarda a thread.
    ///
    /// O receiver é liberado antes do join: um `send` bloqueado na thread
    /// falha e ela termina.
    pub(crate) fn shutdown(self) {
        let NetWorker {
            handle,
            control,
            events,
            stop,
        } = self;

        stop.store(true, Ordering::SeqCst);
        let _ = control.send(Control::Stop);
        drop(events);

        if handle.join().is_err() {
            error!("Thread de rede terminou com panic");
        }
    }
}

/// Inicia a thread de rede para `url`.
pub(crate) fn spawn_connection_thread(
    connector: Arc<dyn Connector>,
    url: String,
    backoff: BackoffConfig,
    event_buffer: usize,
) -> io::Result<NetWorker> {
    let (event_tx, event_rx) = bounded::<NetEvent>(event_buffer.max(1));
    let (control_tx, control_rx) = unbounded::<Control>();
    let stop = Arc::new(AtomicBool::new(false));

    let worker = ConnectionLoop {
        connector,
        url,
        backoff,
        events: event_tx,
        control: control_rx,
        stop: Arc::clone(&stop),
    };

    let handle = std::thread::Builder::new()
        .name("ws-receiver".into())
        .spawn(move || worker.run())?;

    Ok(NetWorker {
        handle,
        control: control_tx,
        events: event_rx,
        stop,
    })
}

struct ConnectionLoop {
    connector: Arc<dyn Connector>,
    url: String,
    backoff: BackoffConfig,
    events: Sender<NetEvent>,
    control: Receiver<Control>,
    stop: Arc<AtomicBool>,
}

impl ConnectionLoop {
    fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 && !self.emit(NetEvent::Connecting { attempt }) {
                return;
            }

            info!("Conectando a {} (tentativa {})", self.url, attempt + 1);
            match self.connector.connect(&self.url) {
                Ok(mut stream) => {
                    attempt = 0;
                    if !self.emit(NetEvent::Opened) {
                        stream.close();
                        return;
                    }
                    match self.read_loop(stream.as_mut()) {
                        Some(reason) => {
                            if !self.emit(NetEvent::Closed(reason)) {
                                return;
                            }
                        }
                        None => {
                            stream.close();
                            return;
                        }
                    }
                }
                Err(e) => {
                    if !self.emit(NetEvent::Failed(e)) {
                        return;
                    }
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.backoff.delay(attempt);
            if !self.emit(NetEvent::Reconnecting { attempt, delay }) {
                return;
            }
            if !self.wait_backoff(attempt, delay) {
                return;
            }
        }
    }

    /// Lê até a conexão cair. `None` = parada solicitada.
    fn read_loop(&self, stream: &mut dyn FrameStream) -> Option<ConnectionError> {
        loop {
            if self.stopping() {
                return None;
            }

            match stream.read_frame() {
                Ok(Some(frame)) => {
                    if !self.emit(NetEvent::Frame(frame)) {
                        return None;
                    }
                }
                Ok(None) => {}
                Err(e) => return Some(e),
            }
        }
    }

    /// Espera o backoff da tentativa `attempt`. Retorna `false` se deve
    /// encerrar.
    fn wait_backoff(&self, attempt: u32, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            match self.control.recv_deadline(deadline) {
                Ok(Control::ReconnectNow { attempt: requested }) if requested == attempt => {
                    debug!("Backoff interrompido, reconectando já");
                    return !self.stopping();
                }
                Ok(Control::ReconnectNow { attempt: requested }) => {
                    debug!("ReconnectNow da tentativa {requested} ignorado (atual {attempt})");
                }
                Err(RecvTimeoutError::Timeout) => return !self.stopping(),
                Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    fn stopping(&self) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return true;
        }
        match self.control.try_recv() {
            Ok(Control::Stop) | Err(TryRecvError::Disconnected) => true,
            // Já conectado: reconexão imediata não se aplica
            Ok(Control::ReconnectNow { .. }) | Err(TryRecvError::Empty) => false,
        }
    }

    /// Envio bloqueante (backpressure, sem descarte). Falha se o dono sumiu.
    fn emit(&self, event: NetEvent) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return false;
        }
        if self.events.send(event).is_err() {
            warn!("Dono do estado encerrado, finalizando thread de rede");
            return false;
        }
        true
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    const FRAME: &str = r#"{"sequence_number":1,"sensor_values":{"flow":100,"pressure":30000,"vibration":0.1},"compression_mode":"lossless","latency":5,"compression_ratio":2}"#;

    fn read_next(stream: &mut dyn FrameStream) -> Result<InboundFrame, ConnectionError> {
        for _ in 0..200 {
            if let Some(frame) = stream.read_frame()? {
                return Ok(frame);
            }
        }
        panic!("nenhum frame recebido");
    }

    #[test]
    fn websocket_transport_reads_frames_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(1)))
                .unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            ws.send(Message::text(FRAME)).unwrap();
            ws.send(Message::binary(b"bin".to_vec())).unwrap();
            ws.close(None).unwrap();
            while ws.read().is_ok() {}
        });

        let connector = WsConnector::new(Duration::from_secs(2), Duration::from_millis(20));
        let mut stream = connector
            .connect(&format!("ws://{addr}/ws/telemetry"))
            .unwrap();

        assert_eq!(read_next(stream.as_mut()), Ok(InboundFrame::Text(FRAME.into())));
        assert_eq!(
            read_next(stream.as_mut()),
            Ok(InboundFrame::Binary(b"bin".to_vec()))
        );
        assert_eq!(read_next(stream.as_mut()), Err(ConnectionError::Closed(None)));

        stream.close();
        server.join().unwrap();
    }

    #[test]
    fn unreachable_endpoint_is_a_connect_error() {
        // Porta fechada: bind e libera em seguida
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let connector = WsConnector::new(Duration::from_millis(500), Duration::from_millis(20));
        let result = connector.connect(&format!("ws://{addr}/ws/telemetry"));
        assert!(matches!(result, Err(ConnectionError::Connect(_))));
    }

    #[test]
    fn invalid_url_is_a_connect_error() {
        let connector = WsConnector::new(Duration::from_millis(100), Duration::from_millis(20));
        assert!(matches!(
            connector.connect("not a url"),
            Err(ConnectionError::Connect(_))
        ));
    }

    struct AlwaysFails;

    impl Connector for AlwaysFails {
        fn connect(&self, _url: &str) -> Result<Box<dyn FrameStream>, ConnectionError> {
            Err(ConnectionError::Connect("recusado".into()))
        }
    }

    #[test]
    fn failed_attempts_schedule_growing_backoff() {
        let backoff = BackoffConfig {
            initial_ms: 5,
            max_ms: 20,
            multiplier: 2.0,
        };
        let worker =
            spawn_connection_thread(Arc::new(AlwaysFails), "ws://x".into(), backoff, 8).unwrap();

        let mut delays = Vec::new();
        while delays.len() < 4 {
            let ev = worker
                .events()
                .recv_timeout(Duration::from_secs(2))
                .unwrap();
            if let NetEvent::Reconnecting { delay, .. } = ev {
                delays.push(delay.as_millis());
            }
        }
        assert_eq!(delays, vec![5, 10, 20, 20]);
        worker.shutdown();
    }

    #[test]
    fn reconnect_now_for_another_attempt_keeps_backoff() {
        let backoff = BackoffConfig {
            initial_ms: 60_000,
            max_ms: 60_000,
            multiplier: 1.0,
        };
        let worker =
            spawn_connection_thread(Arc::new(AlwaysFails), "ws://x".into(), backoff, 8).unwrap();

        // Failed + Reconnecting { attempt: 1 }
        for _ in 0..2 {
            worker
                .events()
                .recv_timeout(Duration::from_secs(2))
                .unwrap();
        }
        worker.reconnect_now(7);
        assert!(
            worker
                .events()
                .recv_timeout(Duration::from_millis(200))
                .is_err()
        );

        worker.reconnect_now(1);
        assert_eq!(
            worker
                .events()
                .recv_timeout(Duration::from_secs(2))
                .unwrap(),
            NetEvent::Connecting { attempt: 1 }
        );
        worker.shutdown();
    }

    #[test]
    fn shutdown_interrupts_long_backoff() {
        let backoff = BackoffConfig {
            initial_ms: 60_000,
            max_ms: 60_000,
            multiplier: 1.0,
        };
        let worker =
            spawn_connection_thread(Arc::new(AlwaysFails), "ws://x".into(), backoff, 8).unwrap();

        // Failed + Reconnecting: a thread está no backoff de 60s
        for _ in 0..2 {
            worker
                .events()
                .recv_timeout(Duration::from_secs(2))
                .unwrap();
        }
        let started = std::time::Instant::now();
        worker.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
