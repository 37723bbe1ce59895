// src/server.rs
//
// Accept loop: one client at a time.
//
// For each accepted connection the serial port is opened, its settings are
// snapshotted, RTS/DTR are raised and a Redirector bridges the two until the
// session ends. Teardown lowers DTR/RTS, restores the snapshot (an RFC 2217
// client may have changed it) and closes the port before the next accept.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::io::serial::{open_serial, LineSettings, SerialConfig, SerialLine};
use crate::io::{ControlChannel, IoError, NetworkWriter, PassthroughChannel, PortManager};
use crate::redirector::Redirector;
use crate::settings::{BridgeConfig, ChannelMode};

/// Wait after a failed serial open before accepting again
pub const OPEN_RETRY_DELAY: Duration = Duration::from_secs(2);

pub type SerialOpener =
    Arc<dyn Fn(&SerialConfig) -> Result<Box<dyn SerialLine>, IoError> + Send + Sync>;

/// Bind the listening socket (SO_REUSEADDR, backlog 1).
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1)
}

/// Build the control channel for a session.
pub fn make_channel(
    mode: ChannelMode,
    serial: Box<dyn SerialLine>,
    network: Arc<NetworkWriter>,
) -> io::Result<Box<dyn ControlChannel>> {
    match mode {
        ChannelMode::Rfc2217 => Ok(Box::new(PortManager::new(serial, network)?)),
        ChannelMode::Raw => Ok(Box::new(PassthroughChannel)),
    }
}

pub struct Server {
    config: BridgeConfig,
    opener: SerialOpener,
}

impl Server {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            opener: Arc::new(open_serial),
        }
    }

    /// Replace how the serial port is opened for each connection.
    pub fn with_opener<F>(mut self, opener: F) -> Self
    where
        F: Fn(&SerialConfig) -> Result<Box<dyn SerialLine>, IoError> + Send + Sync + 'static,
    {
        self.opener = Arc::new(opener);
        self
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(self, addr: SocketAddr) -> io::Result<()> {
        let listener = bind(addr)?;
        tracing::info!("[server] TCP/IP port: {}", addr.port());
        self.serve(listener, ctrl_c()).await
    }

    /// Serve clients from `listener` until `shutdown` completes.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        loop {
            tracing::info!(
                "[server] RFC 2217 TCP/IP to Serial redirector - type Ctrl-C / BREAK to quit"
            );

            let (stream, addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!("[server] accept failed: {}", e);
                        continue;
                    }
                },
            };

            tracing::info!("[server] Connected by {}", addr);
            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!("[server] failed to set TCP_NODELAY: {}", e);
            }

            let serial = match self.open_port().await {
                Ok(serial) => serial,
                Err(e) => {
                    tracing::error!(
                        "[server] Could not open serial port {}: {}",
                        self.config.serial.port,
                        e
                    );
                    drop(stream);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(OPEN_RETRY_DELAY) => continue,
                    }
                }
            };

            if self.session(serial, stream, shutdown.as_mut()).await {
                break;
            }
        }
        tracing::info!("[server] --- exit ---");
        Ok(())
    }

    async fn open_port(&self) -> Result<Box<dyn SerialLine>, IoError> {
        let opener = self.opener.clone();
        let config = self.config.serial.clone();
        tokio::task::spawn_blocking(move || opener(&config))
            .await
            .map_err(|e| IoError::connection(&self.config.serial.port, e.to_string()))?
    }

    /// Run one session. Returns true when shutdown was requested during it.
    async fn session<F>(
        &self,
        mut serial: Box<dyn SerialLine>,
        stream: TcpStream,
        mut shutdown: Pin<&mut F>,
    ) -> bool
    where
        F: Future<Output = ()>,
    {
        let device = serial.name();
        tracing::info!("[server] Serving serial port: {}", device);

        let snapshot = match serial.settings() {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!("[server] could not read settings of {}: {}", device, e);
                None
            }
        };
        if let Err(e) = serial.set_rts(true).and_then(|_| serial.set_dtr(true)) {
            tracing::warn!("[server] could not raise RTS/DTR on {}: {}", device, e);
        }

        let redirector = match self.build_redirector(serial.as_ref(), stream) {
            Ok(redirector) => Arc::new(redirector),
            Err(e) => {
                tracing::error!("[server] failed to set up session: {}", e);
                tracing::info!("[server] Disconnected");
                restore_port(serial, snapshot);
                return false;
            }
        };

        let mut runner = {
            let redirector = redirector.clone();
            tokio::task::spawn_blocking(move || redirector.start())
        };

        let mut interrupted = false;
        let result = tokio::select! {
            result = &mut runner => result,
            _ = &mut shutdown => {
                interrupted = true;
                let stopper = redirector.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || stopper.stop()).await {
                    tracing::error!("[server] stop failed: {}", e);
                }
                runner.await
            }
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("[server] session error: {}", e),
            Err(e) => tracing::error!("[server] session task failed: {}", e),
        }

        tracing::info!("[server] Disconnected {}", redirector.peer());
        let teardown = tokio::task::spawn_blocking(move || {
            redirector.stop();
            drop(redirector);
            restore_port(serial, snapshot);
        });
        if let Err(e) = teardown.await {
            tracing::error!("[server] teardown failed: {}", e);
        }
        interrupted
    }

    fn build_redirector(
        &self,
        serial: &dyn SerialLine,
        stream: TcpStream,
    ) -> Result<Redirector, IoError> {
        let peer = stream
            .peer_addr()
            .map(crate::io::network::peer_label)
            .unwrap_or_else(|_| "tcp(unknown)".to_string());
        let stream = stream
            .into_std()
            .and_then(|s| s.set_nonblocking(false).map(|_| s))
            .map_err(|e| IoError::connection(&peer, e.to_string()))?;

        let mode = self.config.mode;
        Redirector::new(serial.try_clone()?, stream, move |line, network| {
            make_channel(mode, line, network)
        })
    }
}

/// Lower DTR/RTS and put back the settings the port had at connect time.
/// The port closes when `serial` is dropped.
fn restore_port(mut serial: Box<dyn SerialLine>, snapshot: Option<LineSettings>) {
    if let Err(e) = serial.set_dtr(false).and_then(|_| serial.set_rts(false)) {
        tracing::warn!("[server] could not lower DTR/RTS: {}", e);
    }
    if let Some(settings) = snapshot {
        if let Err(e) = serial.apply_settings(&settings) {
            tracing::warn!("[server] could not restore port settings: {}", e);
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[server] failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
