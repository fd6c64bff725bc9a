use crate::events::{EventBus, TransportEvent};
use crate::protocol::{self, Request};
use crate::state::DeviceState;
use crate::types::{GraphicsApi, RuntimeInfo};
use crate::{AetherError, Result};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Interval between accept attempts while listening.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Socket read timeout; bounds how long a session takes to notice `stop()`.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to the runtime transport thread.
///
/// The thread alternates between listening for a runtime and serving a
/// single connected runtime until it goes away. Every exchange is started by
/// the runtime.
pub struct TransportServer {
    local_addr: SocketAddr,
    stop_flag: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl TransportServer {
    /// Bind `addr` and start serving on a background thread.
    pub fn start<A: ToSocketAddrs>(
        addr: A,
        state: Arc<DeviceState>,
        events: Arc<EventBus>,
    ) -> Result<TransportServer> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));
        let ctx = ServerContext {
            state,
            events,
            stop_flag: stop_flag.clone(),
            connected: connected.clone(),
        };

        let thread = std::thread::Builder::new()
            .name("aether-transport".into())
            .spawn(move || accept_loop(listener, ctx))
            .map_err(|e| AetherError::Spawn(format!("transport thread: {}", e)))?;

        Ok(TransportServer {
            local_addr,
            stop_flag,
            connected,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether a runtime is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Stop serving and wait for the transport thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Transport thread panicked");
            }
        }
    }
}

impl Drop for TransportServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ServerContext {
    state: Arc<DeviceState>,
    events: Arc<EventBus>,
    stop_flag: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl ServerContext {
    fn running(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }
}

fn accept_loop(listener: TcpListener, ctx: ServerContext) {
    match listener.local_addr() {
        Ok(addr) => log::info!("Listening for runtime on {}", addr),
        Err(_) => log::info!("Listening for runtime"),
    }

    while ctx.running() {
        match listener.accept() {
            Ok((stream, peer)) => serve(stream, peer, &ctx),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                log::warn!("Accept failed: {}", e);
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }

    log::info!("Transport stopped");
}

fn serve(stream: TcpStream, peer: SocketAddr, ctx: &ServerContext) {
    let mut session = match Session::new(stream, ctx) {
        Ok(session) => session,
        Err(e) => {
            log::warn!("Failed to set up connection from {}: {}", peer, e);
            return;
        }
    };

    log::info!("Runtime connected from {}", peer);
    ctx.connected.store(true, Ordering::Release);
    ctx.events.emit(TransportEvent::Connected { peer });

    match session.communicate() {
        Err(AetherError::ShuttingDown) => log::debug!("Closing runtime connection for shutdown"),
        Err(AetherError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
            log::info!("Runtime closed the connection")
        }
        Err(e) => log::warn!("Runtime connection lost: {}", e),
        Ok(()) => {}
    }

    ctx.connected.store(false, Ordering::Release);
    ctx.events.emit(TransportEvent::Disconnected);
}

/// One connected runtime.
struct Session<'a> {
    stream: TcpStream,
    ctx: &'a ServerContext,
}

impl<'a> Session<'a> {
    fn new(stream: TcpStream, ctx: &'a ServerContext) -> io::Result<Self> {
        // Accepted sockets inherit the listener's non-blocking mode on some
        // platforms.
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, ctx })
    }

    /// Serve requests until the runtime disconnects or the server stops.
    fn communicate(&mut self) -> Result<()> {
        loop {
            let mut opcode = [0u8; 1];
            self.read_exact(&mut opcode)?;

            match Request::from_opcode(opcode[0]) {
                Request::TrackingState => self.send_tracking_state()?,
                Request::RuntimeInfo => self.receive_runtime_info()?,
                Request::RegisterImage => {
                    let mut buf = [0u8; protocol::REGISTER_IMAGE_SIZE];
                    self.read_exact(&mut buf)?;
                    let cmd = protocol::decode_register_image(&buf);
                    log::debug!("Register image {} ({}x{})", cmd.id, cmd.width, cmd.height);
                    self.ctx.events.emit(TransportEvent::RegisterImage(cmd));
                }
                Request::PresentImage => {
                    let mut buf = [0u8; protocol::PRESENT_IMAGE_SIZE];
                    self.read_exact(&mut buf)?;
                    let cmd = protocol::decode_present_image(&buf);
                    log::trace!("Present image {}", cmd.id);
                    self.ctx.events.emit(TransportEvent::PresentImage(cmd));
                }
                Request::Unknown(op) => log::warn!("Ignoring unknown opcode 0x{:02x}", op),
            }
        }
    }

    fn send_tracking_state(&mut self) -> Result<()> {
        // Locks are released before the reply touches the socket.
        let reply = protocol::encode_state_report(&self.ctx.state.poll());
        self.stream.write_all(&reply)?;
        Ok(())
    }

    fn receive_runtime_info(&mut self) -> Result<()> {
        let mut len = [0u8; 4];
        self.read_exact(&mut len)?;
        let len = u32::from_le_bytes(len) as usize;
        if len > protocol::MAX_APPLICATION_NAME_LEN {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("application name of {} bytes", len),
            )
            .into());
        }

        let mut name = vec![0u8; len];
        self.read_exact(&mut name)?;
        let mut api = [0u8; 4];
        self.read_exact(&mut api)?;

        let info = RuntimeInfo {
            application_name: String::from_utf8_lossy(&name).into_owned(),
            graphics_api: GraphicsApi::from_raw(u32::from_le_bytes(api)),
        };
        log::info!(
            "Runtime application: {} ({:?})",
            info.display_name(),
            info.graphics_api
        );
        self.ctx.events.emit(TransportEvent::RuntimeInfo(info));
        Ok(())
    }

    /// Fill `buf`, riding out read timeouts until the server stops.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if !self.ctx.running() {
                return Err(AetherError::ShuttingDown);
            }
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof).into()),
                Ok(n) => filled += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
