use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use cix_frame::{PacketConfig, PacketReader, PacketWriter};
use cix_transport::{CixStream, TcpTransport, TransportError};
use tracing::{debug, error, info, info_span, warn};

use crate::dispatch::{serve_connection, ServerConfig};
use crate::error::Result;

/// Counters reported when the supervisor stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Connections handed to a handler thread.
    pub accepted: u64,
    /// Handler threads joined after they finished.
    pub reaped: u64,
    /// Connections dropped because no handler thread could be started.
    pub spawn_failures: u64,
}

/// Accepts connections and runs one isolated handler thread per connection.
///
/// Handlers own their connection outright and share nothing mutable with
/// each other or with the supervisor. A dedicated reaper thread joins each
/// handler as soon as it reports completion, so finished handlers never
/// wait for the next accept.
///
/// [`Supervisor::run`] is meant to be called once.
pub struct Supervisor {
    transport: TcpTransport,
    config: Arc<ServerConfig>,
    events: Sender<HandlerEvent>,
    reaper: Option<JoinHandle<()>>,
    counters: Arc<ReapCounters>,
    shutdown: Arc<ShutdownState>,
    next_handler_id: u64,
    accepted: u64,
    spawn_failures: u64,
}

impl Supervisor {
    /// Bind the listening socket on `host:port` and start the reaper.
    pub fn bind(host: &str, port: u16, config: ServerConfig) -> Result<Self> {
        let transport = TcpTransport::bind(host, port)?;
        let (events, rx) = mpsc::channel();
        let counters = Arc::new(ReapCounters::default());
        let reaper = Reaper::new(rx, Arc::clone(&counters));
        let reaper = thread::Builder::new()
            .name("cix-reaper".to_string())
            .spawn(move || reaper.run())
            .map_err(TransportError::Io)?;

        Ok(Self {
            transport,
            config: Arc::new(config),
            events,
            reaper: Some(reaper),
            counters,
            shutdown: Arc::new(ShutdownState::default()),
            next_handler_id: 1,
            accepted: 0,
            spawn_failures: 0,
        })
    }

    /// Bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Handle that stops [`Supervisor::run`] from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            state: Arc::clone(&self.shutdown),
            events: self.events.clone(),
            wake_addr: wake_addr(self.local_addr()),
        }
    }

    /// Handlers started but not yet reaped, as last seen by the reaper.
    pub fn active_handlers(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            accepted: self.accepted,
            reaped: self.counters.reaped.load(Ordering::SeqCst),
            spawn_failures: self.spawn_failures,
        }
    }

    /// Accept and dispatch connections until shut down.
    ///
    /// Accept failures other than `Interrupted` are fatal and returned. On
    /// shutdown, waits for every outstanding handler before returning.
    pub fn run(&mut self) -> Result<SupervisorStats> {
        info!(addr = %self.local_addr(), "accepting connections");

        loop {
            let (stream, addr) = self.accept_retrying()?;
            let stopping = self.shutdown.is_shutdown();
            if stopping && self.shutdown.is_wake_peer(addr) {
                debug!(peer = %addr, "wake-up connection received");
                break;
            }
            info!(peer = %addr, "accepted connection");
            self.spawn_handler(stream, addr);
            if stopping {
                break;
            }
        }

        self.wait_all();
        let stats = self.stats();
        info!(
            accepted = stats.accepted,
            reaped = stats.reaped,
            "supervisor stopped"
        );
        Ok(stats)
    }

    fn accept_retrying(&self) -> Result<(CixStream, SocketAddr)> {
        loop {
            match self.transport.accept() {
                Ok(accepted) => return Ok(accepted),
                Err(TransportError::Accept(err)) if err.kind() == ErrorKind::Interrupted => {
                    debug!("accept interrupted; retrying");
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                    return Err(err.into());
                }
            }
        }
    }

    fn spawn_handler(&mut self, stream: CixStream, addr: SocketAddr) {
        let id = self.next_handler_id;
        self.next_handler_id += 1;

        let conn = match stream.try_clone() {
            Ok(conn) => Some(conn),
            Err(err) => {
                warn!(peer = %addr, error = %err, "connection cannot be force-closed");
                None
            }
        };
        let config = Arc::clone(&self.config);
        let done = CompletionGuard {
            id,
            events: self.events.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("cix-handler-{id}"))
            .spawn(move || {
                let _done = done;
                run_handler(id, stream, addr, &config);
            });

        match spawned {
            Ok(handle) => {
                self.accepted += 1;
                let _ = self.events.send(HandlerEvent::Started { id, handle, conn });
            }
            Err(err) => {
                // The connection went down with the closure.
                error!(peer = %addr, error = %err, "failed to start connection handler");
                self.spawn_failures += 1;
            }
        }
    }

    /// Tell the reaper to exit once every handler is joined, then wait for it.
    fn wait_all(&mut self) {
        let Some(reaper) = self.reaper.take() else {
            return;
        };
        let active = self.active_handlers();
        if active > 0 {
            info!(active, "waiting for open connections");
        }
        let _ = self.events.send(HandlerEvent::Drain);
        if reaper.join().is_err() {
            warn!("reaper thread panicked");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.reaper.is_some() {
            let _ = self.events.send(HandlerEvent::Drain);
        }
    }
}

fn run_handler(id: u64, stream: CixStream, addr: SocketAddr, config: &ServerConfig) {
    let span = info_span!("handler", id, peer = %addr);
    let _enter = span.enter();

    let packet_config = PacketConfig {
        max_payload_size: config.max_payload_size,
        ..PacketConfig::default()
    };
    let reader_stream = match stream.try_clone() {
        Ok(reader_stream) => reader_stream,
        Err(err) => {
            error!(error = %err, "failed to split connection");
            return;
        }
    };
    let mut reader = PacketReader::with_config(reader_stream, packet_config.clone());
    let mut writer = PacketWriter::with_config(stream, packet_config);

    match serve_connection(&mut reader, &mut writer, config) {
        Ok(exchanges) => info!(exchanges, "connection closed"),
        Err(err) => error!(error = %err, "connection terminated"),
    }
}

enum HandlerEvent {
    Started {
        id: u64,
        handle: JoinHandle<()>,
        /// Clone of the handler's connection, used to force it closed.
        conn: Option<CixStream>,
    },
    Finished(u64),
    /// Close every live connection, including ones started later.
    Disconnect,
    /// Exit once no handler is left.
    Drain,
}

/// Reports handler completion when dropped, including on panic.
struct CompletionGuard {
    id: u64,
    events: Sender<HandlerEvent>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let _ = self.events.send(HandlerEvent::Finished(self.id));
    }
}

#[derive(Debug, Default)]
struct ReapCounters {
    active: AtomicUsize,
    reaped: AtomicU64,
}

struct Running {
    handle: JoinHandle<()>,
    conn: Option<CixStream>,
}

/// Owns every handler's join handle and joins each one as it finishes.
struct Reaper {
    events: Receiver<HandlerEvent>,
    counters: Arc<ReapCounters>,
    handlers: HashMap<u64, Running>,
    /// Completions that overtook their `Started` event.
    finished_early: HashSet<u64>,
    disconnecting: bool,
    draining: bool,
}

impl Reaper {
    fn new(events: Receiver<HandlerEvent>, counters: Arc<ReapCounters>) -> Self {
        Self {
            events,
            counters,
            handlers: HashMap::new(),
            finished_early: HashSet::new(),
            disconnecting: false,
            draining: false,
        }
    }

    fn run(mut self) {
        while !(self.draining && self.handlers.is_empty()) {
            let Ok(event) = self.events.recv() else {
                break;
            };
            match event {
                HandlerEvent::Started { id, handle, conn } => {
                    if self.finished_early.remove(&id) {
                        self.join(id, handle);
                    } else {
                        if self.disconnecting {
                            disconnect(id, conn.as_ref());
                        }
                        self.handlers.insert(id, Running { handle, conn });
                    }
                }
                HandlerEvent::Finished(id) => match self.handlers.remove(&id) {
                    Some(running) => self.join(id, running.handle),
                    None => {
                        self.finished_early.insert(id);
                    }
                },
                HandlerEvent::Disconnect => {
                    self.disconnecting = true;
                    for (id, running) in &self.handlers {
                        disconnect(*id, running.conn.as_ref());
                    }
                }
                HandlerEvent::Drain => self.draining = true,
            }
            self.counters
                .active
                .store(self.handlers.len(), Ordering::SeqCst);
        }
        debug!("reaper finished");
    }

    fn join(&self, id: u64, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            warn!(handler = id, "connection handler panicked");
        }
        let reaped = self.counters.reaped.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(handler = id, active = self.handlers.len(), reaped, "reaped handler");
    }
}

fn disconnect(id: u64, conn: Option<&CixStream>) {
    let Some(conn) = conn else {
        warn!(handler = id, "no handle to close connection");
        return;
    };
    match conn.shutdown() {
        Ok(()) => debug!(handler = id, "connection closed by supervisor"),
        Err(err) => debug!(handler = id, error = %err, "connection already closed"),
    }
}

#[derive(Debug, Default)]
struct ShutdownState {
    stopped: AtomicBool,
    /// Local address of the wake-up connection. Locked across the flag flip
    /// and the connect, so the accept loop never reads it half-set.
    wake_peer: Mutex<Option<SocketAddr>>,
}

impl ShutdownState {
    fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn is_wake_peer(&self, peer: SocketAddr) -> bool {
        *lock(&self.wake_peer) == Some(peer)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stops a running [`Supervisor`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    state: Arc<ShutdownState>,
    events: Sender<HandlerEvent>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Ask the supervisor to stop.
    ///
    /// The first call stops accepting and lets open connections finish. The
    /// accept loop is blocked in `accept`, so a throwaway connection is made
    /// to wake it. Any later call closes every open connection.
    pub fn shutdown(&self) {
        let mut wake_peer = lock(&self.state.wake_peer);
        if !self.state.stopped.swap(true, Ordering::SeqCst) {
            match TcpTransport::connect_addr(self.wake_addr) {
                Ok(stream) => *wake_peer = stream.local_addr().ok(),
                Err(err) => debug!(error = %err, "wake-up connection failed"),
            }
            return;
        }
        drop(wake_peer);
        info!("closing open connections");
        let _ = self.events.send(HandlerEvent::Disconnect);
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.is_shutdown()
    }
}

fn wake_addr(bound: SocketAddr) -> SocketAddr {
    match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound.port())
        }
        _ => bound,
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Barrier;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::connector::connect;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cix-supervisor-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    fn start(root: &Path) -> (u16, ShutdownHandle, JoinHandle<Result<SupervisorStats>>) {
        let mut supervisor =
            Supervisor::bind("127.0.0.1", 0, ServerConfig::default().with_root(root))
                .expect("supervisor should bind");
        let port = supervisor.local_addr().port();
        let shutdown = supervisor.shutdown_handle();
        let handle = thread::spawn(move || supervisor.run());
        (port, shutdown, handle)
    }

    /// Join the server thread, failing instead of hanging if it never stops.
    fn join_within(
        server: JoinHandle<Result<SupervisorStats>>,
        limit: Duration,
    ) -> SupervisorStats {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(server.join());
        });
        rx.recv_timeout(limit)
            .expect("supervisor should stop in time")
            .expect("server thread")
            .expect("run")
    }

    #[test]
    fn concurrent_puts_are_isolated_and_reaped() {
        let root = unique_temp_dir("concurrent");
        let (port, shutdown, server) = start(&root);

        let barrier = Arc::new(Barrier::new(2));
        let clients: Vec<_> = ["left.txt", "right.txt"]
            .into_iter()
            .map(|name| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut client = connect("127.0.0.1", port).expect("client should connect");
                    barrier.wait();
                    let body = name.repeat(10_000);
                    client.put(name, body.as_bytes()).expect("put should be acked");
                    body
                })
            })
            .collect();

        let bodies: Vec<String> = clients
            .into_iter()
            .map(|c| c.join().expect("client thread"))
            .collect();

        shutdown.shutdown();
        let stats = server.join().expect("server thread").expect("run");

        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.reaped, stats.accepted);
        assert_eq!(
            std::fs::read_to_string(root.join("left.txt")).unwrap(),
            bodies[0]
        );
        assert_eq!(
            std::fs::read_to_string(root.join("right.txt")).unwrap(),
            bodies[1]
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn finished_handlers_are_reaped_without_another_accept() {
        let root = unique_temp_dir("reap");
        let mut supervisor =
            Supervisor::bind("127.0.0.1", 0, ServerConfig::default().with_root(&root))
                .expect("supervisor should bind");
        let port = supervisor.local_addr().port();

        let client = thread::spawn(move || {
            for _ in 0..3 {
                let mut client = connect("127.0.0.1", port).expect("client should connect");
                client.ls().expect("ls should succeed");
            }
        });

        for _ in 0..3 {
            let (stream, addr) = supervisor.accept_retrying().expect("accept");
            supervisor.spawn_handler(stream, addr);
        }
        client.join().expect("client thread");

        // No further accept happens; the reaper alone must join all three.
        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.stats().reaped < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(supervisor.stats().accepted, 3);
        assert_eq!(supervisor.stats().reaped, 3);
        assert_eq!(supervisor.active_handlers(), 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn shutdown_waits_for_open_connections() {
        let root = unique_temp_dir("shutdown");
        let (port, shutdown, server) = start(&root);

        let mut client = connect("127.0.0.1", port).expect("client should connect");
        client.put("during", b"1").expect("put should succeed");

        shutdown.shutdown();
        assert!(shutdown.is_shutdown());

        // The handler still serves the open connection.
        client.put("after", b"2").expect("handler keeps serving");
        drop(client);

        let stats = server.join().expect("server thread").expect("run");
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.reaped, 1);
        assert!(root.join("after").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn second_shutdown_disconnects_idle_clients() {
        let root = unique_temp_dir("disconnect");
        let (port, shutdown, server) = start(&root);

        let mut idle = connect("127.0.0.1", port).expect("client should connect");
        idle.ls().expect("handler should be serving");

        shutdown.shutdown();
        shutdown.clone().shutdown();

        let stats = join_within(server, Duration::from_secs(5));
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.reaped, 1);

        let err = idle.ls().expect_err("connection should be closed");
        assert!(err.is_fatal());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn client_queued_before_shutdown_is_served() {
        let root = unique_temp_dir("queued");
        let mut supervisor =
            Supervisor::bind("127.0.0.1", 0, ServerConfig::default().with_root(&root))
                .expect("supervisor should bind");
        let port = supervisor.local_addr().port();
        let shutdown = supervisor.shutdown_handle();

        // Queued ahead of the wake-up connection.
        let mut queued = connect("127.0.0.1", port).expect("client should connect");
        shutdown.shutdown();
        let server = thread::spawn(move || supervisor.run());

        queued.put("late.txt", b"served").expect("queued client should be served");
        drop(queued);

        let stats = join_within(server, Duration::from_secs(5));
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.reaped, 1);
        assert_eq!(std::fs::read(root.join("late.txt")).unwrap(), b"served");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn wake_connection_is_recognised_by_local_address() {
        let supervisor = Supervisor::bind("127.0.0.1", 0, ServerConfig::default())
            .expect("supervisor should bind");
        let shutdown = supervisor.shutdown_handle();
        let other = TcpTransport::connect_addr(supervisor.local_addr()).expect("connect");
        let other_addr = other.local_addr().expect("local addr");

        assert!(!supervisor.shutdown.is_wake_peer(other_addr));
        shutdown.shutdown();
        let (_, wake_peer) = supervisor.accept_retrying().expect("accept first");
        assert_eq!(wake_peer, other_addr);
        assert!(!supervisor.shutdown.is_wake_peer(wake_peer));
        let (_, wake_peer) = supervisor.accept_retrying().expect("accept wake");
        assert!(supervisor.shutdown.is_wake_peer(wake_peer));
    }

    #[test]
    fn repeated_shutdown_before_run_stops_cleanly() {
        let root = unique_temp_dir("idempotent");
        let (_port, shutdown, server) = start(&root);

        shutdown.shutdown();
        shutdown.clone().shutdown();

        let stats = join_within(server, Duration::from_secs(5));
        assert_eq!(stats, SupervisorStats::default());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn wake_addr_targets_loopback_for_wildcard_binds() {
        let any: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        assert_eq!(wake_addr(any), "127.0.0.1:4000".parse().unwrap());
        let any6: SocketAddr = "[::]:4000".parse().unwrap();
        assert_eq!(wake_addr(any6), "[::1]:4000".parse().unwrap());
        let specific: SocketAddr = "192.0.2.1:4000".parse().unwrap();
        assert_eq!(wake_addr(specific), specific);
    }
}
