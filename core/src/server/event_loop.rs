/*
 * event_loop.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Spoletta, a low-allocation socket toolkit.
 *
 * Spoletta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Spoletta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Spoletta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Single-threaded TLS echo server: one current-thread runtime multiplexes
//! every accepted connection, and delegated engine tasks run on a separate
//! worker thread.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::LocalSet;
use tracing::{debug, info, trace, warn};

use super::engine::{EngineFactory, TlsEngine};
use super::session::{HandshakeProgress, ReadOutcome, TlsSession};
use super::worker::DelegatedTaskWorker;
use crate::buffer::ByteCursor;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::socket::{is_disconnect, Socket, Transfer};

/// Pause before resubmitting delegated tasks to a full worker queue.
const QUEUE_RETRY: Duration = Duration::from_millis(1);

pub struct TlsSocketServer<A> {
    config: ServerConfig,
    acceptor: A,
    listener: std::net::TcpListener,
}

impl<A: EngineFactory> TlsSocketServer<A> {
    /// Bind the listening socket. Port 0 picks a free port.
    pub fn bind(config: ServerConfig, acceptor: A) -> Result<Self> {
        let listener = std::net::TcpListener::bind(config.socket_addr())?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "TLS server bound");
        Ok(Self {
            config,
            acceptor,
            listener,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve on the calling thread until `shutdown` completes.
    pub fn run<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let worker = Rc::new(DelegatedTaskWorker::new(self.config.delegated_task_queue)?);
        let local = LocalSet::new();
        let Self {
            acceptor, listener, ..
        } = self;
        local.block_on(&runtime, async move {
            let listener = TcpListener::from_std(listener)?;
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("TLS server shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => match acceptor.create_engine() {
                                Ok(engine) => {
                                    tokio::task::spawn_local(serve_connection(
                                        stream,
                                        peer,
                                        engine,
                                        worker.clone(),
                                    ));
                                }
                                Err(e) => warn!(%peer, "could not create TLS engine: {}", e),
                            },
                            Err(e) => warn!("accept failed: {}", e),
                        }
                    }
                }
            }
            Ok::<(), crate::Error>(())
        })
    }

    /// Serve on a background thread until the handle is stopped or dropped.
    pub fn spawn(self) -> Result<ServerHandle> {
        let local_addr = self.local_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name("spoletta-tls-server".into())
            .spawn(move || {
                let shutdown = async {
                    let _ = stopped.await;
                };
                if let Err(e) = self.run(shutdown) {
                    warn!("TLS server stopped: {}", e);
                }
            })?;
        Ok(ServerHandle {
            local_addr,
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

/// Running server started with [`TlsSocketServer::spawn`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drop open connections and join the server thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("TLS server thread panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve_connection<E: TlsEngine>(
    stream: TcpStream,
    peer: SocketAddr,
    engine: E,
    worker: Rc<DelegatedTaskWorker>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, "TCP_NODELAY: {}", e);
    }
    debug!(%peer, "accepted connection");
    let mut socket = ConnectionSocket::new(stream);
    let mut session = TlsSession::new(engine);
    if let Err(e) = session.begin_handshake() {
        warn!(%peer, "could not begin handshake: {}", e);
        session.close(&mut socket);
        return;
    }
    match handshake(&mut session, &mut socket, &worker).await {
        Ok(true) => debug!(%peer, "handshake complete"),
        Ok(false) => {
            debug!(%peer, "handshake failed");
            session.close(&mut socket);
            return;
        }
        Err(e) => {
            warn!(%peer, "handshake error: {}", e);
            session.close(&mut socket);
            return;
        }
    }
    let mut received = BytesMut::new();
    loop {
        let outcome = match session.read(&mut socket, &mut received) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%peer, "read failed: {}", e);
                break;
            }
        };
        if !received.is_empty() {
            trace!(%peer, bytes = received.len(), "echo");
            match session.write(&mut socket, &received) {
                Ok(true) => received.clear(),
                Ok(false) => break,
                Err(e) => {
                    warn!(%peer, "write failed: {}", e);
                    break;
                }
            }
        }
        if outcome == ReadOutcome::Closed {
            break;
        }
        if let Err(e) = socket.readable().await {
            debug!(%peer, "socket not readable: {}", e);
            break;
        }
    }
    session.close(&mut socket);
    debug!(%peer, "connection closed");
}

/// Returns false if the handshake failed and the connection should close.
async fn handshake<E: TlsEngine>(
    session: &mut TlsSession<E>,
    socket: &mut ConnectionSocket,
    worker: &DelegatedTaskWorker,
) -> io::Result<bool> {
    loop {
        match session.handshake(socket, worker)? {
            HandshakeProgress::Finished => return Ok(true),
            HandshakeProgress::Failed => return Ok(false),
            HandshakeProgress::WantRead => socket.readable().await?,
            HandshakeProgress::AwaitingTasks(ticket) => ticket.wait().await?,
            HandshakeProgress::QueueFull => tokio::time::sleep(QUEUE_RETRY).await,
        }
    }
}

/// Accepted non-blocking connection as a [`Socket`].
pub struct ConnectionSocket {
    stream: Option<TcpStream>,
}

impl ConnectionSocket {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Wait until a read may make progress.
    pub async fn readable(&self) -> io::Result<()> {
        match &self.stream {
            Some(stream) => stream.readable().await,
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

fn io_failure(e: io::Error) -> io::Result<Transfer> {
    if e.kind() == io::ErrorKind::WouldBlock {
        Ok(Transfer::Bytes(0))
    } else if is_disconnect(&e) {
        Ok(Transfer::Closed)
    } else {
        Err(e)
    }
}

impl Socket for ConnectionSocket {
    fn connect(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "accepted connections cannot reconnect",
        ))
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn read(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        let Some(stream) = &self.stream else {
            return Ok(Transfer::Closed);
        };
        let len = len.min(buffer.remaining());
        if len == 0 {
            return Ok(Transfer::Bytes(0));
        }
        match stream.try_read(&mut buffer.writable()[..len]) {
            Ok(0) => Ok(Transfer::Closed),
            Ok(n) => {
                buffer.advance_position(n);
                Ok(Transfer::Bytes(n))
            }
            Err(e) => io_failure(e),
        }
    }

    fn write(&mut self, buffer: &mut ByteCursor, len: usize) -> io::Result<Transfer> {
        let Some(stream) = &self.stream else {
            return Ok(Transfer::Closed);
        };
        let len = len.min(buffer.remaining());
        if len == 0 {
            return Ok(Transfer::Bytes(0));
        }
        match stream.try_write(&buffer.readable()[..len]) {
            Ok(n) => {
                buffer.advance_position(n);
                Ok(Transfer::Bytes(n))
            }
            Err(e) => io_failure(e),
        }
    }

    fn configure_blocking(&mut self, blocking: bool) -> io::Result<()> {
        if blocking {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "event loop sockets are always non-blocking",
            ))
        } else {
            Ok(())
        }
    }

    fn set_tcp_no_delay(&mut self, on: bool) -> io::Result<()> {
        match &self.stream {
            Some(stream) => stream.set_nodelay(on),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn pair() -> (ConnectionSocket, std::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        (ConnectionSocket::new(stream), client)
    }

    #[tokio::test]
    async fn read_without_data_is_zero_bytes() {
        let (mut socket, _client) = pair().await;
        let mut buffer = ByteCursor::with_capacity(16);
        let transfer = socket.read(&mut buffer, 16).unwrap();
        assert_eq!(transfer, Transfer::Bytes(0));
        assert_eq!(buffer.position(), 0);
    }

    #[tokio::test]
    async fn read_advances_and_reports_peer_close() {
        let (mut socket, mut client) = pair().await;
        client.write_all(b"abc").unwrap();
        socket.readable().await.unwrap();
        let mut buffer = ByteCursor::with_capacity(16);
        assert_eq!(socket.read(&mut buffer, 16).unwrap(), Transfer::Bytes(3));
        assert_eq!(&buffer.filled()[..3], b"abc");

        drop(client);
        socket.readable().await.unwrap();
        assert_eq!(socket.read(&mut buffer, 16).unwrap(), Transfer::Closed);
    }

    #[tokio::test]
    async fn closed_socket_refuses_io() {
        let (mut socket, _client) = pair().await;
        socket.close().unwrap();
        assert!(!socket.is_connected());
        let mut buffer = ByteCursor::from_slice(b"data");
        assert_eq!(socket.write(&mut buffer, 4).unwrap(), Transfer::Closed);
        assert!(socket.connect().is_err());
        assert!(socket.configure_blocking(true).is_err());
    }
}
