use log::info;
use rand::seq::SliceRandom;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::error::{NodeError, Result};

/// A line-oriented connection to one peer.
///
/// Every protocol payload is a single newline-terminated line; reads are
/// bounded by the configured timeout so an unresponsive peer cannot stall
/// a negotiation indefinitely.
pub struct PeerLink {
    addr: SocketAddr,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl PeerLink {
    /// Dial a peer with a bounded connect timeout; subsequent reads use
    /// `read_timeout`.
    pub fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<PeerLink> {
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)
            .map_err(|e| NodeError::Network(format!("failed to connect to {addr}: {e}")))?;
        stream
            .set_read_timeout(Some(read_timeout))
            .map_err(|e| NodeError::Network(format!("failed to set read timeout: {e}")))?;
        PeerLink::from_stream(stream, addr)
    }

    /// Wrap an already-established stream (an accepted inbound
    /// connection; no read timeout, an idle peer is fine).
    pub fn from_stream(stream: TcpStream, addr: SocketAddr) -> Result<PeerLink> {
        let reader = BufReader::new(
            stream
                .try_clone()
                .map_err(|e| NodeError::Network(format!("failed to clone stream: {e}")))?,
        );
        Ok(PeerLink {
            addr,
            reader,
            writer: stream,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(|e| NodeError::Network(format!("send to {} failed: {e}", self.addr)))
    }

    /// Read one line, without its terminator. EOF is an error: the peer
    /// hung up.
    pub fn recv_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| NodeError::Network(format!("read from {} failed: {e}", self.addr)))?;
        if n == 0 {
            return Err(NodeError::Network(format!(
                "connection to {} closed by peer",
                self.addr
            )));
        }
        let line = String::from_utf8(buf)
            .map_err(|e| NodeError::Wire(format!("non-UTF-8 line from {}: {e}", self.addr)))?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// The set of live outgoing peer links, shared between the transactor
/// (random selection) and the block assembler (broadcast to all).
pub struct PeerRegistry {
    inner: RwLock<Vec<Arc<Mutex<PeerLink>>>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add(&self, link: PeerLink) {
        let mut inner = self
            .inner
            .write()
            .expect("failed to acquire write lock on peer registry");
        info!("peer {} registered", link.addr());
        inner.push(Arc::new(Mutex::new(link)));
    }

    pub fn evict(&self, addr: SocketAddr) {
        let mut inner = self
            .inner
            .write()
            .expect("failed to acquire write lock on peer registry");
        if let Some(idx) = inner
            .iter()
            .position(|link| link.lock().map(|l| l.addr() == addr).unwrap_or(true))
        {
            info!("peer {addr} evicted");
            inner.remove(idx);
        }
    }

    pub fn contains(&self, addr: SocketAddr) -> bool {
        let inner = self
            .inner
            .read()
            .expect("failed to acquire read lock on peer registry");
        inner
            .iter()
            .any(|link| link.lock().map(|l| l.addr() == addr).unwrap_or(false))
    }

    /// A random live peer, for transaction negotiation.
    pub fn pick_random(&self) -> Option<Arc<Mutex<PeerLink>>> {
        let inner = self
            .inner
            .read()
            .expect("failed to acquire read lock on peer registry");
        inner.choose(&mut rand::thread_rng()).cloned()
    }

    /// All live peers, for block broadcast.
    pub fn all(&self) -> Vec<Arc<Mutex<PeerLink>>> {
        self.inner
            .read()
            .expect("failed to acquire read lock on peer registry")
            .to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("failed to acquire read lock on peer registry")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("failed to acquire read lock on peer registry")
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn localhost_pair() -> (PeerLink, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        let link = PeerLink::connect(
            addr,
            Duration::from_secs(3),
            Duration::from_secs(3),
        )
        .unwrap();
        (link, accept.join().unwrap())
    }

    #[test]
    fn test_line_round_trip() {
        let (mut link, server_side) = localhost_pair();
        let server_addr = server_side.peer_addr().unwrap();
        let mut server_link = PeerLink::from_stream(server_side, server_addr).unwrap();

        link.send_line("Send pub key for a new transaction").unwrap();
        assert_eq!(
            server_link.recv_line().unwrap(),
            "Send pub key for a new transaction"
        );

        server_link.send_line("BUYER_PUB_KEY=CEROCOIN_PUBKEY,mod=ab,e=11").unwrap();
        assert_eq!(
            link.recv_line().unwrap(),
            "BUYER_PUB_KEY=CEROCOIN_PUBKEY,mod=ab,e=11"
        );
    }

    #[test]
    fn test_recv_times_out_on_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = thread::spawn(move || listener.accept());
        let mut link = PeerLink::connect(
            addr,
            Duration::from_secs(3),
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(link.recv_line().is_err());
    }

    #[test]
    fn test_recv_errors_on_peer_hangup() {
        let (mut link, server_side) = localhost_pair();
        drop(server_side);
        assert!(link.recv_line().is_err());
    }

    #[test]
    fn test_registry_add_evict() {
        let registry = PeerRegistry::new();
        assert!(registry.is_empty());
        let (link, _server_side) = localhost_pair();
        let addr = link.addr();
        registry.add(link);
        assert_eq!(registry.len(), 1);
        assert!(registry.pick_random().is_some());
        registry.evict(addr);
        assert!(registry.is_empty());
        assert!(registry.pick_random().is_none());
    }
}
