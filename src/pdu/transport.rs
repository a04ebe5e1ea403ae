//! Blocking PDU exchange with a collector.
//!
//! Sends never time out. Receives run against a deadline covering the whole
//! PDU; when it expires the call fails with `Timeout` and the connection's
//! framing may be left mid-PDU, so callers should reconnect.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::buffer::{PduPool, PinnedPdu};
use super::codec::{self, Decode, Encode, ErrorPdu, PduHeader, HEADER_LEN, PDU_ERROR, PROTOCOL_VERSION};
use crate::lock::{DebugFlags, LockRegistry, ScopedLock};
use crate::types::{from_io, Error, HostConfig, Result};

/// Split `host[:port]`, falling back to `default_port`. Bracketed IPv6
/// literals (`[::1]:44321`) are accepted.
pub fn parse_source(source: &str, default_port: u16) -> Result<(String, u16)> {
    let source = source.trim();
    if source.is_empty() {
        return Err(Error::NotConn);
    }
    if let Some(rest) = source.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or(Error::NotConn)?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| Error::NotConn)?,
            None if tail.is_empty() => default_port,
            None => return Err(Error::NotConn),
        };
        return Ok((host.to_string(), port));
    }
    match source.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port.parse().map_err(|_| Error::NotConn)?;
            Ok((host.to_string(), port))
        }
        _ => Ok((source.to_string(), default_port)),
    }
}

/// An established connection to a collector.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    timeout: Duration,
    protocol_version: u32,
    max_pdu_bytes: u32,
    debug: DebugFlags,
}

impl Connection {
    /// Resolve and connect to `source`, then complete the version handshake.
    pub fn open(
        source: &str,
        config: &HostConfig,
        max_pdu_bytes: u32,
        registry: &LockRegistry,
        pool: &PduPool,
    ) -> Result<Self> {
        let (host, port) = parse_source(source, config.default_port)?;
        let addrs: Vec<SocketAddr> = {
            let _guard = registry.scoped(ScopedLock::Connect).guard()?;
            let resolved = (host.as_str(), port).to_socket_addrs().map_err(|e| {
                tracing::debug!("resolve {}: {}", host, e);
                Error::NotConn
            })?;
            resolved.collect()
        };

        let mut last = Error::NotConn;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(stream) => {
                    let mut conn = Self {
                        stream,
                        peer: addr,
                        timeout: config.request_timeout,
                        protocol_version: 0,
                        max_pdu_bytes,
                        debug: registry.debug(),
                    };
                    conn.stream.set_nodelay(true).map_err(|e| from_io(&e))?;
                    match conn.handshake(pool, config.connect_timeout) {
                        Ok(()) => return Ok(conn),
                        Err(e) => {
                            tracing::debug!("handshake with {} failed: {}", addr, e);
                            last = e;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("connect {}: {}", addr, e);
                    last = Error::NotConn;
                }
            }
        }
        Err(last)
    }

    /// The collector speaks first: an ERROR PDU whose code is its version.
    fn handshake(&mut self, pool: &PduPool, timeout: Duration) -> Result<()> {
        let pdu = self.recv_pdu(pool, timeout)?;
        let header = pdu.header()?;
        if header.pdu_type != PDU_ERROR {
            return Err(Error::Ipc);
        }
        let code = pdu.decode::<ErrorPdu>()?.code;
        if code < 0 {
            return Err(ErrorPdu { code }.into_error());
        }
        if code as u32 != PROTOCOL_VERSION {
            tracing::warn!("{} speaks protocol version {}, expected {}", self.peer, code, PROTOCOL_VERSION);
            return Err(Error::Ipc);
        }
        self.protocol_version = code as u32;
        Ok(())
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Encode `op` and write it. Blocks until written; no timeout.
    pub fn send_request<T: Encode>(&mut self, from: u32, op: &T) -> Result<()> {
        let mut buf = Vec::new();
        op.encode(from, &mut buf);
        if self.debug.contains(DebugFlags::PDU) {
            tracing::debug!(
                "send {} len={} from={} to {}",
                codec::type_name(T::PDU_TYPE),
                buf.len(),
                from,
                self.peer
            );
        }
        self.stream.set_write_timeout(None).map_err(|e| from_io(&e))?;
        self.stream.write_all(&buf).map_err(|e| {
            tracing::debug!("write to {}: {}", self.peer, e);
            from_io(&e)
        })?;
        Ok(())
    }

    /// Receive one PDU of type `T` within the connection timeout.
    ///
    /// An ERROR PDU is decoded and its code returned as the error; any other
    /// type is `Ipc`. The returned buffer carries one pin.
    pub fn recv_response<'a, T: Decode<'a>>(&mut self, pool: &PduPool) -> Result<PinnedPdu> {
        let pdu = self.recv_pdu(pool, self.timeout)?;
        let header = pdu.header()?;
        if header.pdu_type == T::PDU_TYPE {
            return Ok(pdu);
        }
        if header.pdu_type == PDU_ERROR {
            let code = pdu.decode::<ErrorPdu>()?.code;
            return Err(if code < 0 {
                ErrorPdu { code }.into_error()
            } else {
                Error::Ipc
            });
        }
        tracing::debug!(
            "expected {} from {}, got {:#x}",
            codec::type_name(T::PDU_TYPE),
            self.peer,
            header.pdu_type
        );
        Err(Error::Ipc)
    }

    /// Read one complete PDU of any type within `timeout`. A timeout too
    /// large to form a deadline reads without one.
    pub fn recv_pdu(&mut self, pool: &PduPool, timeout: Duration) -> Result<PinnedPdu> {
        let deadline = Instant::now().checked_add(timeout);
        let mut head = [0u8; HEADER_LEN];
        self.read_full(&mut head, deadline)?;
        let header = PduHeader::decode(&head, self.max_pdu_bytes)?;

        let mut buf = pool.take(header.len as usize);
        buf[..HEADER_LEN].copy_from_slice(&head);
        if let Err(e) = self.read_full(&mut buf[HEADER_LEN..], deadline) {
            pool.give_back(buf);
            return Err(e);
        }
        if self.debug.contains(DebugFlags::PDU) {
            tracing::debug!(
                "recv {} len={} from={} via {}",
                codec::type_name(header.pdu_type),
                header.len,
                header.from,
                self.peer
            );
        }
        Ok(pool.pin(buf))
    }

    fn read_full(&mut self, buf: &mut [u8], deadline: Option<Instant>) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(Error::Timeout);
                    }
                    Some(remaining)
                }
                None => None,
            };
            self.stream
                .set_read_timeout(remaining)
                .map_err(|e| from_io(&e))?;
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    tracing::debug!("{} closed the connection", self.peer);
                    return Err(Error::Ipc);
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!("read from {}: {}", self.peer, e);
                    return Err(from_io(&e));
                }
            }
        }
        Ok(())
    }

    /// Close both directions. Further use fails.
    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
