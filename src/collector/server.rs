//! TCP collector: accept loop and per-connection PDU handler.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use super::codec::{read_pdu, write_pdu};
use crate::catalogue::HelpCatalogue;
use crate::pdu::codec::{
    self, Decode, Encode, ErrorPdu, TextPdu, TextReqPdu, PDU_TEXT_REQ, PROTOCOL_VERSION,
};
use crate::types::{CollectorConfig, Error, TextRequest};

/// Help text collector serving one catalogue.
#[derive(Debug)]
pub struct Collector {
    catalogue: Arc<HelpCatalogue>,
    cancel: CancellationToken,
    config: CollectorConfig,
    requests_served: Arc<AtomicU64>,
}

impl Collector {
    pub fn new(catalogue: Arc<HelpCatalogue>, config: CollectorConfig) -> Self {
        Self {
            catalogue,
            cancel: CancellationToken::new(),
            config,
            requests_served: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bind `listen_addr` and serve until cancelled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until cancelled or accept fails.
    pub async fn serve_on(&self, listener: TcpListener) -> std::io::Result<()> {
        let conn_semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        tracing::info!(
            "collector listening on {} (max_connections={}, entries={})",
            listener.local_addr()?,
            self.config.max_connections,
            self.catalogue.len(),
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("collector shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = accept?;

                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                "connection from {} rejected: at max_connections ({})",
                                peer,
                                self.config.max_connections,
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!(
                        "connection from {} (active={})",
                        peer,
                        self.config.max_connections - conn_semaphore.available_permits(),
                    );
                    let session = Session {
                        catalogue: Arc::clone(&self.catalogue),
                        cancel: self.cancel.clone(),
                        config: self.config.clone(),
                        requests_served: Arc::clone(&self.requests_served),
                    };
                    tokio::spawn(async move {
                        if let Err(e) = session.run(stream, permit).await {
                            tracing::warn!("connection from {} error: {}", peer, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Request graceful shutdown of the accept loop and all sessions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// TEXT_REQ PDUs handled so far, across all connections.
    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }
}

struct Session {
    catalogue: Arc<HelpCatalogue>,
    cancel: CancellationToken,
    config: CollectorConfig,
    requests_served: Arc<AtomicU64>,
}

/// Reply chosen for one request PDU.
enum Reply<'a> {
    Text(TextPdu<'a>),
    Error(Error),
}

impl Session {
    async fn run(
        self,
        stream: tokio::net::TcpStream,
        _permit: OwnedSemaphorePermit,
    ) -> std::io::Result<()> {
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();
        let write_timeout = self.config.write_timeout;

        let hello = ErrorPdu {
            code: PROTOCOL_VERSION as i32,
        };
        timed_write(&mut writer, &hello, write_timeout).await?;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                read = tokio::time::timeout(self.config.read_timeout, read_pdu(&mut reader, self.config.max_pdu_bytes)) => {
                    let (header, pdu) = match read {
                        Err(_elapsed) => {
                            tracing::debug!("read timeout ({:?}), dropping connection", self.config.read_timeout);
                            break;
                        }
                        Ok(result) => match result? {
                            Some(p) => p,
                            None => break,
                        },
                    };

                    if header.pdu_type != PDU_TEXT_REQ {
                        tracing::debug!("unexpected {} PDU", codec::type_name(header.pdu_type));
                        timed_write(&mut writer, &ErrorPdu { code: Error::Ipc.code() }, write_timeout).await?;
                        continue;
                    }

                    match self.answer(&pdu) {
                        Reply::Text(text) => timed_write(&mut writer, &text, write_timeout).await?,
                        Reply::Error(e) => {
                            timed_write(&mut writer, &ErrorPdu { code: e.code() }, write_timeout).await?
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn answer(&self, pdu: &[u8]) -> Reply<'_> {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        let req = match TextReqPdu::decode(pdu) {
            Ok(req) => req,
            Err(e) => return Reply::Error(e),
        };
        let Some(request) = TextRequest::from_wire(req.ident, req.type_bits) else {
            return Reply::Error(Error::Ipc);
        };
        match self.catalogue.text(&request) {
            Some(text) => Reply::Text(TextPdu {
                ident: req.ident,
                text: Cow::Borrowed(text),
            }),
            None => Reply::Error(Error::Text),
        }
    }
}

/// Write a PDU with a timeout so a stalled reader cannot hold a session.
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin, T: Encode>(
    writer: &mut W,
    body: &T,
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_pdu(writer, 0, body))
        .await
        .map_err(|_| {
            tracing::warn!("write timeout ({:?}), dropping connection", timeout);
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}
