//! Routing of text lookups by context kind.
//!
//! ```text
//!   Host     TEXT_REQ ──► collector ──► TEXT | ERROR
//!   Local    agent table[domain].text()
//!   Archive  NotHost
//! ```
//!
//! An empty help text is retried once at one-line level on both the host
//! and local paths. A second empty result is final and reported as `Text`.

use crate::context::{Backend, Context};
use crate::lock::{LockRegistry, Scope};
use crate::pdu::{Connection, PduPool, TextPdu, TextReqPdu};
use crate::types::{Error, Handle, LocalConfig, Result, TextLevel, TextRequest};

/// Fallback progress for one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    AsRequested,
    OneLine,
}

/// Run `fetch` for `request`, retrying an empty help text at one-line level.
fn with_fallback<F>(request: TextRequest, mut fetch: F) -> Result<String>
where
    F: FnMut(&TextRequest) -> Result<String>,
{
    let mut attempt = Attempt::AsRequested;
    let mut current = request;
    loop {
        let text = fetch(&current)?;
        if !text.is_empty() {
            return Ok(text);
        }
        match attempt {
            Attempt::AsRequested if current.level == TextLevel::Help => {
                tracing::trace!("no help text for {:#x}, trying one-line", current.ident);
                attempt = Attempt::OneLine;
                current = current.one_line();
            }
            _ => return Err(Error::Text),
        }
    }
}

/// Borrowed collaborators for one dispatch.
pub(crate) struct Router<'a> {
    pub registry: &'a LockRegistry,
    pub pool: &'a PduPool,
    pub local: &'a LocalConfig,
}

impl Router<'_> {
    /// Text for `request` from the source behind `ctx`. Takes the context
    /// lock for the duration, so exchanges on one context never overlap.
    pub(crate) fn lookup_text(&self, ctx: &Context, request: TextRequest) -> Result<String> {
        let _guard = ctx.guard()?;
        let mut backend = ctx.backend()?;
        match &mut *backend {
            Backend::Host(Some(conn)) => {
                with_fallback(request, |req| self.remote_text(conn, ctx.handle(), req))
            }
            Backend::Host(None) => Err(Error::NotConn),
            Backend::Local(agents) => {
                self.check_local_threading()?;
                let agent = agents.lookup(request.domain()).ok_or_else(|| {
                    tracing::debug!("no agent for domain {}", request.domain());
                    Error::NoAgent
                })?;
                with_fallback(request, |req| {
                    agent.text(ctx.handle(), req).map(|text| text.into_owned())
                })
            }
            Backend::Archive(_) => Err(Error::NotHost),
            Backend::Closed => Err(Error::NoContext),
        }
    }

    fn remote_text(&self, conn: &mut Connection, from: Handle, req: &TextRequest) -> Result<String> {
        conn.send_request(from.as_raw() as u32, &TextReqPdu::from(req))?;
        let pdu = conn.recv_response::<TextPdu<'_>>(self.pool)?;
        let decoded = pdu.decode::<TextPdu<'_>>()?;
        if decoded.ident != req.ident {
            tracing::debug!("text reply for {:#x}, asked for {:#x}", decoded.ident, req.ident);
            return Err(Error::Ipc);
        }
        let text = decoded.into_owned();
        pdu.unpin();
        Ok(text)
    }

    /// Local agents assume a single calling thread; report a second one.
    fn check_local_threading(&self) -> Result<()> {
        if self.registry.witness_scope(Scope::LocalAgent) {
            if self.local.strict_single_thread {
                return Err(Error::Thread);
            }
            tracing::warn!("local agent called from a second thread: {}", Error::Thread);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn help(ident: u32) -> TextRequest {
        TextRequest {
            ident,
            level: TextLevel::Help,
            target: crate::types::TextTarget::Pmid,
        }
    }

    #[test]
    fn non_empty_help_needs_one_fetch() {
        let calls = Cell::new(0);
        let text = with_fallback(help(1), |_| {
            calls.set(calls.get() + 1);
            Ok("long text".into())
        });
        assert_eq!(text.unwrap(), "long text");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn empty_help_falls_back_once() {
        let mut levels = Vec::new();
        let text = with_fallback(help(1), |req| {
            levels.push(req.level);
            Ok(match req.level {
                TextLevel::Help => String::new(),
                TextLevel::OneLine => "short".into(),
            })
        });
        assert_eq!(text.unwrap(), "short");
        assert_eq!(levels, vec![TextLevel::Help, TextLevel::OneLine]);
    }

    #[test]
    fn second_empty_result_is_final() {
        let calls = Cell::new(0);
        let err = with_fallback(help(1), |_| {
            calls.set(calls.get() + 1);
            Ok(String::new())
        });
        assert_eq!(err.unwrap_err(), Error::Text);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn empty_one_line_is_not_retried() {
        let calls = Cell::new(0);
        let err = with_fallback(help(1).one_line(), |_| {
            calls.set(calls.get() + 1);
            Ok(String::new())
        });
        assert_eq!(err.unwrap_err(), Error::Text);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn errors_are_not_retried() {
        let calls = Cell::new(0);
        let err = with_fallback(help(1), |_| {
            calls.set(calls.get() + 1);
            Err(Error::Timeout)
        });
        assert_eq!(err.unwrap_err(), Error::Timeout);
        assert_eq!(calls.get(), 1);
    }
}
