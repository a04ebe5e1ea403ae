//! In-process agents for local contexts.
//!
//! A local context answers text requests by calling an agent linked into
//! the client, selected by the domain bits of the requested ident. Agents
//! are not required to be thread-safe across concurrent callers of the
//! same domain; the dispatcher records the first thread to use the local
//! path and reports later threads.

use parking_lot::RwLock;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::catalogue::HelpCatalogue;
use crate::types::{Handle, Result, TextRequest};

/// A help text provider for one domain.
///
/// The returned text may borrow from the agent; the dispatcher copies it
/// before the agent can be called again.
pub trait Agent: Send + Sync {
    /// Domain number this agent serves.
    fn domain(&self) -> u32;

    /// Text for `request`. An empty string means "no text at this level".
    fn text(&self, context: Handle, request: &TextRequest) -> Result<Cow<'_, str>>;
}

/// Domain → agent dispatch table.
#[derive(Default)]
pub struct AgentTable {
    agents: RwLock<BTreeMap<u32, Arc<dyn Agent>>>,
}

impl fmt::Debug for AgentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTable")
            .field("domains", &self.domains())
            .finish()
    }
}

impl AgentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `agent` under its domain, replacing any previous one.
    pub fn register(&self, agent: Arc<dyn Agent>) -> Option<Arc<dyn Agent>> {
        let domain = agent.domain();
        tracing::debug!(domain, "agent registered");
        self.agents.write().insert(domain, agent)
    }

    pub fn unregister(&self, domain: u32) -> Option<Arc<dyn Agent>> {
        self.agents.write().remove(&domain)
    }

    pub fn lookup(&self, domain: u32) -> Option<Arc<dyn Agent>> {
        self.agents.read().get(&domain).cloned()
    }

    pub fn domains(&self) -> Vec<u32> {
        self.agents.read().keys().copied().collect()
    }
}

/// Agent serving a fixed catalogue for one domain.
#[derive(Debug, Clone)]
pub struct StaticAgent {
    domain: u32,
    catalogue: HelpCatalogue,
}

impl StaticAgent {
    pub fn new(domain: u32, catalogue: HelpCatalogue) -> Self {
        Self { domain, catalogue }
    }
}

impl Agent for StaticAgent {
    fn domain(&self) -> u32 {
        self.domain
    }

    fn text(&self, _context: Handle, request: &TextRequest) -> Result<Cow<'_, str>> {
        // Unknown idents behave like known ones without text.
        Ok(Cow::Borrowed(self.catalogue.text(request).unwrap_or("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Pmid, TextLevel};

    fn agent() -> Arc<dyn Agent> {
        let mut catalogue = HelpCatalogue::new();
        catalogue.insert_pmid(Pmid::new(29, 0, 1), "free memory", "");
        Arc::new(StaticAgent::new(29, catalogue))
    }

    #[test]
    fn register_and_lookup() {
        let table = AgentTable::new();
        assert!(table.register(agent()).is_none());
        assert!(table.register(agent()).is_some());
        assert_eq!(table.domains(), vec![29]);
        assert!(table.lookup(29).is_some());
        assert!(table.lookup(30).is_none());
        assert!(table.unregister(29).is_some());
        assert!(table.lookup(29).is_none());
    }

    #[test]
    fn static_agent_borrows_text() {
        let agent = agent();
        let req = TextRequest::pmid(Pmid::new(29, 0, 1), TextLevel::OneLine);
        let text = agent.text(Handle::from_raw(0), &req).unwrap();
        assert!(matches!(text, Cow::Borrowed("free memory")));
        let help = agent.text(Handle::from_raw(0), &TextRequest { level: TextLevel::Help, ..req });
        assert_eq!(help.unwrap(), "");
        let unknown = TextRequest::pmid(Pmid::new(29, 9, 9), TextLevel::OneLine);
        assert_eq!(agent.text(Handle::from_raw(0), &unknown).unwrap(), "");
    }
}
