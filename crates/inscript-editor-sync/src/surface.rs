//! The editing surface as seen from the session.

use std::fmt;

use tracing::trace;

/// Identifies one programmatic load. The surface echoes it back through
/// `SessionHandle::load_acknowledged` once the content is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

/// Sink for "show this snapshot" commands.
///
/// The surface may report the load back as an ordinary content change; the
/// session ignores content notifications until the ticket is acknowledged
/// or the acknowledgement times out.
pub trait EditingSurface: Send + 'static {
    fn load_content(&mut self, ticket: LoadTicket, content: &str);
}

impl<F> EditingSurface for F
where
    F: FnMut(LoadTicket, &str) + Send + 'static,
{
    fn load_content(&mut self, ticket: LoadTicket, content: &str) {
        self(ticket, content)
    }
}

/// A surface with nothing on screen, for terminal use. Loads are never
/// acknowledged, so the lock is released by the acknowledgement timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSurface;

impl EditingSurface for HeadlessSurface {
    fn load_content(&mut self, ticket: LoadTicket, content: &str) {
        trace!(%ticket, bytes = content.len(), "headless load");
    }
}
