//! Session liveness tracking
//!
//! Devices must not be held indefinitely by abandoned sessions. The primary
//! release contract is explicit `destroy()` plus the session's `Drop` impl;
//! this manager is the safety net and the policy layer on top:
//!
//! - it tracks every registered session by weak reference and prunes
//!   entries whose last owner disappeared,
//! - it can detach sessions that have been idle too long, freeing devices
//!   without discarding cached executables, and
//! - it implements `reassign`, which destroys a slot's old session before
//!   the new one can reserve anything (strict release-before-reserve, so
//!   the device pool is never transiently over-subscribed).

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::debug;

use crate::error::ForgeResult;
use crate::session::{CompiledSession, SessionState};

/// A variable-like slot holding at most one owning session reference
pub type SessionSlot = Option<Arc<CompiledSession>>;

/// Tracks live sessions and enforces device release policies
#[derive(Default)]
pub struct SessionLifecycleManager {
    sessions: Mutex<Vec<Weak<CompiledSession>>>,
}

impl SessionLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session by weak reference
    pub fn register(&self, session: &Arc<CompiledSession>) -> ForgeResult<()> {
        let mut sessions = self.sessions.lock()?;
        sessions.push(Arc::downgrade(session));
        Ok(())
    }

    /// Drop tracking entries whose sessions no longer exist
    ///
    /// A session with no remaining owner has already released its devices
    /// through `Drop`; sweeping just prunes the bookkeeping. Returns the
    /// number of entries pruned.
    pub fn sweep(&self) -> ForgeResult<usize> {
        let mut sessions = self.sessions.lock()?;
        let before = sessions.len();
        sessions.retain(|weak| weak.upgrade().is_some());
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!(pruned, "pruned dead session entries");
        }
        Ok(pruned)
    }

    /// Number of sessions still alive
    pub fn live_count(&self) -> ForgeResult<usize> {
        let sessions = self.sessions.lock()?;
        Ok(sessions.iter().filter(|w| w.upgrade().is_some()).count())
    }

    /// Detach every Ready session idle for longer than `max_idle`
    ///
    /// Frees devices for other sessions while keeping compiled executables
    /// cached; detached sessions reattach transparently on next use.
    /// Returns the number of sessions detached.
    pub fn detach_idle(&self, max_idle: Duration) -> ForgeResult<usize> {
        let sessions = self.sessions.lock()?;
        let mut detached = 0usize;
        for weak in sessions.iter() {
            let Some(session) = weak.upgrade() else {
                continue;
            };
            if session.state()? == SessionState::Ready && session.idle_for()? > max_idle {
                session.detach()?;
                detached += 1;
                debug!(session = session.id(), "detached idle session");
            }
        }
        Ok(detached)
    }

    /// Destroy every live tracked session, releasing all devices
    ///
    /// Returns the number of sessions destroyed.
    pub fn destroy_all(&self) -> ForgeResult<usize> {
        let mut sessions = self.sessions.lock()?;
        let mut destroyed = 0usize;
        for weak in sessions.iter() {
            if let Some(session) = weak.upgrade() {
                session.destroy()?;
                destroyed += 1;
            }
        }
        sessions.clear();
        Ok(destroyed)
    }

    /// Bind a new session to a slot, destroying the slot's old session first
    ///
    /// Ordering is strict release-before-reserve: the old session's devices
    /// are released before the new session is stored (and before it can
    /// reserve anything), so rebinding never over-subscribes the pool.
    pub fn reassign(
        &self,
        slot: &mut SessionSlot,
        new_session: Arc<CompiledSession>,
    ) -> ForgeResult<()> {
        if let Some(old) = slot.take() {
            old.destroy()?;
            debug!(
                old = old.id(),
                new = new_session.id(),
                "reassigned session slot"
            );
        }
        self.register(&new_session)?;
        *slot = Some(new_session);
        Ok(())
    }
}
