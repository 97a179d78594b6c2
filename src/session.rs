//! Bracketing of debug-garbage sessions.
//!
//! A session forces a collection so stale cyclic garbage does not pollute the
//! capture, then turns automatic collection off until the session ends. The
//! collector's state is process-wide: only one session may be active at a
//! time, and callers are responsible for not overlapping them.

use crate::GCResult;
use crate::gc::global;
use crate::runtime::CycleCollector;
use log::debug;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSession {
    debug_flags_prev: u32,
    enabled_prev: bool,
}

impl CollectorSession {
    pub fn begin<C: CycleCollector + ?Sized>(collector: &mut C) -> GCResult<Self> {
        let session = Self {
            debug_flags_prev: collector.get_debug(),
            enabled_prev: collector.is_enabled(),
        };

        let found = collector.collect()?;
        collector.disable();
        debug!("debug-garbage session started, {found} stale objects collected");

        Ok(session)
    }

    /// Clears every debug flag and restores automatic collection.
    pub fn end<C: CycleCollector + ?Sized>(self, collector: &mut C) {
        collector.set_debug(0);
        if self.enabled_prev {
            collector.enable();
        }
        debug!("debug-garbage session ended");
    }

    pub fn debug_flags_prev(&self) -> u32 {
        self.debug_flags_prev
    }

    pub fn enabled_prev(&self) -> bool {
        self.enabled_prev
    }
}

/// Scoped session: ends when dropped, including on early return or unwind.
pub struct DebugGarbageGuard<'a, C: CycleCollector + ?Sized> {
    collector: &'a mut C,
    session: Option<CollectorSession>,
}

impl<'a, C: CycleCollector + ?Sized> DebugGarbageGuard<'a, C> {
    pub fn begin(collector: &'a mut C) -> GCResult<Self> {
        let session = CollectorSession::begin(&mut *collector)?;
        Ok(Self {
            collector,
            session: Some(session),
        })
    }

    pub fn session(&self) -> Option<&CollectorSession> {
        self.session.as_ref()
    }

    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(session) = self.session.take() {
            session.end(&mut *self.collector);
        }
    }
}

impl<C: CycleCollector + ?Sized> Deref for DebugGarbageGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &*self.collector
    }
}

impl<C: CycleCollector + ?Sized> DerefMut for DebugGarbageGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut *self.collector
    }
}

impl<C: CycleCollector + ?Sized> Drop for DebugGarbageGuard<'_, C> {
    fn drop(&mut self) {
        self.release();
    }
}

static ACTIVE_SESSION: Mutex<Option<CollectorSession>> = parking_lot::const_mutex(None);

/// Turns off automatic collection on the global collector so collectable
/// reference cycles stay around for analysis.
pub fn start_debug_garbage() -> GCResult<()> {
    let gc = global::get_gc();
    let mut gc = gc.write();
    let session = CollectorSession::begin(&mut *gc)?;

    let mut active = ACTIVE_SESSION.lock();
    if active.is_none() {
        *active = Some(session);
    }
    Ok(())
}

/// Turns automatic collection back on and clears the debug flags of the
/// global collector.
pub fn end_debug_garbage() {
    let gc = global::get_gc();
    let mut gc = gc.write();

    match ACTIVE_SESSION.lock().take() {
        Some(session) => session.end(&mut *gc),
        None => {
            gc.set_debug(0);
            gc.enable();
        }
    }
}
