//! Cross-Context Notifier
//!
//! Turns focus, visibility and external store changes into at most one
//! pending summary repaint per animation frame.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::models::{COUNT_SUFFIX, TOTAL_SUFFIX};

/// Handle of a requested animation frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub i32);

/// Source of animation frames
pub trait FrameClock {
    /// Ask for a callback on the next paint frame
    fn request_frame(&mut self) -> FrameId;

    /// Drop a frame that has not fired yet
    fn cancel_frame(&mut self, frame: FrameId);
}

/// Events that may make the summary stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    /// The window regained focus
    Focus,
    /// The document's visibility changed
    VisibilityChange { visible: bool },
    /// Another context wrote to the record store; `None` after a clear
    StorageChange { key: Option<String> },
}

impl ContextEvent {
    /// Whether this event should trigger a summary repaint
    pub fn wants_repaint(&self) -> bool {
        match self {
            ContextEvent::Focus => true,
            ContextEvent::VisibilityChange { visible } => *visible,
            ContextEvent::StorageChange { key: Some(key) } => {
                key.ends_with(COUNT_SUFFIX) || key.ends_with(TOTAL_SUFFIX)
            }
            ContextEvent::StorageChange { key: None } => false,
        }
    }
}

/// Single-slot debounce: scheduling replaces any pending frame
pub struct RepaintSlot<C: FrameClock> {
    clock: C,
    pending: Option<FrameId>,
}

impl<C: FrameClock> RepaintSlot<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, pending: None }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn pending(&self) -> Option<FrameId> {
        self.pending
    }

    /// Cancel the pending frame, if any, and request a fresh one
    pub fn schedule(&mut self) -> FrameId {
        if let Some(stale) = self.pending.take() {
            self.clock.cancel_frame(stale);
        }
        let frame = self.clock.request_frame();
        self.pending = Some(frame);
        frame
    }

    /// Consume a fired frame; `true` when it is the pending one
    pub fn fire(&mut self, frame: FrameId) -> bool {
        if self.pending == Some(frame) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Route an event, scheduling a repaint when it calls for one
    pub fn handle(&mut self, event: &ContextEvent) -> Option<FrameId> {
        if event.wants_repaint() {
            Some(self.schedule())
        } else {
            None
        }
    }
}

/// Frame clock driven by hand, for hosts without a paint loop
#[derive(Debug, Default)]
pub struct ManualClock {
    next: i32,
    requested: Vec<FrameId>,
    cancelled: Vec<FrameId>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames requested and not cancelled, oldest first, draining them
    pub fn take_due(&mut self) -> Vec<FrameId> {
        std::mem::take(&mut self.requested)
    }

    pub fn cancelled(&self) -> &[FrameId] {
        &self.cancelled
    }
}

impl FrameClock for ManualClock {
    fn request_frame(&mut self) -> FrameId {
        self.next += 1;
        let frame = FrameId(self.next);
        self.requested.push(frame);
        frame
    }

    fn cancel_frame(&mut self, frame: FrameId) {
        self.requested.retain(|f| *f != frame);
        self.cancelled.push(frame);
    }
}

/// Frame callbacks kept alive until they fire or are cancelled
///
/// A firing callback reports itself through a [`FiredMarker`]; its slot is
/// freed on the next `reap`, never while it runs.
pub struct PendingFrames<T> {
    scheduled: HashMap<FrameId, T>,
    fired: Rc<RefCell<Vec<FrameId>>>,
}

/// Handed to a frame callback to report that it ran
#[derive(Clone)]
pub struct FiredMarker(Rc<RefCell<Vec<FrameId>>>);

impl FiredMarker {
    pub fn mark(&self, frame: FrameId) {
        self.0.borrow_mut().push(frame);
    }
}

impl<T> Default for PendingFrames<T> {
    fn default() -> Self {
        Self {
            scheduled: HashMap::new(),
            fired: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T> PendingFrames<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self) -> FiredMarker {
        FiredMarker(Rc::clone(&self.fired))
    }

    pub fn hold(&mut self, frame: FrameId, callback: T) {
        self.scheduled.insert(frame, callback);
    }

    /// Take back a callback whose frame was cancelled
    pub fn release(&mut self, frame: FrameId) -> Option<T> {
        self.scheduled.remove(&frame)
    }

    /// Drop every callback that has fired
    pub fn reap(&mut self) {
        for frame in self.fired.borrow_mut().drain(..) {
            self.scheduled.remove(&frame);
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.scheduled.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }
}
