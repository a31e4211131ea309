//! Event scheduler.
//!
//! Events are kept in a vector sorted by descending cycle, so the next event to fire is always
//! at the back. Events scheduled for the same cycle fire in the order they were registered.

use crate::Cycles;

/// Context passed to event handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerCtx {
    /// How many cycles after its requested cycle the event actually fired.
    pub cycles_late: Cycles,
}

/// An event handler. Receives the owner of the scheduler.
pub type Handler<C> = fn(&mut C, HandlerCtx);

/// Which component registered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Source {
    /// A timer channel.
    Timer(usize),
    /// Whoever is driving the system.
    Host,
}

/// Handle to a scheduled event, used to cancel it. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

pub struct Event<C> {
    /// Cycle at which this event is due.
    pub cycle: u64,
    pub id: EventId,
    pub source: Source,
    pub handler: Handler<C>,
}

impl<C> Clone for Event<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Event<C> {}

impl<C> std::fmt::Debug for Event<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("cycle", &self.cycle)
            .field("id", &self.id)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<C> Event<C> {
    #[inline(always)]
    pub fn call(self, ctx: &mut C, hctx: HandlerCtx) {
        (self.handler)(ctx, hctx)
    }
}

pub struct Scheduler<C> {
    elapsed: u64,
    next_id: u64,
    events: Vec<Event<C>>,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self {
            elapsed: 0,
            next_id: 0,
            events: Vec::with_capacity(32),
        }
    }
}

impl<C> Scheduler<C> {
    /// Cycles elapsed since the scheduler was created.
    #[inline(always)]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// Schedules `handler` to run `delay` cycles from now.
    #[inline]
    pub fn schedule(&mut self, delay: u64, source: Source, handler: Handler<C>) -> EventId {
        self.schedule_at(self.elapsed + delay, source, handler)
    }

    /// Schedules `handler` to run as soon as events are processed.
    #[inline]
    pub fn schedule_now(&mut self, source: Source, handler: Handler<C>) -> EventId {
        self.schedule_at(self.elapsed, source, handler)
    }

    /// Schedules `handler` to run at the absolute cycle `cycle`.
    ///
    /// # Panics
    /// Panics if `cycle` is in the past.
    pub fn schedule_at(&mut self, cycle: u64, source: Source, handler: Handler<C>) -> EventId {
        assert!(
            cycle >= self.elapsed,
            "event from {source} scheduled in the past (cycle {cycle}, now {})",
            self.elapsed
        );

        let id = EventId(self.next_id);
        self.next_id += 1;

        let index = self.events.partition_point(|e| e.cycle > cycle);
        self.events.insert(
            index,
            Event {
                cycle,
                id,
                source,
                handler,
            },
        );

        id
    }

    /// Cancels a pending event. Returns whether the event was still pending.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let Some(index) = self.events.iter().position(|e| e.id == id) else {
            return false;
        };

        self.events.remove(index);
        true
    }

    /// Cancels every pending event registered by `source`.
    pub fn cancel_source(&mut self, source: Source) {
        self.events.retain(|e| e.source != source);
    }

    /// Cycle of the next pending event, if any.
    #[inline(always)]
    pub fn next_cycle(&self) -> Option<u64> {
        self.events.last().map(|e| e.cycle)
    }

    /// Cycles until the next pending event, if any. Zero if it is already due.
    #[inline(always)]
    pub fn until_next(&self) -> Option<u64> {
        self.next_cycle().map(|c| c.saturating_sub(self.elapsed))
    }

    /// Moves the clock forward without firing anything.
    #[inline(always)]
    pub fn advance(&mut self, cycles: u64) {
        self.elapsed += cycles;
    }

    /// Id that the next scheduled event will receive.
    #[inline(always)]
    pub fn horizon(&self) -> EventId {
        EventId(self.next_id)
    }

    /// Removes and returns the next due event registered before `horizon`. Newer due events are
    /// skipped over and stay pending.
    #[inline]
    pub fn pop_before(&mut self, horizon: EventId) -> Option<Event<C>> {
        let elapsed = self.elapsed;
        let offset = self
            .events
            .iter()
            .rev()
            .take_while(|e| e.cycle <= elapsed)
            .position(|e| e.id.0 < horizon.0)?;

        Some(self.events.remove(self.events.len() - 1 - offset))
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

/// Something that owns a [`Scheduler`] and is passed to its handlers.
pub trait Clocked: Sized {
    fn scheduler(&mut self) -> &mut Scheduler<Self>;

    /// Fires every event that is due at the current cycle, in order. Events registered by the
    /// handlers themselves are left for the next call.
    fn process_events(&mut self) {
        let horizon = self.scheduler().horizon();
        while let Some(event) = self.scheduler().pop_before(horizon) {
            let cycles_late = self.scheduler().elapsed() - event.cycle;
            let ctx = HandlerCtx {
                cycles_late: Cycles(cycles_late),
            };

            event.call(self, ctx);
        }
    }

    /// Advances the clock up to `target`, firing each event exactly at its own cycle. Events that
    /// were already overdue fire first, late.
    fn advance_to(&mut self, target: u64) {
        self.process_events();

        while let Some(next) = self.scheduler().next_cycle() {
            if next > target {
                break;
            }

            let now = self.scheduler().elapsed();
            self.scheduler().advance(next.saturating_sub(now));
            self.process_events();
        }

        let now = self.scheduler().elapsed();
        if target > now {
            self.scheduler().advance(target - now);
        }
    }

    /// Advances the clock by `cycles`, firing events precisely. See [`Clocked::advance_to`].
    fn step(&mut self, cycles: u64) {
        let target = self.scheduler().elapsed() + cycles;
        self.advance_to(target);
    }
}
