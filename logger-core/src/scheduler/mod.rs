//! Cooperative scheduler and inhibition arbiter.
//!
//! Behaviors run to completion on a single thread. Each pass visits them in
//! registration order, runs the ones whose interval has elapsed, and swaps in
//! [`Behavior::inhibited`] for any behavior another behavior asked to
//! suppress. Wishes are collected after the pass and only take effect on the
//! next one, so the mask a pass uses is always a finished value.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use heapless::{Deque, Vec};

use crate::telemetry::{DeviceEvent, Journal};
use crate::time::Millis;

/// Upper bound on behaviors a scheduler can own.
pub const MAX_TASKS: usize = 8;

/// Depth of the lateral message outbox drained after every dispatch.
pub const OUTBOX_DEPTH: usize = 8;

/// Unique power-of-two identity of a behavior.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(u16);

impl TaskId {
    /// Builds an identity from a raw bit, rejecting anything that is not a
    /// single set bit.
    #[must_use]
    pub const fn new(bit: u16) -> Option<Self> {
        if bit.is_power_of_two() {
            Some(Self(bit))
        } else {
            None
        }
    }

    /// Builds the identity `1 << index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` does not fit in the mask width; only used for
    /// compile-time constants.
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        assert!(index < u16::BITS, "task index out of range");
        Self(1 << index)
    }

    /// Returns the identity bit.
    #[must_use]
    pub const fn bit(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Set of behavior identities.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct InhibitMask(u16);

impl InhibitMask {
    /// Mask that suppresses nothing.
    pub const EMPTY: Self = Self(0);

    /// Wraps raw identity bits.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Mask naming a single behavior.
    #[must_use]
    pub const fn of(id: TaskId) -> Self {
        Self(id.bit())
    }

    /// Returns the raw identity bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns `true` when `id` is part of the mask.
    #[must_use]
    pub const fn contains(self, id: TaskId) -> bool {
        self.0 & id.bit() != 0
    }

    /// Returns the mask with `id` added.
    #[must_use]
    pub const fn with(self, id: TaskId) -> Self {
        Self(self.0 | id.bit())
    }

    /// Returns the mask with `id` removed.
    #[must_use]
    pub const fn without(self, id: TaskId) -> Self {
        Self(self.0 & !id.bit())
    }

    /// Returns `true` when no identity is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for InhibitMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for InhibitMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for InhibitMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Bounded queue of lateral messages posted by the running behavior.
pub struct Outbox<M> {
    queue: Deque<M, OUTBOX_DEPTH>,
    dropped: u32,
}

impl<M> Outbox<M> {
    /// Creates an empty outbox.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
            dropped: 0,
        }
    }

    /// Queues a message for delivery once the current dispatch returns.
    ///
    /// Returns the message back when the outbox is full.
    pub fn post(&mut self, message: M) -> Result<(), M> {
        self.queue.push_back(message).inspect_err(|_| {
            self.dropped = self.dropped.saturating_add(1);
        })
    }

    /// Number of messages rejected because the outbox was full.
    pub const fn dropped(&self) -> u32 {
        self.dropped
    }

    fn take(&mut self) -> Option<M> {
        self.queue.pop_front()
    }
}

impl<M> Default for Outbox<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-dispatch view handed to a behavior.
pub struct TaskContext<'a, M> {
    now: Millis,
    outbox: &'a mut Outbox<M>,
    journal: &'a mut Journal,
}

impl<'a, M> TaskContext<'a, M> {
    /// Builds a context; the scheduler does this for every dispatch.
    pub fn new(now: Millis, outbox: &'a mut Outbox<M>, journal: &'a mut Journal) -> Self {
        Self {
            now,
            outbox,
            journal,
        }
    }

    /// Timestamp of the current pass.
    pub const fn now(&self) -> Millis {
        self.now
    }

    /// Posts a lateral message, journaling an overflow instead of blocking.
    pub fn post(&mut self, message: M) {
        if self.outbox.post(message).is_err() {
            self.journal.record(DeviceEvent::OutboxOverflow, self.now);
        }
    }

    /// Appends an event to the journal at the current timestamp.
    pub fn record(&mut self, event: DeviceEvent) {
        self.journal.record(event, self.now);
    }

    /// Mutable access to the journal.
    pub fn journal(&mut self) -> &mut Journal {
        self.journal
    }
}

/// Capability interface shared by every cooperatively scheduled behavior.
pub trait Behavior<M> {
    /// Unique identity bit.
    fn id(&self) -> TaskId;

    /// Short label used in diagnostics.
    fn name(&self) -> &'static str;

    /// Minimum milliseconds between dispatches; `0` means every pass.
    fn run_interval_ms(&self) -> u32;

    /// Performs one slice of work.
    fn run(&mut self, ctx: &mut TaskContext<'_, M>);

    /// Called instead of [`run`](Self::run) while another behavior suppresses
    /// this one. Implementations quiesce the outputs they own.
    fn inhibited(&mut self, _ctx: &mut TaskContext<'_, M>) {}

    /// Identities this behavior wants suppressed on the next pass.
    fn inhibit_mask(&self) -> InhibitMask {
        InhibitMask::EMPTY
    }

    /// Called once when the clock is observed to have wrapped.
    fn clock_wrapped(&mut self, _now: Millis) {}
}

/// Owning container of the behaviors a scheduler drives.
pub trait TaskSet {
    /// Lateral message type exchanged between behaviors.
    type Message;

    /// Number of behaviors, fixed for the container's lifetime.
    fn len(&self) -> usize;

    /// Returns `true` when the container holds no behaviors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the behavior at `index`.
    fn task(&self, index: usize) -> Option<&dyn Behavior<Self::Message>>;

    /// Mutably borrows the behavior at `index`.
    fn task_mut(&mut self, index: usize) -> Option<&mut dyn Behavior<Self::Message>>;

    /// Hands a message posted during a dispatch to its recipient.
    fn deliver(&mut self, message: Self::Message, now: Millis, journal: &mut Journal);
}

/// Reasons a task set cannot be scheduled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedulerError {
    /// More behaviors than the scheduler has slots for.
    TooManyTasks { count: usize, capacity: usize },
    /// Two behaviors share an identity bit.
    DuplicateId(TaskId),
    /// The container reported a length it could not back with a behavior.
    MissingTask(usize),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::TooManyTasks { count, capacity } => {
                write!(f, "{count} tasks exceed scheduler capacity {capacity}")
            }
            SchedulerError::DuplicateId(id) => write!(f, "duplicate task id {id}"),
            SchedulerError::MissingTask(index) => write!(f, "no task at index {index}"),
        }
    }
}

/// Scheduler bookkeeping for one behavior.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskSlot {
    pub id: TaskId,
    pub last_invoked: Option<Millis>,
    pub inhibited: bool,
}

/// Summary of a single scheduling pass.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PassReport {
    pub ran: u8,
    pub inhibited: u8,
    pub skipped: u8,
    pub delivered: u8,
    pub wrapped: bool,
}

/// Cooperative scheduler over a [`TaskSet`].
pub struct Scheduler<M, const N: usize = MAX_TASKS> {
    slots: Vec<TaskSlot, N>,
    mask: InhibitMask,
    outbox: Outbox<M>,
    last_pass: Option<Millis>,
    wraps: u32,
    self_inhibitions: u32,
}

impl<M, const N: usize> Scheduler<M, N> {
    /// Builds the scheduler for `tasks`, validating identities.
    pub fn new<S>(tasks: &S) -> Result<Self, SchedulerError>
    where
        S: TaskSet<Message = M>,
    {
        let count = tasks.len();
        if count > N {
            return Err(SchedulerError::TooManyTasks { count, capacity: N });
        }

        let mut slots = Vec::new();
        let mut seen = InhibitMask::EMPTY;
        for index in 0..count {
            let task = tasks.task(index).ok_or(SchedulerError::MissingTask(index))?;
            let id = task.id();
            if seen.contains(id) {
                return Err(SchedulerError::DuplicateId(id));
            }
            seen = seen.with(id);
            slots
                .push(TaskSlot {
                    id,
                    last_invoked: None,
                    inhibited: false,
                })
                .map_err(|_| SchedulerError::TooManyTasks { count, capacity: N })?;
        }

        Ok(Self {
            slots,
            mask: InhibitMask::EMPTY,
            outbox: Outbox::new(),
            last_pass: None,
            wraps: 0,
            self_inhibitions: 0,
        })
    }

    /// Runs one scheduling pass at `now`.
    pub fn pass<S>(&mut self, tasks: &mut S, now: Millis, journal: &mut Journal) -> PassReport
    where
        S: TaskSet<Message = M>,
    {
        let mut report = PassReport::default();

        if let Some(previous) = self.last_pass
            && now < previous
        {
            self.wraps = self.wraps.saturating_add(1);
            report.wrapped = true;
            journal.record(DeviceEvent::ClockWrapped, now);
            for index in 0..self.slots.len() {
                if let Some(task) = tasks.task_mut(index) {
                    task.clock_wrapped(now);
                }
            }
        }
        self.last_pass = Some(now);

        let active = self.mask;
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            let Some(task) = tasks.task_mut(index) else {
                continue;
            };

            slot.inhibited = active.contains(slot.id);
            let eligible = slot
                .last_invoked
                .is_none_or(|last| now.has_elapsed(last, task.run_interval_ms()));
            if !eligible {
                report.skipped = report.skipped.saturating_add(1);
                continue;
            }

            let mut ctx = TaskContext::new(now, &mut self.outbox, journal);
            if slot.inhibited {
                task.inhibited(&mut ctx);
                report.inhibited = report.inhibited.saturating_add(1);
            } else {
                task.run(&mut ctx);
                report.ran = report.ran.saturating_add(1);
            }
            slot.last_invoked = Some(now);

            while let Some(message) = self.outbox.take() {
                tasks.deliver(message, now, journal);
                report.delivered = report.delivered.saturating_add(1);
            }
        }

        let next = self.collect_wishes(tasks, now, journal);
        if next != self.mask {
            journal.record(DeviceEvent::InhibitionChanged(next), now);
        }
        self.mask = next;

        report
    }

    fn collect_wishes<S>(&mut self, tasks: &S, now: Millis, journal: &mut Journal) -> InhibitMask
    where
        S: TaskSet<Message = M>,
    {
        let mut next = InhibitMask::EMPTY;
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(task) = tasks.task(index) else {
                continue;
            };
            let wish = task.inhibit_mask();
            if wish.contains(slot.id) {
                self.self_inhibitions = self.self_inhibitions.saturating_add(1);
                journal.record(DeviceEvent::SelfInhibitionIgnored(slot.id), now);
            }
            next |= wish.without(slot.id);
        }
        next
    }

    /// Mask that the next pass will apply.
    pub const fn pending_mask(&self) -> InhibitMask {
        self.mask
    }

    /// Scheduler bookkeeping, in registration order.
    pub fn slots(&self) -> &[TaskSlot] {
        &self.slots
    }

    /// Returns `true` when the behavior was inhibited during the latest pass.
    pub fn is_inhibited(&self, id: TaskId) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.id == id && slot.inhibited)
    }

    /// Number of clock wraps observed.
    pub const fn wraps(&self) -> u32 {
        self.wraps
    }

    /// Number of self-inhibition wishes that were stripped.
    pub const fn self_inhibitions(&self) -> u32 {
        self.self_inhibitions
    }

    /// Number of lateral messages lost to a full outbox.
    pub const fn dropped_messages(&self) -> u32 {
        self.outbox.dropped()
    }
}
