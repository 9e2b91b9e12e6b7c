//! Countdown timers driven by the periodic tick.
//!
//! A timer never reads a clock: the caller advances it with the elapsed time
//! of one cycle. Expiry is reported exactly once, the timer is stopped before
//! the report so that the expiry handler may re-arm it.
use embassy_time::Duration;

/// The five timers owned by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// NM-Timeout: no NM PDU sent or received for too long.
    Timeout,
    /// Next NM PDU transmission.
    MessageCycle,
    /// End of the repeat message phase.
    RepeatMessage,
    /// End of the prepare bus sleep phase.
    WaitBusSleep,
    /// Remote nodes silent long enough to be considered ready to sleep.
    RemoteSleepInd,
}

impl TimerKind {
    /// Dispatch order used when several timers expire in the same cycle.
    pub const ALL: [TimerKind; 5] = [
        TimerKind::Timeout,
        TimerKind::MessageCycle,
        TimerKind::RepeatMessage,
        TimerKind::WaitBusSleep,
        TimerKind::RemoteSleepInd,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerState {
    Stopped,
    Started,
}

//==================================================================================NM_TIMER
/// Single countdown timer.
#[derive(Debug, Clone, Copy)]
pub struct NmTimer {
    kind: TimerKind,
    state: TimerState,
    remaining: Duration,
}

impl NmTimer {
    /// Create a stopped timer with no time left.
    pub const fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            state: TimerState::Stopped,
            remaining: Duration::from_ticks(0),
        }
    }

    pub const fn kind(&self) -> TimerKind {
        self.kind
    }

    pub const fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Started
    }

    /// Time left before expiry.
    pub const fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Arm the timer with `duration`.
    pub fn start(&mut self, duration: Duration) {
        self.remaining = duration;
        self.state = TimerState::Started;
    }

    /// Restart counting from the remaining time.
    pub fn resume(&mut self) {
        self.state = TimerState::Started;
    }

    /// Freeze the timer, keeping the remaining time.
    pub fn stop(&mut self) {
        self.state = TimerState::Stopped;
    }

    /// Stop the timer and load `duration`.
    pub fn reset(&mut self, duration: Duration) {
        self.remaining = duration;
        self.state = TimerState::Stopped;
    }

    /// Advance the timer by `elapsed`.
    ///
    /// Returns the timer kind when it expires during this call.
    pub fn tick(&mut self, elapsed: Duration) -> Option<TimerKind> {
        if self.state != TimerState::Started {
            return None;
        }
        if elapsed >= self.remaining {
            self.remaining = Duration::from_ticks(0);
            self.state = TimerState::Stopped;
            Some(self.kind)
        } else {
            self.remaining = Duration::from_ticks(self.remaining.as_ticks() - elapsed.as_ticks());
            None
        }
    }
}

//==================================================================================CHANNEL_TIMERS
/// The timer set of one channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelTimers {
    timers: [NmTimer; 5],
}

impl Default for ChannelTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTimers {
    pub const fn new() -> Self {
        Self {
            timers: [
                NmTimer::new(TimerKind::Timeout),
                NmTimer::new(TimerKind::MessageCycle),
                NmTimer::new(TimerKind::RepeatMessage),
                NmTimer::new(TimerKind::WaitBusSleep),
                NmTimer::new(TimerKind::RemoteSleepInd),
            ],
        }
    }

    pub fn get(&self, kind: TimerKind) -> &NmTimer {
        &self.timers[Self::slot(kind)]
    }

    pub fn get_mut(&mut self, kind: TimerKind) -> &mut NmTimer {
        &mut self.timers[Self::slot(kind)]
    }

    /// Stop every timer and clear its remaining time.
    pub fn reset_all(&mut self) {
        for timer in self.timers.iter_mut() {
            timer.reset(Duration::from_ticks(0));
        }
    }

    /// Advance every timer by `elapsed` and collect the expired ones, in dispatch order.
    pub fn tick_all(&mut self, elapsed: Duration) -> ExpiredTimers {
        let mut expired = ExpiredTimers::default();
        for timer in self.timers.iter_mut() {
            if let Some(kind) = timer.tick(elapsed) {
                expired.push(kind);
            }
        }
        expired
    }

    const fn slot(kind: TimerKind) -> usize {
        match kind {
            TimerKind::Timeout => 0,
            TimerKind::MessageCycle => 1,
            TimerKind::RepeatMessage => 2,
            TimerKind::WaitBusSleep => 3,
            TimerKind::RemoteSleepInd => 4,
        }
    }
}

/// Timers that expired during one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiredTimers {
    kinds: [Option<TimerKind>; 5],
    len: usize,
}

impl ExpiredTimers {
    fn push(&mut self, kind: TimerKind) {
        if self.len < self.kinds.len() {
            self.kinds[self.len] = Some(kind);
            self.len += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = TimerKind> + '_ {
        self.kinds[..self.len].iter().flatten().copied()
    }
}
