//! Process state machine.

use lamport_core::{Action, Event, SendTarget, StateMachine, TickEvent, TickRecord};
use lamport_messages::WireMessage;
use lamport_types::{ClockSpeed, LogicalClock, Rank, Topology};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

/// Inclusive upper bound of the per-tick random draw.
const DRAW_MAX: u32 = 10;

/// Clock engine for a single process.
///
/// Owns the logical clock, the inbound queue and the process's random number
/// generator. Nothing else touches them, so there is no locking: the runner
/// drives the machine from a single loop.
///
/// Each [`Event::Tick`] is exactly one clock event. If messages are queued the
/// oldest one is consumed; otherwise a number is drawn from `[1, 10]` and the
/// process sends to one peer (1), the other peer (2), every peer (3), or does
/// an internal event (4..=10).
pub struct ProcessStateMachine {
    /// Local rank and world layout.
    topology: Topology,

    /// Peers in ascending rank order, cached from the topology.
    peers: Vec<Rank>,

    /// Lamport clock.
    clock: LogicalClock,

    /// Messages drained from peer channels but not yet consumed.
    /// Arrival order, never reordered or dropped.
    inbound: VecDeque<WireMessage>,

    /// Random source for this process only, seeded once.
    rng: ChaCha8Rng,

    /// Ticks per second, fixed for the process lifetime.
    clock_speed: ClockSpeed,

    /// Time of the current tick, set by the runner.
    now: Duration,
}

impl ProcessStateMachine {
    /// Create a new engine, drawing its clock speed from the seeded generator.
    pub fn new(topology: Topology, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let clock_speed = ClockSpeed::random(&mut rng);
        Self::from_parts(topology, clock_speed, rng)
    }

    /// Create a new engine with a fixed clock speed.
    pub fn with_clock_speed(topology: Topology, clock_speed: ClockSpeed, seed: u64) -> Self {
        Self::from_parts(topology, clock_speed, ChaCha8Rng::seed_from_u64(seed))
    }

    fn from_parts(topology: Topology, clock_speed: ClockSpeed, rng: ChaCha8Rng) -> Self {
        Self {
            peers: topology.peers(),
            topology,
            clock: LogicalClock::ZERO,
            inbound: VecDeque::new(),
            rng,
            clock_speed,
            now: Duration::ZERO,
        }
    }

    /// Get the local rank.
    pub fn rank(&self) -> Rank {
        self.topology.local_rank()
    }

    /// Get the topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Peers in ascending rank order.
    pub fn peers(&self) -> &[Rank] {
        &self.peers
    }

    /// Current logical clock.
    pub fn clock(&self) -> LogicalClock {
        self.clock
    }

    /// Clock speed chosen at construction.
    pub fn clock_speed(&self) -> ClockSpeed {
        self.clock_speed
    }

    /// Time between two ticks.
    pub fn tick_period(&self) -> Duration {
        self.clock_speed.tick_period()
    }

    /// Number of messages waiting in the inbound queue.
    pub fn queue_len(&self) -> usize {
        self.inbound.len()
    }

    fn enqueue(&mut self, message: WireMessage) -> Vec<Action> {
        trace!(
            rank = %self.rank(),
            from = %message.sender,
            timestamp = message.timestamp,
            "Queued inbound message"
        );
        self.inbound.push_back(message);
        vec![]
    }

    fn on_tick(&mut self) -> Vec<Action> {
        let start = self.clock;

        if let Some(message) = self.inbound.pop_front() {
            self.clock.observe(message.timestamp);
            let event = TickEvent::Received {
                timestamp: message.timestamp,
                from: message.sender,
                queue_len: self.inbound.len(),
            };
            return vec![Action::Record(self.record(start, event))];
        }

        let draw = self.rng.gen_range(1..=DRAW_MAX);
        self.act_on_draw(draw)
    }

    /// Carry out the random branch for `draw`. The clock moves exactly once.
    fn act_on_draw(&mut self, draw: u32) -> Vec<Action> {
        let start = self.clock;
        let mut actions = Vec::with_capacity(2);

        let event = match SendTarget::from_draw(draw) {
            Some(target) => {
                let to = target.resolve(&self.peers);
                let event = match target {
                    SendTarget::First => TickEvent::SentToOne,
                    SendTarget::Second => TickEvent::SentToOther,
                    SendTarget::All => TickEvent::SentToAll {
                        recipients: to.len(),
                    },
                };
                // Stamped before the post-send increment.
                let message = WireMessage::new(self.rank(), self.clock);
                actions.push(Action::Send { to, message });
                event
            }
            None => TickEvent::Internal,
        };

        self.clock.tick();
        actions.push(Action::Record(self.record(start, event)));
        actions
    }

    fn record(&self, start: LogicalClock, event: TickEvent) -> TickRecord {
        let record = TickRecord {
            wall_clock_ms: u64::try_from(self.now.as_millis()).unwrap_or(u64::MAX),
            logical_clock: start,
            rank: self.rank(),
            event,
        };
        debug!(
            rank = %record.rank,
            clock = %self.clock,
            event = %record.event,
            "Tick"
        );
        record
    }
}

impl StateMachine for ProcessStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::MessageReceived(message) => self.enqueue(message),
            Event::Tick => self.on_tick(),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

impl std::fmt::Debug for ProcessStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessStateMachine")
            .field("rank", &self.rank())
            .field("clock", &self.clock)
            .field("clock_speed", &self.clock_speed)
            .field("queue_len", &self.inbound.len())
            .finish()
    }
}
