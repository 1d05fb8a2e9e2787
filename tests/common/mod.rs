#![allow(dead_code)]

use std::collections::VecDeque;

use hfarq::endpoint::{Config, Endpoint, HostContext, State};
use hfarq::frame::Address;
use hfarq::DataRate;

pub const TICK_MS: u64 = 100;
pub const ACK_TIMEOUT_MS: u64 = 1_000;

/// Records frames handed to it by an endpoint.
#[derive(Default)]
pub struct Recorder {
    pub frames: Vec<Vec<u8>>,
    pub state_changes: Vec<(State, State)>,
}

impl HostContext for Recorder {
    fn send_frame(&mut self, frame_bytes: &[u8]) {
        self.frames.push(frame_bytes.to_vec());
    }

    fn on_state_change(&mut self, old: State, new: State) {
        self.state_changes.push((old, new));
    }
}

/// Deterministic channel impairments.
#[derive(Clone, Copy, Debug)]
pub enum Impairment {
    None,
    /// Drops frames n, 2n, 3n, ...
    DropEvery(usize),
    DropAll,
    /// Flips one bit in frames n, 2n, 3n, ...
    CorruptEvery(usize),
    /// Swaps each pair of consecutive frames.
    Reorder,
    /// Delivers every frame twice.
    Duplicate,
}

/// One direction of a simulated radio channel.
pub struct Channel {
    impairment: Impairment,
    count: usize,
    held: Option<Vec<u8>>,
    queue: VecDeque<Vec<u8>>,
    pub dropped: usize,
}

impl Channel {
    pub fn new(impairment: Impairment) -> Self {
        Self {
            impairment,
            count: 0,
            held: None,
            queue: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, mut frame: Vec<u8>) {
        self.count += 1;

        match self.impairment {
            Impairment::None => self.queue.push_back(frame),
            Impairment::DropEvery(n) => {
                if self.count % n == 0 {
                    self.dropped += 1;
                } else {
                    self.queue.push_back(frame);
                }
            }
            Impairment::DropAll => self.dropped += 1,
            Impairment::CorruptEvery(n) => {
                if self.count % n == 0 {
                    let bit = self.count % (frame.len() * 8);
                    frame[bit / 8] ^= 1 << (bit % 8);
                }
                self.queue.push_back(frame);
            }
            Impairment::Reorder => match self.held.take() {
                Some(held) => {
                    self.queue.push_back(frame);
                    self.queue.push_back(held);
                }
                None => self.held = Some(frame),
            },
            Impairment::Duplicate => {
                self.queue.push_back(frame.clone());
                self.queue.push_back(frame);
            }
        }
    }

    /// Takes every frame ready for delivery. A frame held back for reordering is released
    /// only if nothing else is ready, so the channel never stalls.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        if self.queue.is_empty() {
            if let Some(held) = self.held.take() {
                self.queue.push_back(held);
            }
        }

        self.queue.drain(..).collect()
    }
}

pub fn config(local: &str, remote: &str) -> Config {
    Config {
        data_rate: DataRate::Bps75,
        ack_timeout_ms: Some(ACK_TIMEOUT_MS),
        local_address: Address::new(local),
        remote_address: Address::new(remote),
        ..Default::default()
    }
}

pub fn random_payload(size: usize) -> Vec<u8> {
    (0..size).map(|_| rand::random::<u8>()).collect()
}

/// A sender and a receiver joined by two simulated channels, driven in simulated time.
pub struct Link {
    pub sender: Endpoint,
    pub receiver: Endpoint,
    pub sender_ctx: Recorder,
    pub receiver_ctx: Recorder,
    pub forward: Channel,
    pub reverse: Channel,
    pub now_ms: u64,
}

impl Link {
    pub fn new(forward: Impairment, reverse: Impairment) -> Self {
        Self::with_config(config("TX", "RX"), config("RX", "TX"), forward, reverse)
    }

    pub fn with_config(
        sender_config: Config,
        receiver_config: Config,
        forward: Impairment,
        reverse: Impairment,
    ) -> Self {
        Self {
            sender: Endpoint::new(sender_config),
            receiver: Endpoint::new(receiver_config),
            sender_ctx: Recorder::default(),
            receiver_ctx: Recorder::default(),
            forward: Channel::new(forward),
            reverse: Channel::new(reverse),
            now_ms: 0,
        }
    }

    pub fn start(&mut self, payload: &[u8]) {
        self.receiver.begin_receive(&mut self.receiver_ctx).unwrap();
        self.sender
            .start_transmission(payload, self.now_ms, &mut self.sender_ctx)
            .unwrap();
    }

    fn is_finished(&self) -> bool {
        let terminal = |state| matches!(state, State::Completed | State::Failed);

        match self.sender.state() {
            State::Failed => true,
            state => terminal(state) && terminal(self.receiver.state()),
        }
    }

    /// Moves queued frames across the channels, then advances time by one tick.
    pub fn step(&mut self) {
        for frame in self.sender_ctx.frames.drain(..) {
            self.forward.push(frame);
        }
        for frame in self.receiver_ctx.frames.drain(..) {
            self.reverse.push(frame);
        }

        for frame in self.forward.drain() {
            self.receiver
                .handle_frame(&frame, self.now_ms, &mut self.receiver_ctx);
        }
        for frame in self.reverse.drain() {
            self.sender
                .handle_frame(&frame, self.now_ms, &mut self.sender_ctx);
        }

        self.now_ms += TICK_MS;

        self.sender.update(self.now_ms, &mut self.sender_ctx);
        self.receiver.update(self.now_ms, &mut self.receiver_ctx);
    }

    /// Steps until both sides reach a terminal state (or the sender fails), for at most
    /// `limit_ms` of simulated time. Returns whether the link finished.
    pub fn run(&mut self, limit_ms: u64) -> bool {
        while self.now_ms < limit_ms {
            if self.is_finished() {
                return true;
            }

            self.step();
        }

        self.is_finished()
    }
}
