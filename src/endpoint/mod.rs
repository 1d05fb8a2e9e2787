use super::buffer::{self, ReassemblyBuffer, Segments, WriteResult};
use super::error::{FrameError, SessionError};
use super::frame::{self, serial};
use super::frame::{
    AckType, Address, ArqMode, ControlFrame, DataFrame, Frame, Herald, LinkState,
    MessageDescriptor,
};
use super::rate::{DataRate, Interleaver};

use std::sync::Arc;

mod message_id;
mod stats;
mod tracker;
mod window;

pub use message_id::MessageIdHasher;
pub use stats::{Outcome, Stats};
pub use tracker::DeliveryTracker;
pub use window::{OutstandingBlock, TransmitWindow};

pub trait HostContext {
    // Called to send a frame to the remote station.
    fn send_frame(&mut self, frame_bytes: &[u8]);

    // Called whenever the session state changes.
    fn on_state_change(&mut self, _old: State, _new: State) {}
}

const WINDOW_CAPACITY_DEFAULT: u32 = 8;
const WINDOW_CAPACITY_MAX: u32 = 64;

const RETRY_LIMIT_DEFAULT: u32 = 5;

const ACK_EVERY_FRAMES_DEFAULT: u32 = 1;
const ACK_DELAY_DEFAULT_MS: u64 = 500;

const ACK_TIMEOUT_MIN_MS: u64 = 10;

const CHECKSUM_FAILURE_LIMIT_DEFAULT: u32 = 16;

const MESSAGE_SIZE_MAX_DEFAULT: usize = 16 * 1024 * 1024;

// Sequence numbers at or beyond this distance from the receive base are stale duplicates
const RECEIVE_HORIZON: u8 = 128;

// Upper bound on data held before the message descriptor arrives
const EARLY_DATA_SIZE_MAX: usize = 64 * 1024;

/// Configuration for an [`Endpoint`] object.
#[derive(Clone, Debug)]
pub struct Config {
    /// Nominal modem data rate. Determines the block size and the default acknowledgment
    /// timeout.
    ///
    /// Default value: 600 bps
    pub data_rate: DataRate,

    /// Time to wait for an acknowledgment before resending, in milliseconds. When unset, a
    /// timeout is derived from the data rate.
    ///
    /// Minimum value: 10 \
    /// Default value: None
    pub ack_timeout_ms: Option<u64>,

    /// Maximum number of blocks awaiting acknowledgment at once.
    ///
    /// Minimum value: 1 \
    /// Maximum value: 64 \
    /// Default value: 8
    pub window_capacity: u32,

    /// Number of times a block (or herald) may be resent before the transfer fails.
    ///
    /// Default value: 5
    pub retry_limit: u32,

    /// The receiver acknowledges after this many accepted data frames.
    ///
    /// Minimum value: 1 \
    /// Default value: 1
    pub ack_every_frames: u32,

    /// The receiver acknowledges any accepted data frame at most this long after receiving
    /// it, in milliseconds.
    ///
    /// Default value: 500
    pub ack_delay_ms: u64,

    /// Number of consecutive checksum failures tolerated before an active transfer fails.
    ///
    /// Default value: 16
    pub checksum_failure_limit: u32,

    /// Largest message that will be sent or accepted, in bytes.
    ///
    /// Maximum value: 4,294,967,295 \
    /// Default value: 16,777,216
    pub message_size_max: usize,

    /// Address of this station. Control frames addressed elsewhere are ignored.
    pub local_address: Address,

    /// Address of the peer station.
    pub remote_address: Address,

    /// Connection id carried in message descriptors.
    pub connection_id: u8,

    /// Message priority carried in message descriptors.
    pub priority: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_rate: DataRate::default(),
            ack_timeout_ms: None,
            window_capacity: WINDOW_CAPACITY_DEFAULT,
            retry_limit: RETRY_LIMIT_DEFAULT,
            ack_every_frames: ACK_EVERY_FRAMES_DEFAULT,
            ack_delay_ms: ACK_DELAY_DEFAULT_MS,
            checksum_failure_limit: CHECKSUM_FAILURE_LIMIT_DEFAULT,
            message_size_max: MESSAGE_SIZE_MAX_DEFAULT,
            local_address: Address::new(""),
            remote_address: Address::new(""),
            connection_id: 0,
            priority: 0,
        }
    }
}

impl Config {
    pub(crate) fn validate(&self) {
        if let Some(ack_timeout_ms) = self.ack_timeout_ms {
            assert!(
                ack_timeout_ms >= ACK_TIMEOUT_MIN_MS,
                "invalid endpoint configuration: ack_timeout_ms < {}",
                ACK_TIMEOUT_MIN_MS
            );
        }
        assert!(
            self.window_capacity >= 1 && self.window_capacity <= WINDOW_CAPACITY_MAX,
            "invalid endpoint configuration: window_capacity not in [1, {}]",
            WINDOW_CAPACITY_MAX
        );
        assert!(
            self.ack_every_frames >= 1,
            "invalid endpoint configuration: ack_every_frames < 1"
        );
        assert!(
            self.message_size_max <= u32::MAX as usize,
            "invalid endpoint configuration: message_size_max > {}",
            u32::MAX
        );
        for address in [&self.local_address, &self.remote_address] {
            assert!(
                address.bytes().len() <= address.wire_size(),
                "invalid endpoint configuration: address {} exceeds {} bytes",
                address,
                address.wire_size()
            );
            assert!(
                !address.bytes().contains(&frame::ADDRESS_PAD),
                "invalid endpoint configuration: address {} contains {:?}",
                address,
                frame::ADDRESS_PAD as char
            );
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Idle,
    Transmitting,
    Receiving,
    Completed,
    Failed,
}

struct TxSession {
    data_rate: DataRate,
    interleaver: Interleaver,

    segments: Segments,
    window: TransmitWindow,
    tracker: DeliveryTracker,

    descriptor: MessageDescriptor,

    herald_acked: bool,
    herald_sent_ms: u64,
    herald_retries: u32,
}

impl TxSession {
    fn next_byte(&self) -> u32 {
        let next = self.segments.next_index() as usize * self.segments.block_size();
        next.min(self.segments.total_size()) as u32
    }

    fn is_done(&self) -> bool {
        self.herald_acked && self.window.is_empty() && self.segments.is_exhausted()
    }

    fn herald_frame(&self, config: &Config) -> ControlFrame {
        ControlFrame {
            version: frame::PROTOCOL_VERSION,
            mode: ArqMode::Adaptive,
            source: config.local_address.clone(),
            destination: config.remote_address.clone(),
            link_state: LinkState::LinkUp,
            ack_type: AckType::Null,
            ack_base: 0,
            bitmap: [0; frame::BITMAP_SIZE],
            herald: Some(Herald {
                interleaver: self.interleaver,
                ..self.data_rate.herald(self.window.capacity() as u8)
            }),
            message: Some(MessageDescriptor {
                tx_next_byte: self.next_byte(),
                ..self.descriptor
            }),
        }
    }

    fn send_herald<C>(
        &mut self,
        config: &Config,
        now_ms: u64,
        stats: &mut Stats,
        ctx: &mut C,
    ) -> Result<(), SessionError>
    where
        C: HostContext,
    {
        let frame_bytes = serial::encode_control(&self.herald_frame(config))?;

        tracing::debug!(
            message_id = self.descriptor.message_id,
            total_size = self.descriptor.total_size,
            retries = self.herald_retries,
            "send herald"
        );

        ctx.send_frame(&frame_bytes);
        stats.heralds_sent += 1;

        self.herald_sent_ms = now_ms;

        Ok(())
    }

    // Sends new blocks until the window is full or the message is exhausted
    fn fill_window<C>(
        &mut self,
        now_ms: u64,
        stats: &mut Stats,
        ctx: &mut C,
    ) -> Result<(), SessionError>
    where
        C: HostContext,
    {
        while self.window.can_admit() {
            let block = match self.segments.next() {
                Some(block) => block,
                None => break,
            };

            let frame_bytes = serial::encode_data(&DataFrame {
                data_rate: self.data_rate,
                interleaver: self.interleaver,
                sequence: block.sequence,
                offset: block.offset(),
                payload: block.payload().to_vec(),
            })?;

            tracing::trace!(
                index = block.index,
                sequence = block.sequence,
                offset = block.offset(),
                size = block.data_range.len(),
                "send data frame"
            );

            ctx.send_frame(&frame_bytes);
            stats.data_frames_sent += 1;

            let admitted = self.window.try_admit(OutstandingBlock {
                index: block.index,
                sequence: block.sequence,
                data_range: block.data_range.clone(),
                frame: frame_bytes.into_boxed_slice(),
                last_sent_ms: now_ms,
                retries: 0,
            });

            debug_assert!(admitted);
        }

        Ok(())
    }

    /// Applies a cumulative base and selective bitmap from the receiver. Only blocks that are
    /// currently outstanding can be acknowledged. Returns the number of blocks newly
    /// acknowledged.
    fn acknowledge(&mut self, ack_base: u8, bitmap: &[u8; frame::BITMAP_SIZE]) -> u32 {
        let mut acked = 0;

        let span = self.window.span();
        let base = self.tracker.window_base();

        debug_assert_eq!(base, span.base_id as u8);

        // Everything before the receiver's base has been received
        let cumulative = ack_base.wrapping_sub(base) as u32;

        if cumulative <= span.size {
            for i in 0..cumulative {
                let seq = base.wrapping_add(i as u8);

                if self.tracker.mark(seq) && self.window.on_ack(seq).is_some() {
                    acked += 1;
                }
            }
        }

        let reported = DeliveryTracker::from_bitmap_bytes(ack_base, bitmap);

        for seq in reported.iter_marked() {
            if self.window.index_of(seq).is_some()
                && self.tracker.mark(seq)
                && self.window.on_ack(seq).is_some()
            {
                acked += 1;
            }
        }

        self.tracker.advance_base(self.window.base_index() as u8);

        acked
    }

    fn resend_due<C>(
        &mut self,
        now_ms: u64,
        timeout_ms: u64,
        stats: &mut Stats,
        ctx: &mut C,
    ) -> Result<(), SessionError>
    where
        C: HostContext,
    {
        for seq in self.window.due_for_retransmit(now_ms, timeout_ms) {
            stats.timeouts += 1;

            let block = self.window.mark_resent(seq, now_ms)?;

            tracing::debug!(
                index = block.index,
                sequence = block.sequence,
                retries = block.retries,
                "resend data frame"
            );

            ctx.send_frame(&block.frame);

            stats.data_frames_sent += 1;
            stats.blocks_retransmitted += 1;
        }

        Ok(())
    }
}

struct RxSession {
    // Allocated along with the descriptor
    buffer: Option<ReassemblyBuffer>,
    tracker: DeliveryTracker,

    // Learned from the first descriptor-bearing control frame
    descriptor: Option<MessageDescriptor>,
    herald: Option<Herald>,

    // Data frames that arrived before the descriptor
    early: Vec<DataFrame>,
    early_size: usize,

    unacked_frames: u32,
    ack_pending_since_ms: Option<u64>,
}

impl RxSession {
    fn new() -> Self {
        Self {
            buffer: None,
            tracker: DeliveryTracker::new(0),
            descriptor: None,
            herald: None,
            early: Vec::new(),
            early_size: 0,
            unacked_frames: 0,
            ack_pending_since_ms: None,
        }
    }

    fn contiguous_len(&self) -> usize {
        self.buffer
            .as_ref()
            .map_or(0, |buffer| buffer.contiguous_len())
    }

    fn is_complete(&self) -> bool {
        self.buffer
            .as_ref()
            .map_or(false, |buffer| buffer.is_complete())
    }

    /// Writes a data frame into the message and records its sequence number. Returns None if
    /// the message size is not yet known.
    fn accept(&mut self, frame: &DataFrame) -> Option<WriteResult> {
        let result = self
            .buffer
            .as_mut()?
            .write(frame.offset as usize, &frame.payload);

        if result != WriteResult::OutOfBounds
            && self.tracker.distance(frame.sequence) < RECEIVE_HORIZON
        {
            self.tracker.mark(frame.sequence);
            self.tracker.advance_while_marked();
        }

        Some(result)
    }

    fn ack_frame(&self, ack_type: AckType, config: &Config) -> Option<ControlFrame> {
        let descriptor = self.descriptor?;

        Some(ControlFrame {
            version: frame::PROTOCOL_VERSION,
            mode: ArqMode::Adaptive,
            source: config.local_address.clone(),
            destination: config.remote_address.clone(),
            link_state: LinkState::LinkUp,
            ack_type,
            ack_base: self.tracker.window_base(),
            bitmap: self.tracker.to_bitmap_bytes(),
            herald: None,
            message: Some(MessageDescriptor {
                tx_next_byte: 0,
                rx_next_byte: self.contiguous_len() as u32,
                ..descriptor
            }),
        })
    }
}

/// Selective-repeat ARQ engine for one transfer session.
///
/// The endpoint never reads a clock or touches I/O: frames arrive through
/// [`Endpoint::handle_frame`], time advances through [`Endpoint::update`], and every outgoing
/// frame is handed to the supplied [`HostContext`].
pub struct Endpoint {
    config: Config,
    state: State,

    data_rate: DataRate,
    ack_timeout_ms: Option<u64>,

    message_ids: MessageIdHasher,
    message_count: u32,

    tx: Option<TxSession>,
    rx: Option<RxSession>,

    // Consecutive
    checksum_failures: u32,

    failure: Option<SessionError>,
    stats: Stats,
}

impl Endpoint {
    pub fn new(config: Config) -> Self {
        config.validate();

        Self {
            data_rate: config.data_rate,
            ack_timeout_ms: config.ack_timeout_ms,
            config,
            state: State::Idle,
            message_ids: MessageIdHasher::default(),
            message_count: 0,
            tx: None,
            rx: None,
            checksum_failures: 0,
            failure: None,
            stats: Stats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Reason for the most recent failure, if the session has failed.
    pub fn failure(&self) -> Option<&SessionError> {
        self.failure.as_ref()
    }

    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    pub fn ack_timeout_ms(&self) -> u64 {
        self.ack_timeout_ms
            .unwrap_or_else(|| self.data_rate.default_ack_timeout_ms())
    }

    /// Overrides the acknowledgment timeout. Takes effect at the next update.
    pub fn set_ack_timeout(&mut self, timeout_ms: u64) {
        self.ack_timeout_ms = Some(timeout_ms.max(ACK_TIMEOUT_MIN_MS));
    }

    /// Changes the data rate. Only permitted while idle, since the block size of a session in
    /// progress is fixed.
    pub fn set_data_rate(&mut self, data_rate: DataRate) -> Result<(), SessionError> {
        if self.state != State::Idle {
            return Err(SessionError::RateLocked);
        }

        self.data_rate = data_rate;

        Ok(())
    }

    /// Message id of the current outgoing or incoming message, once known.
    pub fn message_id(&self) -> Option<u16> {
        if let Some(ref tx) = self.tx {
            Some(tx.descriptor.message_id)
        } else {
            self.rx
                .as_ref()
                .and_then(|rx| rx.descriptor)
                .map(|descriptor| descriptor.message_id)
        }
    }

    pub fn is_transfer_complete(&self) -> bool {
        self.state == State::Completed
    }

    /// The received message, once it is complete.
    pub fn received_data(&self) -> Option<&[u8]> {
        self.rx
            .as_ref()
            .and_then(|rx| rx.buffer.as_ref())
            .filter(|buffer| buffer.is_complete())
            .map(|buffer| buffer.contiguous_data())
    }

    /// Number of bytes received without gaps so far.
    pub fn received_len(&self) -> usize {
        self.rx.as_ref().map_or(0, |rx| rx.contiguous_len())
    }

    /// Discards all session state and returns to `Idle`.
    pub fn reset(&mut self) {
        if self.state != State::Idle {
            tracing::debug!(state = ?self.state, "reset");
        }

        self.state = State::Idle;
        self.tx = None;
        self.rx = None;
        self.checksum_failures = 0;
        self.failure = None;
        self.stats = Stats::default();
    }

    fn set_state<C>(&mut self, new_state: State, ctx: &mut C)
    where
        C: HostContext,
    {
        let old_state = self.state;

        if old_state != new_state {
            tracing::debug!(from = ?old_state, to = ?new_state, "state change");

            self.state = new_state;
            ctx.on_state_change(old_state, new_state);
        }
    }

    fn complete<C>(&mut self, ctx: &mut C)
    where
        C: HostContext,
    {
        self.stats.outcome = Outcome::Completed;
        self.set_state(State::Completed, ctx);
    }

    fn fail<C>(&mut self, error: SessionError, ctx: &mut C)
    where
        C: HostContext,
    {
        tracing::warn!(%error, "transfer failed");

        self.failure = Some(error);
        self.stats.outcome = Outcome::Failed;
        self.set_state(State::Failed, ctx);
    }

    fn discard(&mut self, reason: &'static str) {
        tracing::debug!(reason, state = ?self.state, "discard frame");
        self.stats.frames_discarded += 1;
    }

    /// Begins sending `payload`. Emits a herald describing the message, followed by as many
    /// data frames as the window admits.
    pub fn start_transmission<C>(
        &mut self,
        payload: &[u8],
        now_ms: u64,
        ctx: &mut C,
    ) -> Result<(), SessionError>
    where
        C: HostContext,
    {
        if self.state != State::Idle {
            return Err(SessionError::InvalidState {
                expected: State::Idle,
                actual: self.state,
            });
        }

        if payload.len() > self.config.message_size_max {
            return Err(SessionError::MessageTooLarge {
                size: payload.len(),
                max: self.config.message_size_max,
            });
        }

        let message_id =
            self.message_ids
                .compute(payload, self.config.connection_id, self.message_count);
        self.message_count = self.message_count.wrapping_add(1);

        let data: Arc<[u8]> = payload.into();
        let segments = buffer::segment(data, self.data_rate.bytes_per_block());

        tracing::debug!(
            message_id,
            size = payload.len(),
            blocks = segments.block_count(),
            data_rate = self.data_rate.bits_per_second(),
            "start transmission"
        );

        self.stats = Stats::default();
        self.checksum_failures = 0;
        self.failure = None;
        self.rx = None;

        self.tx = Some(TxSession {
            data_rate: self.data_rate,
            interleaver: self.data_rate.default_interleaver(),
            segments,
            window: TransmitWindow::new(self.config.window_capacity, self.config.retry_limit),
            tracker: DeliveryTracker::new(0),
            descriptor: MessageDescriptor {
                total_size: payload.len() as u32,
                message_id,
                connection_id: self.config.connection_id,
                priority: self.config.priority,
                tx_next_byte: 0,
                rx_next_byte: 0,
            },
            herald_acked: false,
            herald_sent_ms: now_ms,
            herald_retries: 0,
        });

        self.set_state(State::Transmitting, ctx);

        let result = match self.tx.as_mut() {
            Some(tx) => match tx.send_herald(&self.config, now_ms, &mut self.stats, ctx) {
                Ok(()) => tx.fill_window(now_ms, &mut self.stats, ctx),
                Err(error) => Err(error),
            },
            None => Ok(()),
        };

        if let Err(error) = result {
            self.fail(error.clone(), ctx);
            return Err(error);
        }

        Ok(())
    }

    /// Prepares to receive one message.
    ///
    /// Data frames carry no message id, so a delayed data frame from an earlier session that
    /// arrives before the new herald cannot be told apart from the new message, unless it was
    /// sent at a different rate or interleaver than the herald announces. Such frames are
    /// dropped when the herald arrives; the rest are accepted.
    pub fn begin_receive<C>(&mut self, ctx: &mut C) -> Result<(), SessionError>
    where
        C: HostContext,
    {
        if self.state != State::Idle {
            return Err(SessionError::InvalidState {
                expected: State::Idle,
                actual: self.state,
            });
        }

        tracing::debug!("begin receive");

        self.stats = Stats::default();
        self.checksum_failures = 0;
        self.failure = None;
        self.tx = None;
        self.rx = Some(RxSession::new());

        self.set_state(State::Receiving, ctx);

        Ok(())
    }

    /// Processes one frame received from the channel. Corrupt or unusable frames are counted
    /// and otherwise treated as lost.
    pub fn handle_frame<C>(&mut self, frame_bytes: &[u8], now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        let frame = match serial::decode(frame_bytes) {
            Ok(frame) => frame,
            Err(error @ FrameError::ChecksumMismatch { .. }) => {
                self.handle_checksum_failure(error, ctx);
                return;
            }
            Err(error) => {
                tracing::debug!(%error, size = frame_bytes.len(), "undecodable frame");
                self.stats.frames_discarded += 1;
                return;
            }
        };

        self.checksum_failures = 0;

        match frame {
            Frame::Data(frame) => self.handle_data_frame(frame, now_ms, ctx),
            Frame::Control(frame) => self.handle_control_frame(frame, now_ms, ctx),
        }
    }

    fn handle_checksum_failure<C>(&mut self, error: FrameError, ctx: &mut C)
    where
        C: HostContext,
    {
        self.stats.checksum_failures += 1;
        self.checksum_failures += 1;

        tracing::warn!(%error, consecutive = self.checksum_failures, "checksum failure");

        let active = matches!(self.state, State::Transmitting | State::Receiving);

        if active && self.checksum_failures > self.config.checksum_failure_limit {
            self.fail(
                SessionError::ChecksumTolerance {
                    failures: self.checksum_failures,
                },
                ctx,
            );
        }
    }

    fn handle_control_frame<C>(&mut self, frame: ControlFrame, now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        if frame.version != frame::PROTOCOL_VERSION {
            self.discard("unsupported version");
            return;
        }

        if frame.mode != ArqMode::Adaptive {
            self.discard("unsupported mode");
            return;
        }

        if frame.destination != self.config.local_address {
            self.discard("not addressed to this station");
            return;
        }

        match self.state {
            State::Transmitting => self.handle_ack(frame, now_ms, ctx),
            State::Receiving | State::Completed if self.rx.is_some() => {
                self.handle_herald(frame, ctx)
            }
            _ => self.discard("no session for control frame"),
        }
    }

    fn handle_ack<C>(&mut self, frame: ControlFrame, now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        let tx = match self.tx.as_mut() {
            Some(tx) => tx,
            None => return,
        };

        let message = match frame.message {
            Some(message) if message.message_id == tx.descriptor.message_id => message,
            _ => {
                self.discard("acknowledgment for another message");
                return;
            }
        };

        if !matches!(frame.ack_type, AckType::DataAck | AckType::HeraldAck) {
            self.discard("not an acknowledgment");
            return;
        }

        self.stats.acks_received += 1;

        // The descriptor echo shows the receiver has the herald
        tx.herald_acked = true;

        let acked = tx.acknowledge(frame.ack_base, &frame.bitmap);

        tracing::debug!(
            ack_base = frame.ack_base,
            acked,
            rx_next_byte = message.rx_next_byte,
            outstanding = tx.window.len(),
            "receive ack"
        );

        let result = tx.fill_window(now_ms, &mut self.stats, ctx);
        let done = tx.is_done();

        if let Err(error) = result {
            self.fail(error, ctx);
        } else if done {
            self.complete(ctx);
        }
    }

    fn handle_herald<C>(&mut self, frame: ControlFrame, ctx: &mut C)
    where
        C: HostContext,
    {
        let rx = match self.rx.as_mut() {
            Some(rx) => rx,
            None => return,
        };

        let message = match frame.message {
            Some(message) => message,
            None => {
                if frame.ack_type == AckType::DataAckRequest {
                    self.send_ack(AckType::DataAck, ctx);
                } else {
                    self.discard("control frame without descriptor");
                }
                return;
            }
        };

        let known = rx.descriptor;

        match known {
            None => {
                if message.total_size as usize > self.config.message_size_max {
                    tracing::warn!(
                        total_size = message.total_size,
                        "incoming message exceeds size limit"
                    );
                    self.discard("message too large");
                    return;
                }

                tracing::debug!(
                    message_id = message.message_id,
                    total_size = message.total_size,
                    early = rx.early.len(),
                    "receive herald"
                );

                rx.buffer = Some(ReassemblyBuffer::new(message.total_size as usize));
                rx.descriptor = Some(message);

                let early = std::mem::take(&mut rx.early);
                rx.early_size = 0;

                for early_frame in early {
                    // Data at another rate belongs to some other message
                    let same_rate = frame.herald.map_or(true, |herald| {
                        herald.data_rate == early_frame.data_rate
                            && herald.interleaver == early_frame.interleaver
                    });

                    let result = if same_rate {
                        rx.accept(&early_frame)
                    } else {
                        None
                    };

                    match result {
                        Some(WriteResult::New) => (),
                        Some(WriteResult::Duplicate) => self.stats.duplicate_frames += 1,
                        _ => {
                            tracing::debug!(
                                sequence = early_frame.sequence,
                                offset = early_frame.offset,
                                "drop early data frame"
                            );
                            self.stats.frames_discarded += 1;
                        }
                    }
                }
            }
            Some(descriptor)
                if descriptor.message_id != message.message_id
                    || descriptor.total_size != message.total_size =>
            {
                self.discard("herald for another message");
                return;
            }
            Some(_) => (),
        }

        if frame.herald.is_some() {
            rx.herald = frame.herald;
        }

        self.send_ack(AckType::HeraldAck, ctx);

        if self.state == State::Receiving && self.received_data().is_some() {
            self.complete(ctx);
        }
    }

    fn handle_data_frame<C>(&mut self, frame: DataFrame, now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        match self.state {
            State::Receiving => (),
            State::Completed if self.rx.is_some() => {
                // The sender missed the final acknowledgment
                self.stats.data_frames_received += 1;
                self.stats.duplicate_frames += 1;
                self.send_ack(AckType::DataAck, ctx);
                return;
            }
            _ => {
                self.discard("no session for data frame");
                return;
            }
        }

        let rx = match self.rx.as_mut() {
            Some(rx) => rx,
            None => return,
        };

        self.stats.data_frames_received += 1;

        tracing::trace!(
            sequence = frame.sequence,
            offset = frame.offset,
            size = frame.payload.len(),
            "receive data frame"
        );

        if rx.buffer.is_none() {
            // Held until the herald says which message this is
            if rx.early.contains(&frame) {
                self.stats.duplicate_frames += 1;
            } else if rx.early_size + frame.payload.len() > EARLY_DATA_SIZE_MAX {
                self.discard("early data buffer full");
            } else {
                rx.early_size += frame.payload.len();
                rx.early.push(frame);
            }
            return;
        }

        match rx.accept(&frame) {
            Some(WriteResult::New) => (),
            Some(WriteResult::Duplicate) => self.stats.duplicate_frames += 1,
            _ => {
                self.discard("data beyond end of message");
                return;
            }
        }

        rx.unacked_frames += 1;
        if rx.ack_pending_since_ms.is_none() {
            rx.ack_pending_since_ms = Some(now_ms);
        }

        let ack_now = rx.unacked_frames >= self.config.ack_every_frames;
        let complete = rx.is_complete();

        if complete {
            // Always acknowledge the final block
            self.send_ack(AckType::DataAck, ctx);
            self.complete(ctx);
        } else if ack_now {
            self.send_ack(AckType::DataAck, ctx);
        }
    }

    fn send_ack<C>(&mut self, ack_type: AckType, ctx: &mut C)
    where
        C: HostContext,
    {
        let rx = match self.rx.as_mut() {
            Some(rx) => rx,
            None => return,
        };

        // Acknowledgments identify the message, so they wait for its descriptor
        let frame = match rx.ack_frame(ack_type, &self.config) {
            Some(frame) => frame,
            None => return,
        };

        rx.unacked_frames = 0;
        rx.ack_pending_since_ms = None;

        match serial::encode_control(&frame) {
            Ok(frame_bytes) => {
                tracing::trace!(
                    ?ack_type,
                    ack_base = frame.ack_base,
                    received = self.stats.data_frames_received,
                    "send ack"
                );

                ctx.send_frame(&frame_bytes);
                self.stats.acks_sent += 1;
            }
            Err(error) => self.fail(error.into(), ctx),
        }
    }

    /// Advances time: resends unacknowledged blocks and heralds whose timeout has expired, and
    /// flushes delayed acknowledgments.
    pub fn update<C>(&mut self, now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        match self.state {
            State::Transmitting => self.update_transmit(now_ms, ctx),
            State::Receiving => {
                let ack_due = self
                    .rx
                    .as_ref()
                    .and_then(|rx| rx.ack_pending_since_ms)
                    .map_or(false, |since_ms| {
                        now_ms.saturating_sub(since_ms) >= self.config.ack_delay_ms
                    });

                if ack_due {
                    self.send_ack(AckType::DataAck, ctx);
                }
            }
            _ => (),
        }
    }

    fn update_transmit<C>(&mut self, now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        let timeout_ms = self.ack_timeout_ms();
        let retry_limit = self.config.retry_limit;

        let tx = match self.tx.as_mut() {
            Some(tx) => tx,
            None => return,
        };

        let mut result = tx.resend_due(now_ms, timeout_ms, &mut self.stats, ctx);

        if result.is_ok()
            && !tx.herald_acked
            && now_ms.saturating_sub(tx.herald_sent_ms) >= timeout_ms
        {
            self.stats.timeouts += 1;

            if tx.herald_retries >= retry_limit {
                result = Err(SessionError::HeraldUnacknowledged {
                    retries: tx.herald_retries,
                });
            } else {
                tx.herald_retries += 1;
                result = tx.send_herald(&self.config, now_ms, &mut self.stats, ctx);
            }
        }

        if let Err(error) = result {
            self.fail(error, ctx);
        }
    }
}
