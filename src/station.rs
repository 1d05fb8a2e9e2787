use std::collections::VecDeque;
use std::net;
use std::time;

use super::endpoint;
use super::error::SessionError;
use super::frame;
use super::socket;

const FRAME_SIZE_MAX: usize = 2048;

const TICK_DEFAULT_MS: u64 = 50;
const TICK_MIN_MS: u64 = 1;

/// Configuration for a [`Station`] object.
#[derive(Clone, Debug)]
pub struct Config {
    /// Configuration of the underlying engine.
    pub endpoint: endpoint::Config,

    /// Interval at which the engine is given the opportunity to resend and flush
    /// acknowledgments, in milliseconds.
    ///
    /// Minimum value: 1 \
    /// Default value: 50
    pub tick_ms: u64,

    /// Fraction of outgoing frames dropped on purpose, to simulate a fading channel.
    ///
    /// Minimum value: 0.0 \
    /// Maximum value: 1.0 \
    /// Default value: 0.0
    pub frame_loss: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Default::default(),
            tick_ms: TICK_DEFAULT_MS,
            frame_loss: 0.0,
        }
    }
}

impl Config {
    fn validate(&self) {
        assert!(
            self.tick_ms >= TICK_MIN_MS,
            "invalid station configuration: tick_ms < {}",
            TICK_MIN_MS
        );
        assert!(
            (0.0..=1.0).contains(&self.frame_loss),
            "invalid station configuration: frame_loss not in [0, 1]"
        );

        self.endpoint.validate();
    }
}

/// Represents a station event.
#[derive(Debug)]
pub enum Event {
    /// Produced whenever the engine changes state.
    StateChange(endpoint::State, endpoint::State),
    /// Produced when an outgoing message has been fully acknowledged.
    Sent,
    /// Produced when an incoming message is complete.
    Receive(Box<[u8]>),
    /// Produced when the transfer fails.
    Error(SessionError),
}

struct EndpointContext<'a> {
    station: &'a mut StationCore,
}

struct StationCore {
    // Saved configuration
    config: Config,
    // Timestamps are computed relative to this instant
    time_ref: time::Instant,
    // Socket send handle
    socket_tx: socket::FrameSocketTx,
    // Time of the next engine update
    next_tick_ms: u64,
    // Queue of events
    events: VecDeque<Event>,
    // Frames deliberately dropped
    frames_dropped: u64,
}

/// A single station driving one ARQ engine over a UDP socket.
pub struct Station {
    // Interesting station data
    core: StationCore,
    // The engine itself
    endpoint: endpoint::Endpoint,
    // Socket receive handle
    socket_rx: socket::FrameSocketRx,
}

impl<'a> EndpointContext<'a> {
    fn new(station: &'a mut StationCore) -> Self {
        Self { station }
    }
}

impl<'a> endpoint::HostContext for EndpointContext<'a> {
    fn send_frame(&mut self, frame_bytes: &[u8]) {
        let frame_loss = self.station.config.frame_loss;

        if frame_loss > 0.0 && rand::random::<f64>() < frame_loss {
            tracing::trace!(size = frame_bytes.len(), "simulated frame loss");
            self.station.frames_dropped += 1;
            return;
        }

        self.station.socket_tx.send(frame_bytes);
    }

    fn on_state_change(&mut self, old: endpoint::State, new: endpoint::State) {
        self.station.events.push_back(Event::StateChange(old, new));
    }
}

impl StationCore {
    /// Returns the number of whole milliseconds elapsed since the station object was created.
    fn time_now_ms(&self) -> u64 {
        (time::Instant::now() - self.time_ref).as_millis() as u64
    }

    /// Returns the time remaining until the next engine update.
    fn next_tick_timeout(&self) -> time::Duration {
        let now_ms = self.time_now_ms();
        time::Duration::from_millis(self.next_tick_ms.saturating_sub(now_ms))
    }

    /// Produces the terminal event for a session, if the engine has just reached one.
    fn check_outcome(&mut self, endpoint: &endpoint::Endpoint, old_state: endpoint::State) {
        let new_state = endpoint.state();

        if new_state == old_state {
            return;
        }

        match new_state {
            endpoint::State::Completed => {
                if let Some(data) = endpoint.received_data() {
                    self.events.push_back(Event::Receive(data.into()));
                } else {
                    self.events.push_back(Event::Sent);
                }

                tracing::info!(stats = %endpoint.stats(), "transfer complete");
            }
            endpoint::State::Failed => {
                if let Some(error) = endpoint.failure() {
                    self.events.push_back(Event::Error(error.clone()));
                }

                tracing::info!(stats = %endpoint.stats(), "transfer failed");
            }
            _ => (),
        }
    }

    fn process_tick(&mut self, endpoint: &mut endpoint::Endpoint) {
        let now_ms = self.time_now_ms();

        if now_ms >= self.next_tick_ms {
            self.next_tick_ms = now_ms + self.config.tick_ms;

            let old_state = endpoint.state();

            endpoint.update(now_ms, &mut EndpointContext::new(self));

            self.check_outcome(endpoint, old_state);
        }
    }

    fn handle_frame(&mut self, endpoint: &mut endpoint::Endpoint, frame_bytes: &[u8]) {
        let now_ms = self.time_now_ms();
        let old_state = endpoint.state();

        endpoint.handle_frame(frame_bytes, now_ms, &mut EndpointContext::new(self));

        self.check_outcome(endpoint, old_state);
    }

    /// Reads and processes as many frames as possible from socket_rx without blocking.
    fn handle_frames(
        &mut self,
        endpoint: &mut endpoint::Endpoint,
        socket_rx: &mut socket::FrameSocketRx,
    ) {
        loop {
            match socket_rx.try_read_frame() {
                Ok(Some(frame_bytes)) => self.handle_frame(endpoint, frame_bytes),
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(%err, "socket receive failed");
                    break;
                }
            }
        }
    }

    /// Reads and processes as many frames as possible from socket_rx, waiting up to
    /// `wait_timeout` for the first.
    fn handle_frames_wait(
        &mut self,
        endpoint: &mut endpoint::Endpoint,
        socket_rx: &mut socket::FrameSocketRx,
        wait_timeout: time::Duration,
    ) {
        match socket_rx.wait_for_frame(Some(wait_timeout)) {
            Ok(Some(frame_bytes)) => {
                self.handle_frame(endpoint, frame_bytes);
                // Process any further frames without blocking
                self.handle_frames(endpoint, socket_rx);
            }
            Ok(None) => (),
            Err(err) => tracing::warn!(%err, "socket wait failed"),
        }
    }
}

impl Station {
    /// Equivalent to calling [`Station::bind_with_config`] with default configuration.
    pub fn bind<A, B>(bind_addr: A, peer_addr: B) -> std::io::Result<Self>
    where
        A: net::ToSocketAddrs,
        B: net::ToSocketAddrs,
    {
        Self::bind_with_config(bind_addr, peer_addr, Default::default())
    }

    /// Binds a UDP socket to `bind_addr`, directs it at the peer station at `peer_addr`, and
    /// returns a new idle station. Errors encountered during socket initialization are forwarded
    /// to the caller.
    pub fn bind_with_config<A, B>(bind_addr: A, peer_addr: B, config: Config) -> std::io::Result<Self>
    where
        A: net::ToSocketAddrs,
        B: net::ToSocketAddrs,
    {
        config.validate();

        let (socket_tx, socket_rx) = socket::new(bind_addr, peer_addr, FRAME_SIZE_MAX)?;

        let endpoint = endpoint::Endpoint::new(config.endpoint.clone());

        tracing::debug!(
            local = %socket_rx.local_addr(),
            peer = %socket_rx.peer_addr(),
            address = %config.endpoint.local_address,
            "station bound"
        );

        let core = StationCore {
            config,
            time_ref: time::Instant::now(),
            socket_tx,
            next_tick_ms: 0,
            events: VecDeque::new(),
            frames_dropped: 0,
        };

        Ok(Self {
            core,
            endpoint,
            socket_rx,
        })
    }

    /// Begins sending `payload` to the peer station.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let core = &mut self.core;
        let now_ms = core.time_now_ms();

        let old_state = self.endpoint.state();

        self.endpoint
            .start_transmission(payload, now_ms, &mut EndpointContext::new(core))?;

        core.check_outcome(&self.endpoint, old_state);

        Ok(())
    }

    /// Prepares to receive one message from the peer station.
    pub fn receive(&mut self) -> Result<(), SessionError> {
        self.endpoint
            .begin_receive(&mut EndpointContext::new(&mut self.core))
    }

    /// Returns to idle, discarding any session in progress.
    pub fn reset(&mut self) {
        self.endpoint.reset();
    }

    /// Changes the data rate of subsequent transfers.
    pub fn set_data_rate(&mut self, data_rate: crate::rate::DataRate) -> Result<(), SessionError> {
        self.endpoint.set_data_rate(data_rate)
    }

    /// If any events are ready to be processed, returns the next event immediately. Otherwise,
    /// reads inbound frames and updates the engine in an attempt to produce an event.
    ///
    /// Returns `None` if no events are available.
    pub fn poll_event(&mut self) -> Option<Event> {
        let core = &mut self.core;

        if core.events.is_empty() {
            core.handle_frames(&mut self.endpoint, &mut self.socket_rx);

            core.process_tick(&mut self.endpoint);
        }

        core.events.pop_front()
    }

    /// If any events are ready to be processed, returns the next event immediately. Otherwise,
    /// reads inbound frames and updates the engine until an event can be returned. Waits for a
    /// maximum duration of `timeout`.
    ///
    /// Returns `None` if no events were available within `timeout`.
    pub fn wait_event_timeout(&mut self, timeout: time::Duration) -> Option<Event> {
        let core = &mut self.core;

        if core.events.is_empty() {
            let mut remaining_timeout = timeout;
            let mut wait_begin = time::Instant::now();

            loop {
                let wait_timeout = remaining_timeout.min(core.next_tick_timeout());

                core.handle_frames_wait(&mut self.endpoint, &mut self.socket_rx, wait_timeout);

                core.process_tick(&mut self.endpoint);

                if !core.events.is_empty() {
                    // Found what we're looking for
                    break;
                }

                let now = time::Instant::now();
                let elapsed_time = now - wait_begin;

                if elapsed_time >= remaining_timeout {
                    // No time left
                    break;
                }

                remaining_timeout -= elapsed_time;
                wait_begin = now;
            }
        }

        core.events.pop_front()
    }

    pub fn state(&self) -> endpoint::State {
        self.endpoint.state()
    }

    pub fn stats(&self) -> &endpoint::Stats {
        self.endpoint.stats()
    }

    /// Number of outgoing frames dropped to simulate channel loss.
    pub fn frames_dropped(&self) -> u64 {
        self.core.frames_dropped
    }

    /// Returns the local address of the internal UDP socket.
    pub fn local_addr(&self) -> net::SocketAddr {
        self.socket_rx.local_addr()
    }

    /// Returns the peer address of the internal UDP socket.
    pub fn peer_addr(&self) -> net::SocketAddr {
        self.socket_rx.peer_addr()
    }

    /// Returns the station address used on the air.
    pub fn address(&self) -> &frame::Address {
        &self.endpoint.config().local_address
    }
}
