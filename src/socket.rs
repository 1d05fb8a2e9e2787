//! UDP transport standing in for the modem byte boundary. Each datagram carries exactly one
//! frame.

use std::net;
use std::sync::Arc;
use std::time;

const SOCKET_POLLING_KEY: usize = 0;

pub struct FrameSocketTx {
    // Reference to non-blocking socket
    socket: Arc<net::UdpSocket>,
}

pub struct FrameSocketRx {
    // Reference to non-blocking socket
    socket: Arc<net::UdpSocket>,
    // Cached from socket initialization
    local_addr: net::SocketAddr,
    peer_addr: net::SocketAddr,
    // Polling objects
    poller: polling::Poller,
    poller_events: polling::Events,
    // Always-allocated receive buffer
    recv_buffer: Box<[u8]>,
}

impl FrameSocketTx {
    /// Sends a frame to the peer. Delivery is not guaranteed, so errors are only logged.
    pub fn send(&self, frame: &[u8]) {
        if let Err(err) = self.socket.send(frame) {
            tracing::debug!(%err, size = frame.len(), "frame send failed");
        }
    }
}

impl FrameSocketRx {
    /// If a frame can be read from the socket, returns the frame. Returns Ok(None) otherwise.
    pub fn try_read_frame(&mut self) -> std::io::Result<Option<&[u8]>> {
        match self.socket.recv(&mut self.recv_buffer) {
            Ok(frame_len) => Ok(Some(&self.recv_buffer[..frame_len])),
            Err(err) => match err.kind() {
                // WouldBlock means no datagram; ConnectionRefused is a stale ICMP report from a
                // peer that is not listening yet
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::ConnectionRefused => {
                    Ok(None)
                }
                _ => Err(err),
            },
        }
    }

    /// Waits up to `timeout` for a datagram and returns it. Ok(None) covers both an expired
    /// timeout and a spurious wakeup.
    pub fn wait_for_frame(
        &mut self,
        timeout: Option<time::Duration>,
    ) -> std::io::Result<Option<&[u8]>> {
        // Interest must be re-armed prior to each wait() call
        self.poller
            .modify(&*self.socket, polling::Event::readable(SOCKET_POLLING_KEY))?;

        self.poller_events.clear();

        let n = self.poller.wait(&mut self.poller_events, timeout)?;

        if n > 0 {
            self.try_read_frame()
        } else {
            Ok(None)
        }
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> net::SocketAddr {
        self.peer_addr
    }
}

impl Drop for FrameSocketRx {
    fn drop(&mut self) {
        let _ = self.poller.delete(&*self.socket);
    }
}

/// Binds a non-blocking UDP socket to `bind_address`, connects it to `peer_address`, and splits
/// it into send and receive halves.
pub fn new<A, B>(
    bind_address: A,
    peer_address: B,
    frame_size_max: usize,
) -> std::io::Result<(FrameSocketTx, FrameSocketRx)>
where
    A: net::ToSocketAddrs,
    B: net::ToSocketAddrs,
{
    let socket = net::UdpSocket::bind(bind_address)?;
    socket.set_nonblocking(true)?;
    socket.connect(peer_address)?;

    let local_addr = socket.local_addr()?;
    let peer_addr = socket.peer_addr()?;

    let poller = polling::Poller::new()?;

    // SAFETY: The socket is removed from the poller when the receive half is dropped, and the
    // receive half keeps the socket alive until then.
    unsafe {
        poller.add(&socket, polling::Event::readable(SOCKET_POLLING_KEY))?;
    }

    let socket_rc = Arc::new(socket);

    let tx = FrameSocketTx {
        socket: Arc::clone(&socket_rc),
    };

    let rx = FrameSocketRx {
        socket: socket_rc,
        local_addr,
        peer_addr,
        poller,
        poller_events: polling::Events::new(),
        recv_buffer: vec![0; frame_size_max].into_boxed_slice(),
    };

    Ok((tx, rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_pair() {
        let (a_tx, mut a_rx) = new(("127.0.0.1", 10110), ("127.0.0.1", 10111), 64).unwrap();
        let (b_tx, mut b_rx) = new(("127.0.0.1", 10111), ("127.0.0.1", 10110), 64).unwrap();

        assert_eq!(a_rx.peer_addr(), b_rx.local_addr());

        a_tx.send(&[1, 2, 3]);

        let frame = b_rx
            .wait_for_frame(Some(time::Duration::from_millis(1000)))
            .unwrap()
            .map(|bytes| bytes.to_vec());
        assert_eq!(frame, Some(vec![1, 2, 3]));

        b_tx.send(&[4]);

        let frame = a_rx
            .wait_for_frame(Some(time::Duration::from_millis(1000)))
            .unwrap()
            .map(|bytes| bytes.to_vec());
        assert_eq!(frame, Some(vec![4]));

        assert_eq!(a_rx.try_read_frame().unwrap(), None);
    }
}
