/*

hfarq is a selective-repeat ARQ data-link engine for HF radio links, in the style of the
FED-STD-1052 adaptive mode.

# Frames

Two kinds of frames cross the channel. Data frames carry one block of the message, addressed by a
cyclic 8-bit sequence number and an absolute byte offset. Control frames carry everything else:
the herald that announces a message (rate, interleaver, block size, total size, message id), and
acknowledgments. Every frame ends in a CRC-32, and nothing else in a frame is trusted until the
CRC has been checked.

# Blocks and sequence numbers

The sender splits a message into blocks whose size is determined by the data rate. Block N is
sent with sequence number N mod 256 and byte offset N * block_size. At most window_capacity
blocks (64 at most) are outstanding at once, so the sender's window never spans more than a
quarter of the sequence space.

# Acknowledgments

The receiver keeps a 256-bit delivery bitmap relative to a window base. The base is the sequence
number of the first block not yet received; every block before it has been received. Each
acknowledgment carries the base and the bitmap, so the sender learns both the cumulative and the
selective state at once:

       base
       v
  ...##___#_##________...   receiver bitmap
       ^^^^^^^^^^^^^^^^^^^^ bit 0..255

  #: received

The sender projects acknowledged sequence numbers onto the blocks that are actually outstanding,
i.e. absolute block indices in [base_index, next_index). A sequence number that does not map onto
an outstanding block is ignored, so acknowledgments that wrapped around the sequence space can
never acknowledge a block that has not been sent.

The receiver only records sequence numbers less than 128 ahead of its base. Anything else is a
duplicate of a block it already passed; its data is still written (idempotently) and it is
acknowledged again.

# Retransmission

Each outstanding block remembers when it was last sent. On every update, blocks that have gone
unacknowledged for ack_timeout are resent verbatim, with the same sequence number and offset.
Acknowledged blocks are never resent. A block that times out more than retry_limit times fails
the transfer. The herald is resent on the same schedule until an acknowledgment echoes the
message descriptor back.

# Completion

The sender completes when the herald has been acknowledged, every block has been acknowledged,
and no blocks remain to be sent. The receiver completes when the contiguous prefix of received
bytes reaches the advertised total size, and always acknowledges at that point. A completed
receiver keeps acknowledging duplicate data frames and heralds in case its final acknowledgment
was lost.

# Time

The engine never reads a clock. All time comes from the millisecond timestamps passed to
handle_frame and update, and all output goes through the HostContext supplied by the caller.

*/

pub mod buffer;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod rate;
mod socket;
pub mod station;

pub use endpoint::{Endpoint, HostContext, State};
pub use error::{FrameError, SessionError};
pub use rate::DataRate;
pub use station::Station;
