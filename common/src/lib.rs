pub mod packet;

pub use packet::{FrameSizeError, Packet, FRAME_LEN};
