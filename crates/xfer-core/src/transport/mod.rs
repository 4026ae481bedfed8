//! Transport layer module.

pub mod mock;
pub mod pipe;
pub mod serial;
pub mod stream;
pub mod traits;

pub use mock::MockChannel;
pub use pipe::PipeChannel;
pub use serial::{SerialChannel, list_ports};
pub use stream::StreamChannel;
pub use traits::{ByteChannel, Clock, SystemClock, TransportError};
