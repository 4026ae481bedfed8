//! Memory collaborators.

pub mod buffer;
pub mod traits;

pub use buffer::{BufferMemory, ERASED, SparseMemory};
pub use traits::{Memory, MemoryError};
