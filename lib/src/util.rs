mod byte_vector;
mod offset;

pub use byte_vector::*;
pub use offset::*;
