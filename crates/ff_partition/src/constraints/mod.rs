mod hard;
mod soft;
mod shape;

pub use hard::*;
pub use soft::*;
pub use shape::*;
