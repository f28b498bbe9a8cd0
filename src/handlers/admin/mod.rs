mod licenses;
mod logs;

pub use licenses::*;
pub use logs::*;
