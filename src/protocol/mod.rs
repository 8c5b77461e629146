pub mod activity;
pub mod sample;

pub use activity::*;
pub use sample::*;
