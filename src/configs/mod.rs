pub mod base;
pub mod discord;
pub mod relay;
pub mod server;

pub use base::*;
pub use discord::*;
pub use relay::*;
pub use server::*;
