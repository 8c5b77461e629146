pub mod presence;
pub mod status;
