pub mod contention;
pub mod handoff;
pub mod timeout;
