pub mod genkey;
pub mod serve;
pub mod snapshot;
