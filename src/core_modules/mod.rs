pub mod band;
pub mod cascade;
pub mod convert;
pub mod topology;
pub mod transport;
