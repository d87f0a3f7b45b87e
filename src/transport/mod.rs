pub mod control;
pub mod udp;
