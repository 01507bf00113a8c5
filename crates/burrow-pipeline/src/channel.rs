//! Channel transports implementing [`Publisher`](burrow_core::Publisher)
//! and [`Subscriber`](burrow_core::Subscriber).

pub mod memory;
pub mod redis_stream;
