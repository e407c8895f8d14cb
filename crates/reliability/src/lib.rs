//! Failure isolation for outbound calls: circuit breaker and P2P client (§4.6).

pub mod breaker;
pub mod p2p_client;

pub use breaker::{BreakerConfig, BreakerError, CircuitBreaker};
pub use p2p_client::{P2pClient, P2pError};
