// Forwarding engine: dial, relay, accept loop
pub mod dial;
pub mod listener;
pub mod relay;
