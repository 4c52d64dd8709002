// SOCKS5 wire constants and the egress server
pub mod protocol;
pub mod server;
