pub mod config;
pub mod console;
pub mod error;
pub mod http;
pub mod rfb;
pub mod socks5;
pub mod tls;
pub mod tunnel;
pub mod utils;

pub use error::{Result, TunnelError};
