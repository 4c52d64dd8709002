// Remote framebuffer protocol pieces used by the console handshake
pub mod version;
