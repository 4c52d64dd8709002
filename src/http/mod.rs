// HTTP framing helpers
pub mod header;
