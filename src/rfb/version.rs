use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, TunnelError};

/// Length of the `RFB xxx.yyy\n` version message on the wire
pub const VERSION_MESSAGE_LEN: usize = 12;

const PREFIX: &str = "RFB ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProtocolVersion {
    pub const V3_3: ProtocolVersion = ProtocolVersion { major: 3, minor: 3 };
    pub const V3_8: ProtocolVersion = ProtocolVersion { major: 3, minor: 8 };

    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The version line in wire form, e.g. `RFB 003.008\n`
    pub fn to_line(&self) -> String {
        format!("{}{:03}.{:03}\n", PREFIX, self.major, self.minor)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parse `RFB <major>.<minor>\n` into its two decimal numbers.
pub fn parse_protocol_version(line: &[u8]) -> Result<ProtocolVersion> {
    let malformed = || TunnelError::MalformedVersion(String::from_utf8_lossy(line).into_owned());

    let text = std::str::from_utf8(line).map_err(|_| malformed())?;
    let body = text
        .strip_prefix(PREFIX)
        .and_then(|rest| rest.strip_suffix('\n'))
        .ok_or_else(malformed)?;
    let (major, minor) = body.split_once('.').ok_or_else(malformed)?;

    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_number(major) || !is_number(minor) {
        return Err(malformed());
    }

    Ok(ProtocolVersion {
        major: major.parse()?,
        minor: minor.parse()?,
    })
}

/// Read the fixed-size version message a server sends first and parse it.
pub async fn read_protocol_version<R>(stream: &mut R) -> Result<ProtocolVersion>
where
    R: AsyncRead + Unpin,
{
    let mut line = [0u8; VERSION_MESSAGE_LEN];
    stream.read_exact(&mut line).await?;
    parse_protocol_version(&line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_version() {
        let version = parse_protocol_version(b"RFB 003.008\n").unwrap();
        assert_eq!(version, ProtocolVersion::new(3, 8));
        assert_eq!(version, ProtocolVersion::V3_8);
    }

    #[test]
    fn test_parse_unpadded_numbers() {
        assert_eq!(
            parse_protocol_version(b"RFB 3.7\n").unwrap(),
            ProtocolVersion::new(3, 7)
        );
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        assert!(matches!(
            parse_protocol_version(b"RFB x.y\n"),
            Err(TunnelError::MalformedVersion(_))
        ));
        assert!(parse_protocol_version(b"RFB -3.8\n").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_protocol_version(b"garbage\n"),
            Err(TunnelError::MalformedVersion(_))
        ));
        assert!(parse_protocol_version(b"RFB 003.008").is_err());
        assert!(parse_protocol_version(b"RFB 003008\n").is_err());
        assert!(parse_protocol_version(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_parse_overflow_is_number_error() {
        assert!(matches!(
            parse_protocol_version(b"RFB 99999999999.008\n"),
            Err(TunnelError::VersionNumber(_))
        ));
    }

    #[test]
    fn test_to_line() {
        assert_eq!(ProtocolVersion::V3_8.to_line(), "RFB 003.008\n");
        assert_eq!(ProtocolVersion::V3_3.to_line().len(), VERSION_MESSAGE_LEN);
    }

    #[tokio::test]
    async fn test_read_protocol_version_consumes_only_the_message() {
        let mut stream: &[u8] = b"RFB 003.008\n\x01\x02";
        let version = read_protocol_version(&mut stream).await.unwrap();
        assert_eq!(version, ProtocolVersion::V3_8);
        assert_eq!(stream, b"\x01\x02");
    }
}
