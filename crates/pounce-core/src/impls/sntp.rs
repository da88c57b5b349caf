//! SNTP client (RFC 4330) over a tokio UDP socket.
//!
//! Only the transmit timestamp of the reply is used. Round-trip delay is not
//! compensated; for a nearby server it stays in the low milliseconds.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::domain::TimeQueryError;
use crate::ports::TimeSource;

pub const NTP_PORT: u16 = 123;
const PACKET_LEN: usize = 48;
/// Seconds between 1900-01-01 (NTP epoch) and 1970-01-01.
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// LI = 0, VN = 3, Mode = 3 (client); everything else zero.
pub fn request_packet() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = 0x1B;
    packet
}

/// Extract the server's transmit time from a reply.
pub fn parse_response(buf: &[u8]) -> Result<DateTime<Utc>, TimeQueryError> {
    if buf.len() < PACKET_LEN {
        return Err(TimeQueryError::Malformed(format!(
            "short packet: {} bytes",
            buf.len()
        )));
    }
    let mode = buf[0] & 0x07;
    if mode != 4 {
        return Err(TimeQueryError::Malformed(format!("unexpected mode {mode}")));
    }
    if buf[1] == 0 {
        let code = String::from_utf8_lossy(&buf[12..16])
            .trim_end_matches('\0')
            .to_string();
        return Err(TimeQueryError::KissOfDeath(code));
    }

    let secs = u32::from_be_bytes([buf[40], buf[41], buf[42], buf[43]]);
    let frac = u32::from_be_bytes([buf[44], buf[45], buf[46], buf[47]]);
    if secs == 0 && frac == 0 {
        return Err(TimeQueryError::Malformed("zero transmit timestamp".into()));
    }

    // MSB clear means era 1 (2036-02-07 onwards)
    let secs = if secs & 0x8000_0000 == 0 {
        i64::from(secs) + (1_i64 << 32)
    } else {
        i64::from(secs)
    };
    let nanos = ((u64::from(frac) * 1_000_000_000) >> 32) as u32;

    DateTime::from_timestamp(secs - NTP_UNIX_OFFSET, nanos)
        .ok_or_else(|| TimeQueryError::Malformed("timestamp out of range".into()))
}

/// `host` -> `host:123`; an explicit port is kept.
pub fn with_default_port(server: &str) -> String {
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return SocketAddr::new(ip, NTP_PORT).to_string();
    }
    match server.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => server.to_string(),
        _ => format!("{server}:{NTP_PORT}"),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SntpTimeSource;

impl SntpTimeSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeSource for SntpTimeSource {
    async fn query(&self, server: &str) -> Result<DateTime<Utc>, TimeQueryError> {
        let addr = with_default_port(server);
        let target = tokio::net::lookup_host(&addr).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{addr} did not resolve"))
        })?;

        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        socket.send(&request_packet()).await?;

        let mut buf = [0u8; 512];
        let n = socket.recv(&mut buf).await?;
        debug!(server = %addr, peer = %target, bytes = n, "sntp reply");
        parse_response(&buf[..n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn reply(stratum: u8, t: DateTime<Utc>) -> [u8; PACKET_LEN] {
        let mut p = [0u8; PACKET_LEN];
        p[0] = 0x24; // LI 0, VN 4, mode 4
        p[1] = stratum;
        let secs = (t.timestamp() + NTP_UNIX_OFFSET) as u32;
        let frac = ((u64::from(t.timestamp_subsec_nanos()) << 32) / 1_000_000_000) as u32;
        p[40..44].copy_from_slice(&secs.to_be_bytes());
        p[44..48].copy_from_slice(&frac.to_be_bytes());
        p
    }

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 16, 13, 0, 0).unwrap() + TimeDelta::milliseconds(250)
    }

    #[test]
    fn request_is_client_mode_v3() {
        let p = request_packet();
        assert_eq!(p.len(), 48);
        assert_eq!(p[0], 0x1B);
        assert!(p[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn parses_transmit_timestamp() {
        assert_eq!(parse_response(&reply(2, sample_time())).unwrap(), sample_time());
    }

    #[test]
    fn rejects_bad_packets() {
        assert!(matches!(
            parse_response(&[0u8; 20]),
            Err(TimeQueryError::Malformed(_))
        ));

        let mut client_mode = reply(2, sample_time());
        client_mode[0] = 0x1B;
        assert!(matches!(
            parse_response(&client_mode),
            Err(TimeQueryError::Malformed(_))
        ));

        let mut kod = reply(0, sample_time());
        kod[12..16].copy_from_slice(b"RATE");
        assert!(matches!(
            parse_response(&kod),
            Err(TimeQueryError::KissOfDeath(code)) if code == "RATE"
        ));
    }

    #[test]
    fn era_one_timestamps() {
        let mut p = reply(1, sample_time());
        // 2036-02-07T06:28:16Z + 10s: seconds field wrapped to 10
        p[40..44].copy_from_slice(&10u32.to_be_bytes());
        p[44..48].copy_from_slice(&0u32.to_be_bytes());
        let t = parse_response(&p).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2036, 2, 7, 6, 28, 26).unwrap());
    }

    #[test]
    fn default_port_is_appended() {
        assert_eq!(with_default_port("ntp.aliyun.com"), "ntp.aliyun.com:123");
        assert_eq!(with_default_port("ntp.aliyun.com:1123"), "ntp.aliyun.com:1123");
        assert_eq!(with_default_port("127.0.0.1"), "127.0.0.1:123");
        assert_eq!(with_default_port("::1"), "[::1]:123");
        assert_eq!(with_default_port("[::1]:4123"), "[::1]:4123");
    }

    #[tokio::test]
    async fn queries_a_local_responder() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = responder.local_addr().unwrap();
        let serve = tokio::spawn(async move {
            let mut buf = [0u8; 128];
            let (n, peer) = responder.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, 48);
            assert_eq!(buf[0], 0x1B);
            responder
                .send_to(&reply(2, sample_time()), peer)
                .await
                .unwrap();
        });

        let t = SntpTimeSource::new().query(&addr.to_string()).await.unwrap();
        assert_eq!(t, sample_time());
        serve.await.unwrap();
    }
}
