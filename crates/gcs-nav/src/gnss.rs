use anyhow::{Context, Result};
use std::io::SeekFrom;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::net::TcpStream;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use gcs_proto::GpsPoint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixQuality {
    /// GGA fix indicator, 0 = no fix.
    pub indicator: u8,
    pub sats: u8,
    pub hdop: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct GnssFix {
    pub point: GpsPoint,
    pub quality: FixQuality,
    pub ts: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NmeaError {
    #[error("sentence has {0} fields, GGA needs at least 10")]
    TooShort(usize),
    #[error("checksum mismatch: computed {computed:02X}, sentence says {declared}")]
    Checksum { computed: u8, declared: String },
}

pub enum GnssSource {
    Serial(BufReader<SerialStream>),
    File { reader: BufReader<File>, pace: Duration, pass_fixes: u64 },
    Tcp(BufReader<TcpStream>),
}

impl GnssSource {
    pub fn serial(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud).open_native_async()
            .with_context(|| format!("open serial {}", dev))?;
        Ok(Self::Serial(BufReader::new(port)))
    }

    /// Replays a recorded NMEA log, one fix per `pace`, rewinding at EOF.
    pub fn file(path: &str, pace: Duration) -> Result<Self> {
        let f = std::fs::File::open(path).with_context(|| format!("open nmea file {}", path))?;
        let f = File::from_std(f);
        Ok(Self::File { reader: BufReader::new(f), pace, pass_fixes: 0 })
    }

    pub async fn tcp(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await
            .with_context(|| format!("connect nmea stream {}", addr))?;
        Ok(Self::Tcp(BufReader::new(stream)))
    }

    /// Waits for the next GGA sentence. The returned point may be `NaN` when the
    /// receiver has no lock; filtering is the caller's job.
    pub async fn next_fix(&mut self) -> Result<GnssFix> {
        let mut line = String::new();
        loop {
            line.clear();
            match self {
                GnssSource::Serial(r) => {
                    let n = r.read_line(&mut line).await.context("read serial nmea")?;
                    anyhow::ensure!(n > 0, "serial nmea source closed");
                }
                GnssSource::File { reader, pass_fixes, .. } => {
                    let n = reader.read_line(&mut line).await.context("read nmea file")?;
                    if n == 0 {
                        anyhow::ensure!(*pass_fixes > 0, "nmea file holds no GGA sentence");
                        *pass_fixes = 0;
                        reader.seek(SeekFrom::Start(0)).await.context("rewind nmea file")?;
                        continue;
                    }
                }
                GnssSource::Tcp(r) => {
                    let n = r.read_line(&mut line).await.context("read nmea stream")?;
                    anyhow::ensure!(n > 0, "nmea stream closed by peer");
                }
            }

            match parse_nmea_line(line.trim()) {
                Ok(Some(fix)) => {
                    if let GnssSource::File { pace, pass_fixes, .. } = self {
                        *pass_fixes += 1;
                        tokio::time::sleep(*pace).await;
                    }
                    return Ok(fix);
                }
                Ok(None) => {}
                Err(e) => debug!("gnss: dropping sentence {:?}: {}", line.trim(), e),
            }
        }
    }
}

/// Parses `$GPGGA`/`$GNGGA`. Other sentences yield `Ok(None)`.
pub fn parse_nmea_line(s: &str) -> Result<Option<GnssFix>, NmeaError> {
    if !(s.starts_with("$GPGGA") || s.starts_with("$GNGGA")) {
        return Ok(None);
    }
    let body = verify_checksum(s)?;
    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() < 10 {
        return Err(NmeaError::TooShort(parts.len()));
    }

    // parts[2]=lat ddmm.mmmm, parts[3]=N/S, parts[4]=lon dddmm.mmmm, parts[5]=E/W
    let lat = parse_deg_min(parts[2], parts[3], 2).unwrap_or(f64::NAN);
    let lon = parse_deg_min(parts[4], parts[5], 3).unwrap_or(f64::NAN);

    Ok(Some(GnssFix {
        point: GpsPoint::new(lat, lon),
        quality: FixQuality {
            indicator: parts[6].parse().unwrap_or(0),
            sats: parts[7].parse().unwrap_or(0),
            hdop: parts[8].parse().unwrap_or(99.9),
        },
        ts: OffsetDateTime::now_utc(),
    }))
}

fn verify_checksum(s: &str) -> Result<&str, NmeaError> {
    let Some((body, declared)) = s.split_once('*') else {
        return Ok(s);
    };
    let computed = body.bytes().skip(1).fold(0u8, |acc, b| acc ^ b);
    match u8::from_str_radix(declared.trim(), 16) {
        Ok(v) if v == computed => Ok(body),
        _ => Err(NmeaError::Checksum { computed, declared: declared.to_string() }),
    }
}

fn parse_deg_min(v: &str, hemi: &str, deg_len: usize) -> Option<f64> {
    if v.len() <= deg_len { return None; }
    let deg: f64 = v.get(..deg_len)?.parse().ok()?;
    let min: f64 = v.get(deg_len..)?.parse().ok()?;
    let mut out = deg + (min / 60.0);
    if hemi == "S" || hemi == "W" { out = -out; }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gga_with_checksum() {
        let s = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
        let fix = parse_nmea_line(s).unwrap().unwrap();
        assert!((fix.point.lat - 48.1173).abs() < 1e-4);
        assert!((fix.point.lon - 11.516_666).abs() < 1e-4);
        assert_eq!(fix.quality.sats, 8);
        assert_eq!(fix.quality.indicator, 1);
    }

    #[test]
    fn west_and_south_are_negative() {
        let s = "$GPGGA,000000,3857.0000,S,09515.0000,W,1,05,1.2,300.0,M,0.0,M,,";
        let fix = parse_nmea_line(s).unwrap().unwrap();
        assert!((fix.point.lat + 38.95).abs() < 1e-9);
        assert!((fix.point.lon + 95.25).abs() < 1e-9);
    }

    #[test]
    fn missing_position_is_nan() {
        let s = "$GPGGA,000000,,,,,0,00,99.9,,M,,M,,";
        let fix = parse_nmea_line(s).unwrap().unwrap();
        assert!(fix.point.lat.is_nan());
        assert!(fix.point.lon.is_nan());
        assert!(!fix.point.is_valid());
    }

    #[test]
    fn missing_longitude_only() {
        let s = "$GNGGA,000000,3857.0000,N,,,1,04,2.0,,M,,M,,";
        let fix = parse_nmea_line(s).unwrap().unwrap();
        assert!((fix.point.lat - 38.95).abs() < 1e-9);
        assert!(fix.point.lon.is_nan());
    }

    #[test]
    fn other_sentences_are_skipped() {
        assert_eq!(parse_nmea_line("$GPRMC,123519,A,4807.038,N").map(|f| f.is_some()), Ok(false));
    }

    #[test]
    fn bad_checksum_and_short_sentences_fail() {
        let s = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00";
        assert!(matches!(parse_nmea_line(s), Err(NmeaError::Checksum { .. })));
        assert_eq!(parse_nmea_line("$GPGGA,1,2").map(|f| f.is_some()), Err(NmeaError::TooShort(3)));
    }

    #[tokio::test]
    async fn replays_file_and_rewinds() {
        let dir = std::env::temp_dir().join(format!("gcs-nmea-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("track.nmea");
        std::fs::write(
            &path,
            "$GPGGA,000000,3857.0000,N,09515.0000,W,1,05,1.2,300.0,M,0.0,M,,\n$GPGSV,junk\n",
        )
        .unwrap();

        let mut src = GnssSource::file(path.to_str().unwrap(), Duration::from_millis(1)).unwrap();
        let a = src.next_fix().await.unwrap();
        let b = src.next_fix().await.unwrap();
        assert_eq!(a.point, b.point);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn file_without_gga_is_an_error() {
        let dir = std::env::temp_dir().join(format!("gcs-nmea-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("no-gga.nmea");
        std::fs::write(&path, "$GPGSV,junk\n$GPRMC,123519,A\n").unwrap();

        let mut src = GnssSource::file(path.to_str().unwrap(), Duration::from_millis(1)).unwrap();
        let err = src.next_fix().await.unwrap_err();
        assert!(format!("{:#}", err).contains("no GGA sentence"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
