//! Location provider backed by a local gpsd daemon (JSON protocol over TCP).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::distance::Coordinate;
use super::location::{LocationError, LocationOptions, LocationSample};
use super::provider::{LocationProvider, WatchStream};

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true}\n";

/// gpsd fix modes.
const MODE_2D: u8 = 2;
const MODE_3D: u8 = 3;

#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
enum GpsdMessage {
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(rename = "DEVICES")]
    Devices {
        #[serde(default)]
        devices: Vec<serde_json::Value>,
    },
    #[serde(rename = "ERROR")]
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TpvReport {
    #[serde(default)]
    mode: u8,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    eph: Option<f64>,
    #[serde(default)]
    epx: Option<f64>,
    #[serde(default)]
    epy: Option<f64>,
}

impl TpvReport {
    fn into_sample(self, high_accuracy: bool) -> Option<LocationSample> {
        let required = if high_accuracy { MODE_3D } else { MODE_2D };
        if self.mode < required {
            return None;
        }
        let coordinate = Coordinate::new(self.lat?, self.lon?);
        if !coordinate.is_valid() {
            return None;
        }
        let accuracy = self
            .eph
            .or_else(|| match (self.epx, self.epy) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (x, y) => x.or(y),
            })
            .unwrap_or(0.0);
        Some(LocationSample::new(
            coordinate,
            accuracy,
            self.time.unwrap_or_else(Utc::now),
        ))
    }
}

fn classify_io(err: io::Error) -> LocationError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotFound
        | io::ErrorKind::AddrNotAvailable => LocationError::Unsupported,
        io::ErrorKind::PermissionDenied => LocationError::PermissionDenied,
        io::ErrorKind::TimedOut => LocationError::Timeout,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::BrokenPipe => LocationError::PositionUnavailable,
        _ => LocationError::Unknown(err.to_string()),
    }
}

struct GpsdSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    // Held so the daemon keeps streaming; dropping it closes our side.
    _writer: OwnedWriteHalf,
    high_accuracy: bool,
}

impl GpsdSession {
    async fn open(addr: &str, high_accuracy: bool) -> Result<Self, LocationError> {
        let stream = TcpStream::connect(addr).await.map_err(classify_io)?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(WATCH_COMMAND).await.map_err(classify_io)?;
        tracing::debug!(addr, "gpsd watch enabled");
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            _writer: writer,
            high_accuracy,
        })
    }

    /// Next usable fix; `Ok(None)` once the daemon closes the connection.
    async fn next_fix(&mut self) -> Result<Option<LocationSample>, LocationError> {
        while let Some(line) = self.lines.next_line().await.map_err(classify_io)? {
            let message = match serde_json::from_str::<GpsdMessage>(&line) {
                Ok(message) => message,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unparseable gpsd line");
                    continue;
                }
            };
            match message {
                GpsdMessage::Tpv(report) => {
                    if let Some(sample) = report.into_sample(self.high_accuracy) {
                        return Ok(Some(sample));
                    }
                }
                GpsdMessage::Devices { devices } if devices.is_empty() => {
                    return Err(LocationError::PositionUnavailable);
                }
                GpsdMessage::Error { message } => return Err(LocationError::Unknown(message)),
                GpsdMessage::Devices { .. } | GpsdMessage::Other => {}
            }
        }
        Ok(None)
    }
}

pub struct GpsdLocationProvider {
    addr: String,
    last_fix: Arc<Mutex<Option<LocationSample>>>,
}

impl GpsdLocationProvider {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            last_fix: Arc::new(Mutex::new(None)),
        }
    }

    fn cached(&self, maximum_age: Duration) -> Option<LocationSample> {
        if maximum_age.is_zero() {
            return None;
        }
        let now = Utc::now();
        self.last_fix
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|fix| fix.age(now) <= maximum_age)
            .cloned()
    }

    async fn first_fix(&self, high_accuracy: bool) -> Result<LocationSample, LocationError> {
        let mut session = GpsdSession::open(&self.addr, high_accuracy).await?;
        let sample = session
            .next_fix()
            .await?
            .ok_or(LocationError::PositionUnavailable)?;
        remember(&self.last_fix, &sample);
        Ok(sample)
    }
}

fn remember(cache: &Mutex<Option<LocationSample>>, sample: &LocationSample) {
    *cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample.clone());
}

#[async_trait]
impl LocationProvider for GpsdLocationProvider {
    async fn current_position(
        &self,
        options: LocationOptions,
    ) -> Result<LocationSample, LocationError> {
        if let Some(cached) = self.cached(options.maximum_age) {
            tracing::debug!("using cached gpsd fix");
            return Ok(cached);
        }
        tokio::time::timeout(options.timeout, self.first_fix(options.enable_high_accuracy))
            .await
            .map_err(|_| LocationError::Timeout)?
    }

    async fn watch_position(
        &self,
        options: LocationOptions,
    ) -> Result<WatchStream, LocationError> {
        let session = tokio::time::timeout(
            options.timeout,
            GpsdSession::open(&self.addr, options.enable_high_accuracy),
        )
        .await
        .map_err(|_| LocationError::Timeout)??;

        let cache = Arc::clone(&self.last_fix);
        let timeout = options.timeout;
        let stream = stream::unfold(Some(session), move |session| {
            let cache = Arc::clone(&cache);
            async move {
                let mut session = session?;
                match tokio::time::timeout(timeout, session.next_fix()).await {
                    Err(_) => Some((Err(LocationError::Timeout), Some(session))),
                    Ok(Ok(Some(sample))) => {
                        remember(&cache, &sample);
                        Some((Ok(sample), Some(session)))
                    }
                    // The daemon went away; report it once and end the watch.
                    Ok(Ok(None)) => Some((Err(LocationError::PositionUnavailable), None)),
                    Ok(Err(err)) => Some((Err(err), Some(session))),
                }
            }
        });
        Ok(stream.boxed())
    }
}
