//! Network ingest and actuator output.
//!
//! The sensor connects over TCP and streams fixed-length packets with no
//! framing of its own.  [`spawn_reader`] cuts the byte stream into
//! [`PACKET_LENGTH`] buffers on a dedicated task, so the next packet is read
//! while the pipeline is still busy with the current one.
//!
//! Detections go out as a single byte (the electrode index) through an
//! [`Actuator`], normally a serial device opened as a file.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::PACKET_LENGTH;

// ── Ingest ───────────────────────────────────────────────────────────────────

/// Listening socket the sensor connects to.
pub struct SensorLink {
    listener: TcpListener,
}

impl SensorLink {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening for the sensor on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for the sensor to connect.  Only one peer is served per run.
    pub async fn accept(&self) -> io::Result<TcpStream> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        info!("sensor connected from {peer}");
        Ok(stream)
    }
}

/// Read one packet, or whatever is left of one when the stream ends.
///
/// Returns `Ok(None)` on a clean EOF at a packet boundary.  A buffer shorter
/// than [`PACKET_LENGTH`] means the peer closed mid-packet.
pub async fn read_packet<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; PACKET_LENGTH];
    let mut filled = 0;
    while filled < PACKET_LENGTH {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            buf.truncate(filled);
            return Ok(Some(buf));
        }
        filled += n;
    }
    Ok(Some(buf))
}

/// Spawn the reader task and return the packet channel plus its handle.
///
/// The task forwards every packet, including a truncated tail (which the
/// codec then rejects), and stops at EOF or when the receiver is dropped.
/// Its handle resolves to the number of buffers forwarded.
pub fn spawn_reader<R>(
    mut reader: R,
    capacity: usize,
) -> (mpsc::Receiver<Vec<u8>>, JoinHandle<io::Result<u64>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Vec<u8>>(capacity);
    let handle = tokio::spawn(async move {
        let mut forwarded = 0u64;
        while let Some(packet) = read_packet(&mut reader).await? {
            let truncated = packet.len() < PACKET_LENGTH;
            if truncated {
                warn!(
                    "sensor stream ended mid-packet ({} of {PACKET_LENGTH} bytes)",
                    packet.len()
                );
            }
            if tx.send(packet).await.is_err() {
                debug!("packet receiver dropped, stopping reader");
                break;
            }
            forwarded += 1;
            if truncated {
                break;
            }
        }
        info!("sensor stream finished after {forwarded} packet(s)");
        Ok(forwarded)
    });
    (rx, handle)
}

// ── Actuator ─────────────────────────────────────────────────────────────────

/// Receiver of detection signals.
pub trait Actuator: Send {
    /// Signal that `electrode` detected a particle.
    fn signal(&mut self, electrode: u8) -> impl Future<Output = io::Result<()>> + Send;
}

/// Writes one byte per detection to any async writer.
pub struct SerialActuator<W> {
    writer: W,
}

impl<W> SerialActuator<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl SerialActuator<tokio::fs::File> {
    /// Open a serial device (e.g. `/dev/ttyACM0`) for writing.
    ///
    /// Baud rate and framing are not touched; put the port in raw mode at the
    /// receiver's rate first, e.g. `stty -F /dev/ttyACM0 9600 raw -echo`.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        info!("actuator output on {}", path.display());
        Ok(Self::new(file))
    }
}

impl<W> Actuator for SerialActuator<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn signal(&mut self, electrode: u8) -> io::Result<()> {
        self.writer.write_all(&[electrode]).await?;
        self.writer.flush().await
    }
}

/// Logs detections instead of writing them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActuator;

impl Actuator for LogActuator {
    async fn signal(&mut self, electrode: u8) -> io::Result<()> {
        info!("actuator: electrode {electrode}");
        Ok(())
    }
}
