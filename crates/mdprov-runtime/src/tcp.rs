//! Length-prefixed TCP transport
//!
//! Each frame is a big-endian `u32` length followed by one encoded message.
//! The accept loop registers every connection in the `ConnectionDirectory` and
//! spawns a reader and a writer for it; the reader turns frames into
//! `TransportEvent`s for the dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;

use mdprov_core::{ChannelId, ChannelInfo};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Notify};

#[cfg(not(feature = "std"))]
use log::{debug, info, warn};
#[cfg(feature = "std")]
use tracing::{debug, info, warn};

use crate::connections::ConnectionDirectory;
use crate::error::{RuntimeError, RuntimeResult};

pub const FRAME_HEADER_LEN: usize = 4;

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// What the transport reports to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ChannelUp { channel: ChannelId, info: ChannelInfo },
    ChannelDown { channel: ChannelId, reason: String },
    Message { channel: ChannelId, bytes: Vec<u8> },
}

impl TransportEvent {
    pub fn channel(&self) -> ChannelId {
        match self {
            TransportEvent::ChannelUp { channel, .. }
            | TransportEvent::ChannelDown { channel, .. }
            | TransportEvent::Message { channel, .. } => *channel,
        }
    }
}

// ----------------------------------------------------------------------------
// Framing
// ----------------------------------------------------------------------------

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(
    reader: &mut R,
    channel: ChannelId,
    max_frame: usize,
) -> RuntimeResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let length = u32::from_be_bytes(header) as usize;
    if length > max_frame {
        return Err(RuntimeError::FrameTooLarge {
            channel,
            length,
            limit: max_frame,
        });
    }
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> RuntimeResult<()>
where
    W: AsyncWrite + Unpin,
{
    let length = u32::try_from(payload.len())
        .map_err(|_| RuntimeError::channel(format!("frame of {} bytes", payload.len())))?;
    writer.write_all(&length.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Accept Loop
// ----------------------------------------------------------------------------

pub struct TcpAcceptor {
    listener: TcpListener,
    directory: Arc<ConnectionDirectory>,
    events: mpsc::Sender<TransportEvent>,
    max_frame: usize,
}

impl TcpAcceptor {
    pub fn new(
        listener: TcpListener,
        directory: Arc<ConnectionDirectory>,
        events: mpsc::Sender<TransportEvent>,
        max_frame: usize,
    ) -> Self {
        Self {
            listener,
            directory,
            events,
            max_frame,
        }
    }

    pub fn local_addr(&self) -> RuntimeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` turns true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> RuntimeResult<()> {
        info!("Accepting consumers on {}", self.local_addr()?);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(err) = self.serve(stream, addr).await {
                            warn!("Dropping connection from {}: {}", addr, err);
                        }
                    }
                    Err(err) => warn!("Accept failed: {}", err),
                },
            }
        }
        info!("Accept loop stopped");
        Ok(())
    }

    async fn serve(&self, stream: TcpStream, addr: SocketAddr) -> RuntimeResult<()> {
        stream.set_nodelay(true)?;
        let mut info = ChannelInfo::new(addr.ip().to_string(), addr.port());
        info.max_fragment_size = u32::try_from(self.max_frame).unwrap_or(u32::MAX);

        let registration = self.directory.register(info.clone());
        let channel = registration.channel;
        debug!("{} connected from {}", channel, addr);

        self.events
            .send(TransportEvent::ChannelUp { channel, info })
            .await
            .map_err(|_| RuntimeError::Shutdown)?;

        let (reader, writer) = stream.into_split();
        tokio::spawn(write_loop(writer, channel, registration.outbound));
        tokio::spawn(read_loop(
            reader,
            channel,
            self.max_frame,
            self.events.clone(),
            self.directory.clone(),
            registration.closed,
        ));
        Ok(())
    }
}

async fn write_loop<W>(mut writer: W, channel: ChannelId, mut outbound: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(err) = write_frame(&mut writer, &frame).await {
            warn!("Write to {} failed: {}", channel, err);
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!("Writer of {} stopped", channel);
}

async fn read_loop<R>(
    mut reader: R,
    channel: ChannelId,
    max_frame: usize,
    events: mpsc::Sender<TransportEvent>,
    directory: Arc<ConnectionDirectory>,
    closed: Arc<Notify>,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        tokio::select! {
            _ = closed.notified() => {
                debug!("Reader of {} stopped by the provider", channel);
                return;
            }
            frame = read_frame(&mut reader, channel, max_frame) => match frame {
                Ok(Some(bytes)) => {
                    if events.send(TransportEvent::Message { channel, bytes }).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break "peer closed the connection".to_string(),
                Err(err) => break err.to_string(),
            },
        }
    };

    // a provider-side close already tore the session down
    if directory.unregister(channel) {
        let _ = events
            .send(TransportEvent::ChannelDown { channel, reason })
            .await;
    }
}
