use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::core::config::CHUNK_SIZE;
use crate::core::protocol::{FILE_NOT_FOUND, Message, MessageType};
use crate::network::Transport;
use crate::storage::FileSource;
use crate::utils::Result;

/// Serves `request_file` exchanges, one task per connection.
pub struct FileServer {
    listener: TcpListener,
    source: Arc<dyn FileSource>,
}

impl FileServer {
    pub fn new(listener: TcpListener, source: Arc<dyn FileSource>) -> Self {
        Self { listener, source }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!("File server listening on {}", self.listener.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("File server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let source = self.source.clone();
                        tokio::spawn(async move {
                            if let Err(e) = Self::handle_connection(stream, addr, source).await {
                                warn!("Transfer to {} aborted: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Accept error: {}", e),
                },
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        source: Arc<dyn FileSource>,
    ) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let request: Message = match Transport::read_frame(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Failed to parse incoming request from {}: {}", addr, e);
                return Ok(());
            }
        };

        match request.msg_type {
            MessageType::RequestFile => {
                let filename = request.filename.unwrap_or_default();
                debug!("File request for {:?} from {}", filename, addr);
                serve_file(&mut write_half, source.as_ref(), &filename).await
            }
            MessageType::Message => {
                info!("Message from {}: {}", addr, request.content_text());
                Ok(())
            }
            other => {
                debug!("Ignoring {:?} frame from {}", other, addr);
                Ok(())
            }
        }
    }
}

/// Streams `filename` as chunk frames plus a closing `end_of_file`, or a
/// single `error` frame when it cannot be loaded. The whole file is resolved
/// before the first frame goes out, so a failed lookup never yields partial
/// data.
pub async fn serve_file<W>(writer: &mut W, source: &dyn FileSource, filename: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let content = match source.load(filename).await {
        Ok(content) => content,
        Err(e) => {
            warn!("Cannot serve {:?}: {}", filename, e);
            let reason = if e.is_not_found() {
                FILE_NOT_FOUND.to_string()
            } else {
                e.to_string()
            };
            return Transport::write_frame(writer, &Message::error(Some(filename), &reason)).await;
        }
    };

    let mut frames = 0usize;
    for piece in content.chunks(CHUNK_SIZE) {
        Transport::write_frame(writer, &Message::file_chunk(piece)).await?;
        frames += 1;
    }
    Transport::write_frame(writer, &Message::end_of_file(filename)).await?;

    info!(
        "Sent {} ({} bytes in {} chunks)",
        filename,
        content.len(),
        frames
    );
    Ok(())
}
