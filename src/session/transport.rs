//! `Transport`: the seam between `Agent` and the underlying socket.
//! Ships one implementation, `WebSocketTransport`, built on
//! `tokio_tungstenite` with `futures::StreamExt::split`. A raw-TCP
//! transport could be added later without touching `Agent`.

use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::actor::BoxFuture;
use crate::error::{CherryError, ErrorCode};

/// The reader half: yields the next framed byte slice the reader loop
/// blocks on. `None` signals the connection ended cleanly.
pub trait TransportReader: Send + 'static {
    fn read_next(&mut self) -> BoxFuture<'_, Option<Result<Vec<u8>, CherryError>>>;
}

/// The writer half: raw byte writes, bypassing any further framing —
/// the caller has already run the packet/message codecs.
pub trait TransportWriter: Send + 'static {
    fn write_raw(&mut self, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), CherryError>>;
    fn shutdown(&mut self) -> BoxFuture<'_, ()>;
}

pub trait Transport: Send + 'static {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

pub struct WebSocketTransport {
    stream: WebSocketStream<TcpStream>,
}

impl WebSocketTransport {
    pub fn new(stream: WebSocketStream<TcpStream>) -> Self {
        Self { stream }
    }
}

impl Transport for WebSocketTransport {
    type Reader = WebSocketReader;
    type Writer = WebSocketWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.stream.split();
        (WebSocketReader { stream }, WebSocketWriter { sink })
    }
}

pub struct WebSocketReader {
    stream: SplitStream<WebSocketStream<TcpStream>>,
}

impl TransportReader for WebSocketReader {
    fn read_next(&mut self) -> BoxFuture<'_, Option<Result<Vec<u8>, CherryError>>> {
        Box::pin(async move {
            loop {
                match self.stream.next().await {
                    None => return None,
                    Some(Ok(WsMessage::Binary(bytes))) => return Some(Ok(bytes.into())),
                    Some(Ok(WsMessage::Text(text))) => return Some(Ok(text.as_bytes().to_vec())),
                    Some(Ok(WsMessage::Close(_))) => return None,
                    Some(Ok(_)) => continue, // ping/pong/frame control: not a framed payload
                    Some(Err(e)) => return Some(Err(CherryError::with_source(ErrorCode::NetError, e))),
                }
            }
        })
    }
}

pub struct WebSocketWriter {
    sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
}

impl TransportWriter for WebSocketWriter {
    fn write_raw(&mut self, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), CherryError>> {
        Box::pin(async move {
            self.sink
                .send(WsMessage::Binary(bytes.into()))
                .await
                .map_err(|e| CherryError::with_source(ErrorCode::NetError, e))
        })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.sink.close().await;
        })
    }
}
