//! Socket transports for the realtime channel.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::credential::Credential;
use crate::errors::RealtimeError;

/// One inbound unit from an open connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Pong,
}

/// An open, authenticated connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Next inbound frame. `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<Frame, RealtimeError>>;

    async fn ping(&mut self) -> Result<(), RealtimeError>;

    async fn close(&mut self) -> Result<(), RealtimeError>;
}

/// Opens connections authenticated with a credential.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn FrameStream>, RealtimeError>;
}

/// WebSocket transport.
///
/// The token travels both as a `token` query parameter and as an
/// `Authorization: Bearer` header on the upgrade request, since browsers
/// cannot set headers and servers written for them read the query.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn url_for(&self, credential: &Credential) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", credential.as_str());
        url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn FrameStream>, RealtimeError> {
        let mut request = self
            .url_for(credential)
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        let mut bearer = HeaderValue::from_str(&credential.bearer())
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        bearer.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        tracing::debug!(url = %self.url, status = %response.status(), "websocket connected");

        Ok(Box::new(WsStream { socket }))
    }
}

struct WsStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, RealtimeError>> {
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(RealtimeError::Protocol(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(_) => tracing::debug!("ignoring non-utf8 binary frame"),
                },
                Message::Pong(_) => return Some(Ok(Frame::Pong)),
                Message::Close(_) => return None,
                // Pings are answered by tungstenite on the next flush.
                Message::Ping(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn ping(&mut self) -> Result<(), RealtimeError> {
        self.socket
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|e| RealtimeError::Protocol(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        self.socket
            .close(None)
            .await
            .map_err(|e| RealtimeError::Protocol(e.to_string()))
    }
}
