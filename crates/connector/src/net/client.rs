use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

use super::frame::FrameReader;
use super::protocol::{read_rendered_image, read_status, ContextCall, Request};
use crate::error::{Error, Result};
use crate::host::{ContextHandle, Host, RenderRequest};
use crate::image::Image;
use crate::input::InputValue;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Host forwarding every operation to a `stc serve` process.
///
/// A connection lost after [`allocate`](Host::allocate) is re-established by
/// the next request.
pub struct NetHost {
    target: String,
    allocated: AtomicBool,
    socket: Mutex<Option<Socket>>,
}

impl NetHost {
    /// `target` is a websocket URL such as `ws://render-box:13710`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            allocated: AtomicBool::new(false),
            socket: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Socket>>> {
        self.socket
            .lock()
            .map_err(|_| Error::Allocation(format!("Connection to {} is poisoned", self.target)))
    }

    fn connect(&self) -> Result<Socket> {
        let (socket, _) = connect(self.target.as_str()).map_err(|err| {
            Error::Allocation(format!("Could not connect to {}: {err}", self.target))
        })?;
        info!(target_host = %self.target, "connected to remote host");
        Ok(socket)
    }

    /// Sends one request and waits for its response body.
    ///
    /// A broken or closed connection is dropped and reopened by the next request.
    fn exchange(&self, request: &Request) -> Result<Vec<u8>> {
        if !self.allocated.load(Ordering::SeqCst) {
            return Err(Error::Allocation(format!(
                "The host {} has not been allocated",
                self.target
            )));
        }
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let socket = guard.as_mut().ok_or_else(|| {
            Error::Allocation(format!("The host {} has no connection", self.target))
        })?;
        debug!(target_host = %self.target, request = request.name(), "sending request");
        let response = round_trip(socket, request);
        if matches!(response, Err(Error::Transport(_)) | Err(Error::Allocation(_))) {
            warn!(target_host = %self.target, "connection lost");
            *guard = None;
        }
        response
    }

    /// Performs `request` and checks the response status.
    fn call<T>(
        &self,
        request: &Request,
        read: impl FnOnce(&mut FrameReader<'_>) -> Result<T>,
    ) -> Result<T> {
        let response = self.exchange(request)?;
        let mut reader = FrameReader::new(&response);
        read_status(&mut reader)?;
        read(&mut reader)
    }
}

impl Host for NetHost {
    fn allocate(&self) -> Result<()> {
        let mut guard = self.lock()?;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.connect()?);
        self.allocated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn render(&self, request: &RenderRequest) -> Result<Image> {
        self.call(&Request::Render(request.clone()), read_rendered_image)
    }

    fn reset(&self, id: &str) -> Result<()> {
        self.call(&Request::Reset { id: id.to_string() }, |_| Ok(()))
    }

    fn create_local(&self, sources: &[(String, String)]) -> Result<String> {
        self.call(
            &Request::CreateLocal {
                sources: sources.to_vec(),
            },
            |reader| reader.string(),
        )
    }

    fn get_context(&self, id: &str) -> Result<Box<dyn ContextHandle + '_>> {
        self.call(&Request::GetContext { id: id.to_string() }, |_| Ok(()))?;
        Ok(Box::new(NetContext {
            host: self,
            id: id.to_string(),
        }))
    }
}

fn round_trip(socket: &mut Socket, request: &Request) -> Result<Vec<u8>> {
    socket.send(Message::Binary(request.encode()))?;
    loop {
        match socket.read()? {
            Message::Binary(bytes) => return Ok(bytes),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            Message::Text(_) => return Err(Error::Protocol("unexpected text message".to_string())),
            Message::Close(_) => {
                return Err(Error::Allocation(
                    "Connection closed by the remote host".to_string(),
                ))
            }
        }
    }
}

/// Context of a remote host; each call is one `context` request.
struct NetContext<'a> {
    host: &'a NetHost,
    id: String,
}

impl NetContext<'_> {
    fn send(&self, call: ContextCall) -> Result<()> {
        let request = Request::Context {
            id: self.id.clone(),
            call,
        };
        self.host.call(&request, |_| Ok(()))
    }
}

fn wire_channel(channel: usize) -> Result<u8> {
    u8::try_from(channel).map_err(|_| Error::NotFound(format!("Channel {channel} is not available")))
}

impl ContextHandle for NetContext<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_input(&self, buffer: &str, channel: usize, value: InputValue) -> Result<()> {
        self.send(ContextCall::SetInput {
            buffer: buffer.to_string(),
            channel: wire_channel(channel)?,
            value,
        })
    }

    fn set_input_filter(&self, buffer: &str, channel: usize, min_filter: i32) -> Result<()> {
        self.send(ContextCall::SetInputFilter {
            buffer: buffer.to_string(),
            channel: wire_channel(channel)?,
            min_filter,
        })
    }

    fn reset_input(&self, buffer: &str, channel: usize) -> Result<()> {
        self.send(ContextCall::ResetInput {
            buffer: buffer.to_string(),
            channel: wire_channel(channel)?,
        })
    }
}
