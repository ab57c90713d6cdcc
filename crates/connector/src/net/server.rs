use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use tungstenite::{accept, Error as WsError, Message, WebSocket};

use super::frame::FrameReader;
use super::protocol::{
    error_response, id_response, image_response, ok_response, ContextCall, Request,
};
use crate::error::{Error, Result};
use crate::host::Host;

/// Port `stc serve` listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 13710;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serves one host to websocket clients, one request at a time.
pub struct HostServer {
    listener: TcpListener,
    host: Arc<dyn Host>,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl HostServer {
    pub fn bind(address: impl ToSocketAddrs + std::fmt::Display, host: Arc<dyn Host>) -> Result<Self> {
        let listener = TcpListener::bind(&address)
            .map_err(|err| Error::Allocation(format!("Could not bind {address}: {err}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| Error::Allocation(format!("Could not configure {address}: {err}")))?;
        Ok(Self {
            listener,
            host,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// How long to sleep when no client or request is pending.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|err| Error::Allocation(format!("Listener has no address: {err}")))
    }

    /// Setting the flag makes [`serve`](Self::serve) return at its next poll.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Accepts clients until stopped. Request failures never end the loop.
    pub fn serve(&self) -> Result<()> {
        info!(address = %self.local_addr()?, "serving host");
        while !self.stopped() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(%peer, "client connected");
                    self.serve_client(stream, peer);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(self.poll_interval);
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    thread::sleep(self.poll_interval);
                }
            }
        }
        info!("server stopped");
        Ok(())
    }

    fn serve_client(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(err) = stream.set_nonblocking(false) {
            warn!(%peer, error = %err, "could not configure client socket");
            return;
        }
        let mut ws = match accept(stream) {
            Ok(ws) => ws,
            Err(err) => {
                warn!(%peer, error = %err, "websocket handshake failed");
                return;
            }
        };
        if let Err(err) = ws.get_mut().set_nonblocking(true) {
            warn!(%peer, error = %err, "could not configure client socket");
            return;
        }

        while !self.stopped() {
            match ws.read() {
                Ok(Message::Binary(bytes)) => {
                    let response = handle_request(self.host.as_ref(), &bytes);
                    if let Err(err) = send_blocking(&mut ws, response) {
                        warn!(%peer, error = %err, "could not send response");
                        break;
                    }
                }
                Ok(Message::Text(_)) => {
                    let response = error_response("Requests must be binary messages");
                    if let Err(err) = send_blocking(&mut ws, response) {
                        warn!(%peer, error = %err, "could not send response");
                        break;
                    }
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(_)) => {
                    info!(%peer, "client disconnected");
                    break;
                }
                Err(WsError::Io(ref io)) if io.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(self.poll_interval);
                }
                Err(WsError::AlreadyClosed) | Err(WsError::ConnectionClosed) => {
                    info!(%peer, "client disconnected");
                    break;
                }
                Err(err) => {
                    warn!(%peer, error = %err, "dropping client");
                    break;
                }
            }
        }
    }
}

/// Writes a whole response, blocking until it is flushed.
fn send_blocking(ws: &mut WebSocket<TcpStream>, response: Vec<u8>) -> std::result::Result<(), WsError> {
    ws.get_mut().set_nonblocking(false)?;
    let sent = ws.send(Message::Binary(response));
    ws.get_mut().set_nonblocking(true)?;
    sent
}

/// Runs one encoded request against `host` and encodes the reply.
///
/// Failures are answered with `ERROR` and the message; segments left unread
/// by a failed request are discarded.
pub fn handle_request(host: &dyn Host, bytes: &[u8]) -> Vec<u8> {
    let mut reader = FrameReader::new(bytes);
    match dispatch(host, &mut reader) {
        Ok(response) => response,
        Err(err) => {
            let drained = reader.drain();
            debug!(drained, error = %err, "request failed");
            error_response(&err.to_string())
        }
    }
}

fn dispatch(host: &dyn Host, reader: &mut FrameReader<'_>) -> Result<Vec<u8>> {
    let request = Request::decode(reader)?;
    debug!(request = request.name(), "handling request");
    match request {
        Request::Render(render) => Ok(image_response(&host.render(&render)?)),
        Request::Reset { id } => {
            host.reset(&id)?;
            Ok(ok_response())
        }
        Request::CreateLocal { sources } => Ok(id_response(&host.create_local(&sources)?)),
        Request::GetContext { id } => {
            host.get_context(&id)?;
            Ok(ok_response())
        }
        Request::Context { id, call } => {
            let context = host.get_context(&id)?;
            match call {
                ContextCall::SetInput {
                    buffer,
                    channel,
                    value,
                } => context.set_input(&buffer, channel.into(), value)?,
                ContextCall::SetInputFilter {
                    buffer,
                    channel,
                    min_filter,
                } => context.set_input_filter(&buffer, channel.into(), min_filter)?,
                ContextCall::ResetInput { buffer, channel } => {
                    context.reset_input(&buffer, channel.into())?
                }
            }
            Ok(ok_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use renderer::{gl, Backend};
    use shadertoy::AssetCache;

    use super::*;
    use crate::host::{LocalHost, LocalHostOptions, RenderRequest};
    use crate::image::Image;
    use crate::input::InputValue;
    use crate::net::frame::FrameWriter;
    use crate::net::protocol::read_status;
    use crate::net::NetHost;
    use crate::testing::{FakeBackend, FakeCatalog};

    fn local_host(scratch: &std::path::Path) -> Arc<LocalHost> {
        let mut options = LocalHostOptions::new(AssetCache::new(scratch.join("assets")));
        options.scratch_dir = scratch.to_path_buf();
        options.width = 4;
        options.height = 4;
        let backend = Arc::new(FakeBackend::new());
        let host = LocalHost::with_backend_factory(
            Arc::new(FakeCatalog::new()),
            options,
            Box::new(move || Ok(backend.clone() as Arc<dyn Backend>)),
        );
        host.allocate().unwrap();
        Arc::new(host)
    }

    fn status(response: &[u8]) -> Result<()> {
        read_status(&mut FrameReader::new(response))
    }

    #[test]
    fn unknown_requests_get_an_error_reply() {
        let scratch = tempfile::tempdir().unwrap();
        let host = local_host(scratch.path());
        let request = FrameWriter::new().string("explode").string("extra").finish();
        let err = status(&handle_request(host.as_ref(), &request)).unwrap_err();
        assert!(matches!(err, Error::Remote(ref message) if message == "Unknown request name"));
    }

    #[test]
    fn failed_requests_do_not_poison_the_next_one() {
        let scratch = tempfile::tempdir().unwrap();
        let host = local_host(scratch.path());

        let bad = Request::Reset {
            id: "localshader-0-0".into(),
        }
        .encode();
        let err = status(&handle_request(host.as_ref(), &bad)).unwrap_err();
        assert_eq!(err.to_string(), "Cannot reset a local context.");

        let create = Request::CreateLocal {
            sources: vec![("image".into(), "// image".into())],
        }
        .encode();
        let response = handle_request(host.as_ref(), &create);
        let mut reader = FrameReader::new(&response);
        read_status(&mut reader).unwrap();
        assert!(reader.string().unwrap().starts_with("localshader-"));
    }

    #[test]
    fn last_frame_index_renders_and_host_stays_usable() {
        let scratch = tempfile::tempdir().unwrap();
        let host = local_host(scratch.path());
        let id = host
            .create_local(&[("image".to_string(), "// image".to_string())])
            .unwrap();

        let request = Request::Render(RenderRequest::new(&id, 2, 2).with_frame(i32::MAX)).encode();
        status(&handle_request(host.as_ref(), &request)).unwrap();

        let next = Request::Render(RenderRequest::new(&id, 2, 2).with_frame(0)).encode();
        status(&handle_request(host.as_ref(), &next)).unwrap();
    }

    #[test]
    fn oversized_input_images_get_an_error_reply() {
        let scratch = tempfile::tempdir().unwrap();
        let host = local_host(scratch.path());
        let id = host
            .create_local(&[("image".to_string(), "// image".to_string())])
            .unwrap();

        let request = FrameWriter::new()
            .string("context")
            .string(&id)
            .string("set_input")
            .string("image")
            .u8(0)
            .string("image")
            .dims([u32::MAX; 3])
            .floats(&[])
            .finish();
        let err = status(&handle_request(host.as_ref(), &request)).unwrap_err();
        assert!(matches!(err, Error::Remote(ref message) if message.contains("too large")));

        let reset = Request::Context {
            id,
            call: ContextCall::ResetInput {
                buffer: "image".into(),
                channel: 0,
            },
        }
        .encode();
        status(&handle_request(host.as_ref(), &reset)).unwrap();
    }

    #[test]
    fn serves_a_net_host_end_to_end() {
        let scratch = tempfile::tempdir().unwrap();
        let server = HostServer::bind("127.0.0.1:0", local_host(scratch.path()))
            .unwrap()
            .with_poll_interval(Duration::from_millis(5));
        let address = server.local_addr().unwrap();
        let stop = server.stop_handle();
        let worker = thread::spawn(move || server.serve());

        let client = NetHost::new(format!("ws://{address}"));
        client.allocate().unwrap();

        let id = client
            .create_local(&[("image".to_string(), "// image".to_string())])
            .unwrap();
        let context = client.get_context(&id).unwrap();
        let picture = Image::from_data([1, 1, 1], vec![0.5]).unwrap();
        context.set_input("image", 0, InputValue::Image(picture)).unwrap();

        let image = client
            .render(&RenderRequest::new(&id, 3, 2).with_frame(5).with_format(gl::RGBA))
            .unwrap();
        assert_eq!(image.dims(), [2, 3, 4]);
        assert_eq!(image.pixel(0, 0).unwrap()[2], 5.0);
        assert_eq!(image.pixel(0, 0).unwrap()[3], 0.5);
        assert_eq!(image.frame_timing(), crate::testing::FAKE_ELAPSED_NS);

        let err = client.reset(&id).unwrap_err();
        assert!(matches!(err, Error::Remote(ref message) if message == "Cannot reset a local context."));

        let err = context.set_input_filter("image", 2, gl::NEAREST).unwrap_err();
        assert!(matches!(err, Error::Remote(_)));

        let image = client.render(&RenderRequest::new(&id, 3, 2)).unwrap();
        assert_eq!(image.pixel(0, 0).unwrap()[2], 6.0);

        drop(context);
        drop(client);
        stop.store(true, Ordering::SeqCst);
        worker.join().unwrap().unwrap();
    }
}
