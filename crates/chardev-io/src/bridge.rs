use crate::endpoint::DeviceEndpoint;
use crate::metrics::BRIDGE_CONNECTED;
use crate::protocol::{decode_payload, encode_payload, Request, Response, StatusMsg};
use std::collections::BTreeSet;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub struct BridgeConfig {
    pub bind_addr: String,
    pub poll_interval: Duration,
    pub max_read_len: usize,
    /// Longest request line accepted before the client is dropped.
    pub max_line_len: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7100".to_string(),
            poll_interval: Duration::from_millis(5),
            max_read_len: 64 * 1024,
            // A base64 write of 64 KiB plus the JSON envelope.
            max_line_len: 64 * 1024 * 4 / 3 + 1024,
        }
    }
}

/// Handles opened by the connected client; released when it goes away.
#[derive(Debug, Default)]
pub struct ClientState {
    handles: BTreeSet<u64>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handles(&self) -> impl Iterator<Item = &u64> {
        self.handles.iter()
    }

    fn release_all(&mut self, endpoint: &DeviceEndpoint) {
        for handle in std::mem::take(&mut self.handles) {
            if endpoint.release(handle).is_ok() {
                debug!(handle, "Released handle of departed client");
            }
        }
    }
}

/// Execute one request against the endpoint.
#[instrument(skip(endpoint, client, max_read_len))]
pub fn dispatch(
    endpoint: &DeviceEndpoint,
    request: Request,
    client: &mut ClientState,
    max_read_len: usize,
) -> Response {
    let result = match request {
        Request::Open {
            minor,
            truncate,
            append,
            flags,
        } => endpoint
            .open(minor, Request::open_flags(truncate, append, flags))
            .map(|handle| {
                client.handles.insert(handle);
                Response::Opened { handle }
            }),
        Request::Read { handle, len } => {
            let mut out = Vec::new();
            endpoint
                .read(handle, len.min(max_read_len), &mut out)
                .map(|count| Response::Data {
                    count,
                    data: encode_payload(&out),
                })
        }
        Request::Write { handle, data } => {
            let payload = match decode_payload(&data) {
                Ok(payload) => payload,
                Err(err) => return err.to_response(),
            };
            endpoint
                .write(handle, payload.as_slice())
                .map(|count| Response::Written { count })
        }
        Request::Seek {
            handle,
            offset,
            whence,
        } => endpoint
            .seek(handle, offset, whence.into())
            .map(|position| Response::Position { position }),
        Request::Release { handle } => endpoint.release(handle).map(|()| {
            client.handles.remove(&handle);
            Response::Released { handle }
        }),
        Request::Status => Ok(Response::Status(StatusMsg::from(&endpoint.status()))),
    };

    result.unwrap_or_else(|err| {
        if err.is_recoverable() {
            debug!(error = %err, errno = err.errno(), "Request failed");
        } else {
            warn!(error = %err, errno = err.errno(), "Request failed permanently");
        }
        Response::from(&err)
    })
}

pub struct Bridge {
    listener: TcpListener,
    config: BridgeConfig,
}

impl Bridge {
    pub fn bind(config: BridgeConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve one client at a time until `stop` is set.
    pub fn run(self, endpoint: Arc<DeviceEndpoint>, stop: Arc<AtomicBool>) {
        info!(addr = ?self.listener.local_addr().ok(), "Bridge listening");

        let mut client: Option<TcpStream> = None;
        let mut recv_buf: Vec<u8> = Vec::with_capacity(4096);
        let mut send_buf: Vec<u8> = Vec::new();
        let mut send_offset: usize = 0;
        let mut state = ClientState::new();

        while !stop.load(Ordering::Relaxed) {
            if client.is_none() {
                match self.listener.accept() {
                    Ok((stream, addr)) => match stream.set_nonblocking(true) {
                        Ok(()) => {
                            info!(client_addr = %addr, "Bridge client connected");
                            client = Some(stream);
                            BRIDGE_CONNECTED.set(1.0);
                        }
                        Err(err) => warn!(error = %err, "Failed to set client nonblocking"),
                    },
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                    Err(err) => warn!(error = %err, "Bridge accept error"),
                }
            }

            let mut drop_client = false;
            if let Some(stream) = client.as_mut() {
                let mut temp = [0u8; 1024];
                match stream.read(&mut temp) {
                    Ok(0) => {
                        info!(open_handles = state.handles().count(), "Bridge client disconnected");
                        drop_client = true;
                    }
                    Ok(n) => {
                        recv_buf.extend_from_slice(&temp[..n]);
                        while let Some(pos) = recv_buf.iter().position(|b| *b == b'\n') {
                            let line = recv_buf.drain(..=pos).collect::<Vec<u8>>();
                            let text = String::from_utf8_lossy(&line);
                            let trimmed = text.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            let response = match Request::parse(trimmed) {
                                Ok(request) => dispatch(
                                    &endpoint,
                                    request,
                                    &mut state,
                                    self.config.max_read_len,
                                ),
                                Err(err) => {
                                    warn!(error = %err, "Rejected bridge request");
                                    err.to_response()
                                }
                            };
                            send_buf.extend_from_slice(&response.to_line());
                        }
                        if recv_buf.len() > self.config.max_line_len {
                            warn!(
                                pending = recv_buf.len(),
                                limit = self.config.max_line_len,
                                "Bridge request line too long, dropping client"
                            );
                            drop_client = true;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                    Err(err) => {
                        warn!(error = %err, "Bridge read error");
                        drop_client = true;
                    }
                }

                if !drop_client && send_offset < send_buf.len() {
                    match stream.write(&send_buf[send_offset..]) {
                        Ok(0) => {
                            info!("Bridge client disconnected");
                            drop_client = true;
                        }
                        Ok(n) => {
                            send_offset += n;
                            if send_offset >= send_buf.len() {
                                send_buf.clear();
                                send_offset = 0;
                            }
                        }
                        Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                        Err(err) => {
                            warn!(error = %err, "Bridge write error");
                            drop_client = true;
                        }
                    }
                }
            }

            if drop_client {
                client = None;
                recv_buf.clear();
                send_buf.clear();
                send_offset = 0;
                state.release_all(&endpoint);
                BRIDGE_CONNECTED.set(0.0);
            }

            std::thread::sleep(self.config.poll_interval);
        }

        state.release_all(&endpoint);
        info!("Bridge stopped");
    }
}
