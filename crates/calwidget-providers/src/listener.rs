//! Local HTTP listener that captures the OAuth redirect.
//!
//! The provider redirects the user's browser to `http://localhost:{port}`
//! with either a `code` or an `error` query parameter. The listener serves
//! exactly that one exchange: it polls a nonblocking accept in a bounded
//! one-second-tick loop (no background thread, no external cancel signal),
//! answers the browser with a small static page, and hands the captured
//! outcome back to the flow.
//!
//! The socket is created with address reuse enabled and is released on
//! every exit path, so a rerun right after a timeout can bind the same
//! port again.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tokio::net::TcpSocket;
use tracing::{debug, warn};

use crate::error::{HelperError, HelperResult};

/// How many one-second ticks to wait for the redirect (5 minutes).
const CALLBACK_TICKS: u32 = 300;

/// Read/write timeout for a single browser connection.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
    <html><body><h1>Authentication successful!</h1>\
    <p>You can close this window.</p></body></html>";

const DENIED_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
    <html><body><h1>Authentication failed</h1>\
    <p>You can close this window.</p></body></html>";

const INVALID_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
    <html><body><h1>Invalid request</h1></body></html>";

/// A captured authorization code, with the `state` parameter if the
/// provider echoed one.
#[derive(Debug)]
pub struct CapturedCode {
    pub code: String,
    pub state: Option<String>,
}

/// Outcome of one handled callback request.
enum Outcome {
    Code(CapturedCode),
    Denied(String),
}

/// The short-lived loopback listener for one OAuth round-trip.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Binds the listener on `127.0.0.1:port` with address reuse enabled.
    ///
    /// Port `0` asks the OS for any free port; [`port`](Self::port) reports
    /// the one actually bound.
    pub fn bind(port: u16) -> HelperResult<Self> {
        let socket = TcpSocket::new_v4()
            .map_err(|e| HelperError::internal(format!("failed to create socket: {}", e)))?;
        socket.set_reuseaddr(true).map_err(|e| {
            HelperError::internal(format!("failed to enable address reuse: {}", e))
        })?;
        socket
            .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .map_err(|e| {
                HelperError::port_exhaustion(format!(
                    "cannot start local callback server on port {}: {}",
                    port, e
                ))
            })?;

        let listener = socket
            .listen(4)
            .and_then(|l| l.into_std())
            .map_err(|e| HelperError::internal(format!("failed to listen: {}", e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| HelperError::internal(format!("failed to set nonblocking: {}", e)))?;

        let port = listener
            .local_addr()
            .map_err(|e| HelperError::internal(format!("failed to read local address: {}", e)))?
            .port();

        debug!("callback listener bound on port {}", port);
        Ok(Self { listener, port })
    }

    /// Returns the bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the redirect URI for this listener with the given path.
    pub fn redirect_uri(&self, path: &str) -> String {
        format!("http://localhost:{}{}", self.port, path)
    }

    /// Waits up to five minutes for the browser redirect.
    ///
    /// Returns the captured code, an [`AuthorizationDenied`] error when the
    /// provider reported one, or an authentication-timeout error when the
    /// window elapses. The socket is dropped on every path.
    ///
    /// [`AuthorizationDenied`]: crate::error::HelperErrorCode::AuthorizationDenied
    pub fn wait_for_code(&self) -> HelperResult<CapturedCode> {
        self.wait_with_ticks(CALLBACK_TICKS)
    }

    fn wait_with_ticks(&self, ticks: u32) -> HelperResult<CapturedCode> {
        let mut outcome: Option<Outcome> = None;

        for _ in 0..ticks {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    handle_request(stream, &mut outcome);
                    match outcome.take() {
                        Some(Outcome::Code(captured)) => return Ok(captured),
                        Some(Outcome::Denied(reason)) => {
                            return Err(HelperError::authorization_denied(format!(
                                "authorization denied: {}",
                                reason
                            )));
                        }
                        // Stray request (favicon and friends); keep waiting.
                        None => {}
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_secs(1));
                }
                Err(e) => {
                    return Err(HelperError::internal(format!(
                        "callback listener failed: {}",
                        e
                    )));
                }
            }
        }

        Err(HelperError::authentication(
            "authentication timeout or cancelled",
        ))
    }
}

/// Parses one HTTP request, answers the browser, and records the outcome in
/// the cell shared with the polling loop.
fn handle_request(mut stream: TcpStream, outcome: &mut Option<Outcome>) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(REQUEST_TIMEOUT));
    let _ = stream.set_write_timeout(Some(REQUEST_TIMEOUT));

    let mut request_line = String::new();
    if BufReader::new(&stream).read_line(&mut request_line).is_err() {
        return;
    }

    // Request line: GET /oauth-callback?code=...&state=... HTTP/1.1
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "GET" {
        respond(&mut stream, INVALID_PAGE);
        return;
    }

    let params = parse_query(parts[1]);

    if let Some(code) = params.get("code") {
        respond(&mut stream, SUCCESS_PAGE);
        *outcome = Some(Outcome::Code(CapturedCode {
            code: code.clone(),
            state: params.get("state").cloned(),
        }));
    } else if let Some(error) = params.get("error") {
        warn!("callback reported error: {}", error);
        respond(&mut stream, DENIED_PAGE);
        *outcome = Some(Outcome::Denied(error.clone()));
    } else {
        respond(&mut stream, INVALID_PAGE);
    }
}

/// Extracts decoded query parameters from a request path.
fn parse_query(path: &str) -> HashMap<String, String> {
    let query = match path.find('?') {
        Some(i) => &path[i + 1..],
        None => return HashMap::new(),
    };

    query
        .split('&')
        .filter_map(|param| {
            let mut kv = param.splitn(2, '=');
            let key = kv.next()?;
            let value = kv.next()?;
            Some((
                urlencoding::decode(key).unwrap_or_default().into_owned(),
                urlencoding::decode(value).unwrap_or_default().into_owned(),
            ))
        })
        .collect()
}

fn respond(stream: &mut TcpStream, page: &str) {
    let _ = stream.write_all(page.as_bytes());
    let _ = stream.flush();
}
