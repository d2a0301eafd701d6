//! A loopback HTTP registry for tests.
//!
//! Serves fixed responses per path over plain HTTP/1.1 on `127.0.0.1`, honours
//! `If-None-Match` with `304 Not Modified`, and counts requests per path. Responses can
//! be scripted to fail a number of times before succeeding.

use crate::utils::fs::content_checksum;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct Route {
    status: u16,
    body: Vec<u8>,
    etag: Option<String>,
    /// Older ETags still answered with `304`
    accepted: Vec<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    routes: HashMap<String, Route>,
    scripted: HashMap<String, VecDeque<u16>>,
    requests: HashMap<String, usize>,
}

/// Loopback registry; the server task stops when the value is dropped.
#[derive(Debug)]
pub struct TestRegistry {
    addr: SocketAddr,
    state: Arc<Mutex<RegistryState>>,
    handle: JoinHandle<()>,
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl TestRegistry {
    /// Binds an ephemeral port and starts serving.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(RegistryState::default()));

        let server_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&server_state);
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// Base URL, e.g. `http://127.0.0.1:40123`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Serves `body` at `path` with status 200 and an ETag derived from the body.
    pub fn set(&self, path: &str, body: impl Into<Vec<u8>>) {
        let body = body.into();
        let etag = format!("\"{}\"", content_checksum(&body).trim_start_matches("sha256:"));
        self.set_with_etag(path, body, Some(&etag));
    }

    /// Serves `body` at `path` with status 200 and the given validator.
    pub fn set_with_etag(&self, path: &str, body: impl Into<Vec<u8>>, etag: Option<&str>) {
        self.state().routes.insert(
            path.to_string(),
            Route {
                status: 200,
                body: body.into(),
                etag: etag.map(str::to_string),
                accepted: Vec::new(),
            },
        );
    }

    /// Gives `path` a new ETag while still answering `304` to the previous one, so the
    /// new validator arrives on a `Not Modified` response.
    pub fn rotate_etag(&self, path: &str, etag: &str) {
        let mut state = self.state();
        if let Some(route) = state.routes.get_mut(path)
            && let Some(previous) = route.etag.replace(etag.to_string())
        {
            route.accepted.push(previous);
        }
    }

    /// Answers every request for `path` with `status` and an empty body.
    pub fn set_status(&self, path: &str, status: u16) {
        self.state().routes.insert(
            path.to_string(),
            Route {
                status,
                body: Vec::new(),
                etag: None,
                accepted: Vec::new(),
            },
        );
    }

    /// Answers the next `times` requests for `path` with `status` before falling back
    /// to the configured route.
    pub fn fail_next(&self, path: &str, status: u16, times: usize) {
        self.state().scripted.entry(path.to_string()).or_default().extend(std::iter::repeat_n(status, times));
    }

    /// Publishes `name@reference` under the registry convention: a header document at
    /// `/{name}/{reference}/tdpm.json` and content at `/{name}/{reference}/index.d.ts`.
    pub fn publish(&self, name: &str, reference: &str, header: &str, content: &str) {
        self.set(&format!("/{name}/{reference}/tdpm.json"), header);
        self.set(&format!("/{name}/{reference}/index.d.ts"), content);
    }

    /// Requests received for `path`.
    #[must_use]
    pub fn requests(&self, path: &str) -> usize {
        self.state().requests.get(path).copied().unwrap_or_default()
    }

    /// Requests received across all paths.
    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.state().requests.values().sum()
    }
}

async fn serve(stream: TcpStream, state: Arc<Mutex<RegistryState>>) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();

    let mut if_none_match = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("if-none-match")
        {
            if_none_match = Some(value.trim().to_string());
        }
    }

    let (status, body, etag) = {
        let mut state = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *state.requests.entry(path.clone()).or_default() += 1;
        let scripted = state.scripted.get_mut(&path).and_then(VecDeque::pop_front);
        match (scripted, state.routes.get(&path)) {
            (Some(status), _) => (status, Vec::new(), None),
            (None, Some(route))
                if route.etag.is_some()
                    && (route.etag == if_none_match
                        || if_none_match.as_ref().is_some_and(|tag| route.accepted.contains(tag))) =>
            {
                (304, Vec::new(), route.etag.clone())
            }
            (None, Some(route)) => (route.status, route.body.clone(), route.etag.clone()),
            (None, None) => (404, Vec::new(), None),
        }
    };

    let mut head = format!(
        "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reason(status),
        body.len()
    );
    if let Some(etag) = etag {
        head.push_str(&format!("ETag: {etag}\r\n"));
    }
    head.push_str("\r\n");

    let mut stream = reader.into_inner();
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}

const fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        304 => "Not Modified",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
