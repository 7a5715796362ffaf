//! Single-user HTML form that launches runs.
//!
//! `GET /` renders the form pre-filled with the project defaults. `POST /`
//! builds a [`RunConfig`] from the submitted fields, runs it to completion on
//! the server thread and renders the outcome into the same page.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{Defaults, RunConfig};
use crate::run::run;
use crate::stop::StopSignal;

const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub struct WebHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl WebHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("web form thread panicked"))?;
        }
        Ok(())
    }
}

pub struct WebServer {
    addr: String,
    defaults: Defaults,
}

impl WebServer {
    pub fn new(addr: impl Into<String>, defaults: Defaults) -> Self {
        Self {
            addr: addr.into(),
            defaults,
        }
    }

    pub fn spawn(self) -> Result<WebHandle> {
        let configured_addr: SocketAddr = self.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let defaults = self.defaults;
        let join = std::thread::spawn(move || {
            if let Err(err) = serve(listener, &defaults, shutdown_thread) {
                log::error!("web form stopped: {}", err);
            }
        });

        Ok(WebHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn serve(listener: TcpListener, defaults: &Defaults, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, defaults) {
                    log::warn!("web form request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, defaults: &Defaults) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_html_response(&mut stream, 403, "<h1>Forbidden</h1>")?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    if request.path != "/" {
        write_html_response(&mut stream, 404, "<h1>Not Found</h1>")?;
        return Ok(());
    }
    match request.method.as_str() {
        "GET" => {
            let page = render_page(&FormState::from_defaults(defaults), None);
            write_html_response(&mut stream, 200, &page)?;
        }
        "POST" => {
            let fields = parse_form(&request.body);
            let (state, cfg) = form_to_config(&fields, defaults);
            log::info!(
                "form run: source={} weights={} stride={} tracker={} display={} start={:.2} end={:?} log={} progress={}",
                cfg.source.display(),
                cfg.weights.display(),
                cfg.stride,
                cfg.tracker,
                cfg.display,
                cfg.start_seconds,
                cfg.end_seconds,
                cfg.log_destination
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "disabled".to_string()),
                cfg.progress_interval
            );
            let message = run_message(&cfg);
            let page = render_page(&state, Some(&message));
            write_html_response(&mut stream, 200, &page)?;
        }
        _ => {
            write_html_response(&mut stream, 405, "<h1>Method Not Allowed</h1>")?;
        }
    }
    Ok(())
}

/// Run to completion and describe the outcome. Failures become text.
fn run_message(cfg: &RunConfig) -> String {
    match run(cfg, &StopSignal::new()) {
        Ok(summary) => match summary.log_path {
            Some(path) => {
                log::info!("run finished, log saved to {}", path.display());
                format!("Run completed. Log saved to {}", path.display())
            }
            None if summary.logging_enabled => {
                log::info!("run finished without detections to log");
                "Run completed (no detections to log).".to_string()
            }
            None => {
                log::info!("run finished (logging disabled)");
                "Run completed (logging disabled).".to_string()
            }
        },
        Err(err) => {
            log::error!("run failed: {:#}", err);
            format!("Error: {}", err)
        }
    }
}

/// Submitted (or default) field values, echoed back into the form.
#[derive(Clone, Debug, PartialEq)]
pub struct FormState {
    pub source: String,
    pub weights: String,
    pub confidence: String,
    pub start_seconds: String,
    pub end_seconds: String,
    pub stride: String,
    pub tracker: bool,
    pub display: bool,
    pub log_enabled: bool,
    pub log_path: String,
    pub progress_interval: String,
}

impl FormState {
    pub fn from_defaults(defaults: &Defaults) -> Self {
        Self {
            source: defaults.source.display().to_string(),
            weights: defaults.weights.display().to_string(),
            confidence: defaults.confidence.to_string(),
            start_seconds: "0".to_string(),
            end_seconds: String::new(),
            stride: "1".to_string(),
            tracker: false,
            display: false,
            log_enabled: false,
            log_path: String::new(),
            progress_interval: "0".to_string(),
        }
    }
}

pub fn parse_form(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

/// Lenient mapping from form fields to a run: unparsable numbers fall back to
/// defaults, stride is at least 1, checkboxes are on when present.
pub fn form_to_config(fields: &HashMap<String, String>, defaults: &Defaults) -> (FormState, RunConfig) {
    let text = |key: &str| fields.get(key).cloned().unwrap_or_default();
    let fallback = FormState::from_defaults(defaults);
    let state = FormState {
        source: fields.get("source").cloned().unwrap_or(fallback.source),
        weights: fields.get("weights").cloned().unwrap_or(fallback.weights),
        confidence: fields.get("confidence").cloned().unwrap_or(fallback.confidence),
        start_seconds: fields.get("start_seconds").cloned().unwrap_or(fallback.start_seconds),
        end_seconds: text("end_seconds"),
        stride: fields.get("stride").cloned().unwrap_or(fallback.stride),
        tracker: fields.contains_key("tracker"),
        display: fields.contains_key("display"),
        log_enabled: fields.contains_key("log_enabled"),
        log_path: text("log_path"),
        progress_interval: fields
            .get("progress_interval")
            .cloned()
            .unwrap_or(fallback.progress_interval),
    };

    let log_destination = if state.log_enabled {
        Some(path_or(&state.log_path, &defaults.log_dir))
    } else {
        None
    };
    let cfg = RunConfig {
        source: path_or(&state.source, &defaults.source),
        weights: path_or(&state.weights, &defaults.weights),
        confidence: parse_or(&state.confidence, defaults.confidence),
        stride: parse_or::<i64>(&state.stride, 1).max(1) as u64,
        start_seconds: parse_or(&state.start_seconds, 0.0),
        end_seconds: state.end_seconds.trim().parse().ok(),
        tracker: state.tracker,
        display: state.display,
        log_destination,
        progress_interval: parse_or::<i64>(&state.progress_interval, 0).max(0) as u64,
        preview_dir: defaults.preview_dir.clone(),
        font: defaults.font.clone(),
    };
    (state, cfg)
}

fn parse_or<T: std::str::FromStr>(value: &str, default: T) -> T {
    value.trim().parse().unwrap_or(default)
}

fn path_or(value: &str, default: &std::path::Path) -> PathBuf {
    let value = value.trim();
    if value.is_empty() {
        default.to_path_buf()
    } else {
        PathBuf::from(value)
    }
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn render_page(state: &FormState, message: Option<&str>) -> String {
    let text_input = |label: &str, name: &str, value: &str| {
        format!(
            "<label>{label}<input type=\"text\" name=\"{name}\" value=\"{value}\"></label>\n",
            label = label,
            name = name,
            value = escape_html(value)
        )
    };
    let checkbox = |label: &str, name: &str, checked: bool| {
        format!(
            "<label><input type=\"checkbox\" name=\"{name}\"{checked}> {label}</label>\n",
            label = label,
            name = name,
            checked = if checked { " checked" } else { "" }
        )
    };

    let mut page = String::from(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>Fish count runner</title></head>\n<body>\n<h1>Fish count runner</h1>\n",
    );
    if let Some(message) = message {
        page.push_str(&format!("<p class=\"message\">{}</p>\n", escape_html(message)));
    }
    page.push_str("<form method=\"post\" action=\"/\">\n");
    page.push_str(&text_input("Source", "source", &state.source));
    page.push_str(&text_input("Weights", "weights", &state.weights));
    page.push_str(&text_input("Confidence", "confidence", &state.confidence));
    page.push_str(&text_input("Start seconds", "start_seconds", &state.start_seconds));
    page.push_str(&text_input("End seconds", "end_seconds", &state.end_seconds));
    page.push_str(&text_input("Stride", "stride", &state.stride));
    page.push_str(&checkbox("Tracker", "tracker", state.tracker));
    page.push_str(&checkbox("Display", "display", state.display));
    page.push_str(&checkbox("Log to Parquet", "log_enabled", state.log_enabled));
    page.push_str(&text_input("Log path", "log_path", &state.log_path));
    page.push_str(&text_input(
        "Progress interval",
        "progress_interval",
        &state.progress_interval,
    ));
    page.push_str("<button type=\"submit\">Run</button>\n</form>\n</body>\n</html>\n");
    page
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break find_header_end(&data);
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(end) = find_header_end(&data) {
            break Some(end);
        }
    };
    let header_end = header_end.ok_or_else(|| anyhow!("incomplete request"))?;

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = match headers.get("content-length") {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("invalid content-length"))?,
        None => 0,
    };
    let total = (header_end + 4)
        .checked_add(content_length)
        .filter(|total| *total <= MAX_REQUEST_BYTES);
    if total.is_none() {
        return Err(anyhow!("request too large"));
    }
    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn write_html_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "text/html; charset=utf-8", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}
