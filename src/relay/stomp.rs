// STOMP 1.2 frame codec for the relay connection
// Only the frames the chat exchange actually uses are modelled here.

use thiserror::Error;

/// Frame commands exchanged with the relay.
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const SEND: &str = "SEND";
    pub const MESSAGE: &str = "MESSAGE";
    pub const ERROR: &str = "ERROR";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is missing the NUL terminator")]
    MissingTerminator,
    #[error("frame has no command line")]
    MissingCommand,
    #[error("frame has no blank line separating headers from body")]
    MissingHeaderSeparator,
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),
    #[error("invalid header escape sequence in {0:?}")]
    InvalidEscape(String),
}

/// A single STOMP frame. Header order is preserved; on repeated header
/// names the first occurrence wins, as STOMP 1.2 requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: &str) -> Frame {
        Frame {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Frame {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// The CONNECT frame opening a relay session. The bearer token rides in
    /// an Authorization header, mirroring the HTTP upgrade request.
    pub fn connect(host: &str, token: Option<&str>) -> Frame {
        let mut frame = Frame::new(commands::CONNECT)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0");
        if let Some(token) = token {
            frame = frame.with_header("Authorization", &format!("Bearer {}", token));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Frame {
        Frame::new(commands::SUBSCRIBE)
            .with_header("id", id)
            .with_header("destination", destination)
    }

    pub fn send(destination: &str, body: String) -> Frame {
        let mut frame = Frame::new(commands::SEND)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_header("content-length", &body.len().to_string());
        frame.body = body;
        frame
    }

    /// First value for a header name, unescaped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(&escape_header(name));
            out.push(':');
            out.push_str(&escape_header(value));
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    pub fn parse(raw: &str) -> Result<Frame, FrameError> {
        // The body runs up to the NUL octet; servers may append EOL padding
        // after it, which is discarded.
        let raw = match raw.find('\0') {
            Some(index) => &raw[..index],
            None => return Err(FrameError::MissingTerminator),
        };
        let (head, body) = raw
            .split_once("\n\n")
            .ok_or(FrameError::MissingHeaderSeparator)?;
        let mut lines = head.lines();
        let command = match lines.next() {
            Some(line) if !line.trim().is_empty() => line.trim_end_matches('\r').to_string(),
            _ => return Err(FrameError::MissingCommand),
        };
        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            headers.push((unescape_header(name)?, unescape_header(value)?));
        }
        Ok(Frame {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}
