//! The JSON-RPC message model.
//!
//! The editor service core works in terms of these messages; the stream
//! transport (stdio or socket) only needs `Message::read` and
//! `Message::write` for the Content-Length framing.

use std::fmt;
use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A JSON-RPC request ID.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RequestId(IdRepr);

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
enum IdRepr {
    I32(i32),
    String(String),
}

impl From<i32> for RequestId {
    fn from(id: i32) -> RequestId {
        RequestId(IdRepr::I32(id))
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> RequestId {
        RequestId(IdRepr::String(id))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            IdRepr::I32(id) => fmt::Display::fmt(id, f),
            IdRepr::String(id) => fmt::Debug::fmt(id, f),
        }
    }
}

/// JSON-RPC error codes the service uses.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Invalid JSON was received.
    ParseError = -32700,
    /// The method does not exist or is not available.
    MethodNotFound = -32601,
    /// Invalid method parameters.
    InvalidParams = -32602,
    /// Internal error.
    InternalError = -32603,
    /// A notification or request arrived before `initialize`.
    ServerNotInitialized = -32002,
    /// The client cancelled the request, or a later edit obsoleted it.
    RequestCanceled = -32800,
    /// The document changed while the request was in flight.
    ContentModified = -32801,
}

/// The error member of a response.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseError {
    /// The error code.
    pub code: i32,
    /// A short description.
    pub message: String,
    /// Additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// A request from the client.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Request {
    /// The request ID.
    pub id: RequestId,
    /// The method name.
    pub method: String,
    /// The parameters.
    #[serde(default = "JsonValue::default")]
    #[serde(skip_serializing_if = "JsonValue::is_null")]
    pub params: JsonValue,
}

impl Request {
    /// Creates a request.
    pub fn new(id: RequestId, method: impl Into<String>, params: impl Serialize) -> Request {
        Request {
            id,
            method: method.into(),
            params: serde_json::to_value(params).unwrap_or(JsonValue::Null),
        }
    }
}

/// A response to a request.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Response {
    /// The request this responds to.
    pub id: RequestId,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// A successful response.
    pub fn ok(id: RequestId, result: impl Serialize) -> Response {
        Response {
            id,
            result: Some(serde_json::to_value(result).unwrap_or(JsonValue::Null)),
            error: None,
        }
    }

    /// An error response.
    pub fn err(id: RequestId, code: ErrorCode, message: impl Into<String>) -> Response {
        Response {
            id,
            result: None,
            error: Some(ResponseError {
                code: code as i32,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// A notification in either direction.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    /// The method name.
    pub method: String,
    /// The parameters.
    #[serde(default = "JsonValue::default")]
    #[serde(skip_serializing_if = "JsonValue::is_null")]
    pub params: JsonValue,
}

impl Notification {
    /// Creates a notification.
    pub fn new(method: impl Into<String>, params: impl Serialize) -> Notification {
        Notification {
            method: method.into(),
            params: serde_json::to_value(params).unwrap_or(JsonValue::Null),
        }
    }
}

/// Any JSON-RPC message.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Message {
    /// A request.
    Request(Request),
    /// A response.
    Response(Response),
    /// A notification.
    Notification(Notification),
}

impl From<Request> for Message {
    fn from(request: Request) -> Message {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Message {
        Message::Response(response)
    }
}

impl From<Notification> for Message {
    fn from(notification: Notification) -> Message {
        Message::Notification(notification)
    }
}

impl Message {
    /// Reads one Content-Length framed message.
    pub fn read(reader: &mut dyn BufRead) -> io::Result<Option<Message>> {
        let Some(text) = read_msg_text(reader)? else {
            return Ok(None);
        };
        let msg = serde_json::from_str(&text).map_err(invalid_data)?;
        Ok(Some(msg))
    }

    /// Writes one Content-Length framed message.
    pub fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        #[derive(Serialize)]
        struct JsonRpc<'a> {
            jsonrpc: &'static str,
            #[serde(flatten)]
            msg: &'a Message,
        }
        let text = serde_json::to_string(&JsonRpc {
            jsonrpc: "2.0",
            msg: self,
        })
        .map_err(invalid_data)?;
        write_msg_text(writer, &text)
    }
}

fn read_msg_text(inp: &mut dyn BufRead) -> io::Result<Option<String>> {
    let mut size = None;
    let mut buf = String::new();
    loop {
        buf.clear();
        if inp.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        if !buf.ends_with("\r\n") {
            return Err(invalid_data(format!("malformed header: {buf:?}")));
        }
        let line = &buf[..buf.len() - 2];
        if line.is_empty() {
            break;
        }
        let mut parts = line.splitn(2, ": ");
        let name = parts.next().unwrap();
        let value = parts
            .next()
            .ok_or_else(|| invalid_data(format!("malformed header: {line:?}")))?;
        if name.eq_ignore_ascii_case("Content-Length") {
            size = Some(value.parse::<usize>().map_err(invalid_data)?);
        }
    }
    let size = size.ok_or_else(|| invalid_data("no Content-Length"))?;
    let mut buf = buf.into_bytes();
    buf.resize(size, 0);
    inp.read_exact(&mut buf)?;
    let text = String::from_utf8(buf).map_err(invalid_data)?;
    log::debug!("< {text}");
    Ok(Some(text))
}

fn write_msg_text(out: &mut dyn Write, msg: &str) -> io::Result<()> {
    log::debug!("> {msg}");
    write!(out, "Content-Length: {}\r\n\r\n", msg.len())?;
    out.write_all(msg.as_bytes())?;
    out.flush()?;
    Ok(())
}

fn invalid_data(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_round_trip_through_framing() {
        let msg = Message::Request(Request::new(1.into(), "textDocument/hover", ()));
        let mut bytes = Vec::new();
        msg.write(&mut bytes).unwrap();
        let mut reader = std::io::BufReader::new(bytes.as_slice());
        let back = Message::read(&mut reader).unwrap().unwrap();
        let Message::Request(req) = back else {
            panic!("expected a request");
        };
        assert_eq!(req.method, "textDocument/hover");
        assert_eq!(req.id, 1.into());
    }
}
