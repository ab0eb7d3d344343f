use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    /// Restricts `sync` to one group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Applies changes for this `sync` regardless of the gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

impl DaemonRequest {
    pub fn command(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            ..Self::default()
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Attempts made by [`request_status`] while the socket comes up.
const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

fn connect(home: &Path) -> Result<(UnixStream, PathBuf), DaemonError> {
    let socket = socket_path(home);
    match UnixStream::connect(&socket) {
        Ok(stream) => Ok((stream, socket)),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
            ) =>
        {
            Err(DaemonError::DaemonNotRunning { socket })
        }
        Err(err) => Err(io_err(&socket, err)),
    }
}

/// Write `request` as one line and read back exactly one response line.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let (mut stream, socket) = connect(home)?;

    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    stream
        .write_all(&line)
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(&socket, e))?;

    let reply = BufReader::new(stream)
        .lines()
        .next()
        .transpose()
        .map_err(|e| io_err(&socket, e))?
        .ok_or_else(|| DaemonError::Protocol("daemon hung up without a reply".to_string()))?;
    Ok(serde_json::from_str(&reply)?)
}

/// Send `request` and unwrap the response payload.
fn call(home: &Path, request: &DaemonRequest) -> Result<Value, DaemonError> {
    let response = send_request(home, request)?;
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    let message = response
        .error
        .unwrap_or_else(|| "daemon rejected the request".to_string());
    Err(DaemonError::Protocol(message))
}

/// Query daemon state, retrying briefly while the socket comes up.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::command("status");
    let mut attempt = 1;
    loop {
        match call(home, &request) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                sleep(STATUS_RETRY_DELAY);
            }
            result => return result,
        }
    }
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    call(home, &DaemonRequest::command("stop")).map(drop)
}

/// Ask the daemon to run a cycle now and wait for its summary.
pub fn request_sync(home: &Path, group: Option<String>, force: bool) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        group,
        force: force.then_some(true),
        ..DaemonRequest::command("sync")
    };
    call(home, &request)
}

/// Flip the apply gate. Returns `{ "apply_enabled": .., "previous": .. }`.
pub fn request_gate(home: &Path, enabled: bool) -> Result<Value, DaemonError> {
    let cmd = if enabled { "enable" } else { "disable" };
    call(home, &DaemonRequest::command(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bare_command_omits_optional_fields() {
        let encoded = serde_json::to_string(&DaemonRequest::command("status")).expect("encode");
        assert_eq!(encoded, r#"{"cmd":"status"}"#);
    }

    #[test]
    fn sync_request_decodes_group_and_force() {
        let request: DaemonRequest =
            serde_json::from_str(r#"{"cmd":"sync","group":"nfi","force":true}"#).expect("decode");
        assert_eq!(request.group.as_deref(), Some("nfi"));
        assert_eq!(request.force, Some(true));
    }

    #[test]
    fn missing_socket_means_not_running() {
        let home = TempDir::new().expect("home");
        let err = send_request(home.path(), &DaemonRequest::command("status")).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }

    #[test]
    fn stale_socket_file_means_not_running() {
        let home = TempDir::new().expect("home");
        let socket = socket_path(home.path());
        std::fs::create_dir_all(socket.parent().expect("parent")).expect("mkdir");
        drop(std::os::unix::net::UnixListener::bind(&socket).expect("bind"));

        let err = request_stop(home.path()).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        use std::os::unix::net::UnixListener;

        let home = TempDir::new().expect("home");
        let socket = socket_path(home.path());
        std::fs::create_dir_all(socket.parent().expect("parent")).expect("mkdir");
        let listener = UnixListener::bind(&socket).expect("bind");
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut request = String::new();
            BufReader::new(&stream).read_line(&mut request).expect("read");
            let reply = serde_json::to_string(&DaemonResponse::error("unknown group 'x'"))
                .expect("encode");
            (&stream).write_all(format!("{reply}\n").as_bytes()).expect("write");
            request
        });

        let err = request_sync(home.path(), Some("x".to_string()), false).unwrap_err();
        assert_eq!(err.to_string(), "daemon protocol error: unknown group 'x'");
        let request = server.join().expect("server");
        assert_eq!(request.trim_end(), r#"{"cmd":"sync","group":"x"}"#);
    }
}
