// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! QEMU guest agent (QGA) client.
//!
//! Line-delimited JSON over the agent's virtio-serial unix socket. One
//! request at a time; callers serialize access through the driver's guest
//! mutex. Payloads (`input-data`, `out-data`, `err-data`) are base64.

use crate::DriverError;
use base64::Engine;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

/// Result of `guest-exec-status` for one guest process.
#[derive(Debug, Clone, Default)]
pub(crate) struct GuestExecStatus {
    pub exited: bool,
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

pub(crate) struct QgaClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl QgaClient {
    pub async fn connect(path: &std::path::Path) -> Result<Self, DriverError> {
        let stream = UnixStream::connect(path).await?;
        let (read, write) = stream.into_split();
        Ok(Self { reader: BufReader::new(read), writer: write })
    }

    /// Issue one QGA command and return its `return` payload.
    pub async fn execute(&mut self, command: &str, arguments: Value) -> Result<Value, DriverError> {
        let request = if arguments.is_null() {
            json!({ "execute": command })
        } else {
            json!({ "execute": command, "arguments": arguments })
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| DriverError::Backend(format!("qga encode failed: {}", e)))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        let mut response = String::new();
        let n = self.reader.read_line(&mut response).await?;
        if n == 0 {
            return Err(DriverError::Backend("qga socket closed".to_string()));
        }
        let value: Value = serde_json::from_str(response.trim())
            .map_err(|e| DriverError::Backend(format!("qga decode failed: {}", e)))?;
        if let Some(error) = value.get("error") {
            return Err(DriverError::Backend(format!("qga {} failed: {}", command, error)));
        }
        Ok(value.get("return").cloned().unwrap_or(Value::Null))
    }

    /// Liveness probe.
    pub async fn ping(&mut self) -> Result<(), DriverError> {
        self.execute("guest-ping", Value::Null).await.map(|_| ())
    }

    /// Start a guest process with captured output. Returns the guest PID.
    pub async fn exec(
        &mut self,
        path: &str,
        args: &[String],
        env: &[String],
        input: Option<&[u8]>,
    ) -> Result<i64, DriverError> {
        let mut arguments = json!({
            "path": path,
            "arg": args,
            "env": env,
            "capture-output": true,
        });
        if let Some(input) = input {
            arguments["input-data"] =
                Value::String(base64::engine::general_purpose::STANDARD.encode(input));
        }
        let ret = self.execute("guest-exec", arguments).await?;
        ret.get("pid")
            .and_then(Value::as_i64)
            .ok_or_else(|| DriverError::Backend(format!("guest-exec returned no pid: {}", ret)))
    }

    /// Poll a guest process. Output data is only present once exited — and
    /// the agent forgets the process after reporting it, so callers must
    /// cache the terminal result.
    pub async fn exec_status(&mut self, pid: i64) -> Result<GuestExecStatus, DriverError> {
        let ret = self.execute("guest-exec-status", json!({ "pid": pid })).await?;
        let exited = ret.get("exited").and_then(Value::as_bool).unwrap_or(false);
        let mut status = GuestExecStatus {
            exited,
            exit_code: ret.get("exitcode").and_then(Value::as_i64).unwrap_or(-1),
            ..Default::default()
        };
        if !exited {
            return Ok(status);
        }
        if let Some(data) = ret.get("out-data").and_then(Value::as_str) {
            status.stdout = decode_b64(data)?;
        }
        if let Some(data) = ret.get("err-data").and_then(Value::as_str) {
            status.stderr = decode_b64(data)?;
        }
        // Killed by signal: no exitcode, report like a crash.
        if ret.get("exitcode").is_none() {
            status.exit_code = -1;
        }
        Ok(status)
    }
}

fn decode_b64(data: &str) -> Result<Vec<u8>, DriverError> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| DriverError::Backend(format!("qga payload decode failed: {}", e)))
}

#[cfg(test)]
#[path = "qga_tests.rs"]
mod tests;
