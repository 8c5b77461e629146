//! Discord RPC IPC transport.
//!
//! Frames are an 8-byte header (opcode then payload length, both u32
//! little-endian) followed by a JSON payload. The socket lives at
//! `$XDG_RUNTIME_DIR/discord-ipc-N` (or a tmpdir fallback, including the
//! flatpak/snap subdirectories) on unix and `\\.\pipe\discord-ipc-N` on
//! Windows, with N in 0..=9.

use std::io;

use byteorder::{ByteOrder, LittleEndian};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const OP_HANDSHAKE: u32 = 0;
pub const OP_FRAME: u32 = 1;
pub const OP_CLOSE: u32 = 2;
pub const OP_PING: u32 = 3;
pub const OP_PONG: u32 = 4;

/// Sanity bound on inbound frames. Activity responses are tiny.
const MAX_FRAME_LEN: usize = 64 * 1024;

pub fn encode_frame(op: u32, payload: &serde_json::Value) -> Vec<u8> {
    let body = payload.to_string().into_bytes();
    let mut buf = vec![0u8; 8 + body.len()];
    LittleEndian::write_u32(&mut buf[0..4], op);
    LittleEndian::write_u32(&mut buf[4..8], body.len() as u32);
    buf[8..].copy_from_slice(&body);
    buf
}

pub fn decode_header(header: &[u8; 8]) -> (u32, u32) {
    (
        LittleEndian::read_u32(&header[0..4]),
        LittleEndian::read_u32(&header[4..8]),
    )
}

pub struct IpcConnection {
    #[cfg(unix)]
    stream: tokio::net::UnixStream,
    #[cfg(windows)]
    stream: tokio::net::windows::named_pipe::NamedPipeClient,
}

impl IpcConnection {
    /// Connects to the first reachable IPC socket. `pipe` pins a single
    /// index; otherwise 0..=9 are tried in order.
    #[cfg(unix)]
    pub async fn connect(pipe: Option<u8>) -> io::Result<Self> {
        use std::path::PathBuf;

        let base = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
            .iter()
            .find_map(std::env::var_os)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"));

        // Sandboxed Discord builds put the socket one level down.
        let dirs = [
            base.clone(),
            base.join("app/com.discordapp.Discord"),
            base.join("snap.discord"),
        ];

        for index in indexes(pipe) {
            for dir in &dirs {
                let path = dir.join(format!("discord-ipc-{index}"));
                if let Ok(stream) = tokio::net::UnixStream::connect(&path).await {
                    tracing::debug!("connected to discord ipc socket {}", path.display());
                    return Ok(Self { stream });
                }
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no discord ipc socket found",
        ))
    }

    #[cfg(windows)]
    pub async fn connect(pipe: Option<u8>) -> io::Result<Self> {
        use tokio::net::windows::named_pipe::ClientOptions;

        for index in indexes(pipe) {
            let path = format!(r"\\.\pipe\discord-ipc-{index}");
            if let Ok(stream) = ClientOptions::new().open(&path) {
                tracing::debug!("connected to discord ipc pipe {}", path);
                return Ok(Self { stream });
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no discord ipc pipe found",
        ))
    }

    pub async fn send(&mut self, op: u32, payload: &serde_json::Value) -> io::Result<()> {
        let frame = encode_frame(op, payload);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await
    }

    pub async fn recv(&mut self) -> io::Result<(u32, serde_json::Value)> {
        let mut header = [0u8; 8];
        self.stream.read_exact(&mut header).await?;
        let (op, len) = decode_header(&header);
        if len as usize > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("ipc frame too large: {len} bytes"),
            ));
        }
        let mut body = vec![0u8; len as usize];
        self.stream.read_exact(&mut body).await?;
        let payload = serde_json::from_slice(&body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok((op, payload))
    }
}

fn indexes(pipe: Option<u8>) -> Vec<u8> {
    match pipe {
        Some(index) => vec![index],
        None => (0..10).collect(),
    }
}
