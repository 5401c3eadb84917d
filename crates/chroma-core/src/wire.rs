//! Chroma wire format: framing for one image transfer per connection.
//!
//! These types ARE the protocol. A request frame is, all integers big-endian:
//!
//! ```text
//! ┌──────────────┬─────────────────┬─────────────┬────────────────┐
//! │ name_len u32 │ name (name_len) │ size i64    │ payload (size) │
//! └──────────────┴─────────────────┴─────────────┴────────────────┘
//! ```
//!
//! The response is a single UTF-8 status line. The server closes the
//! connection after writing it.
//!
//! A stream read may return fewer bytes than requested. Every field is read
//! with read-fully semantics, and the payload loop only ends at exactly
//! `declared_size` bytes or at a framing failure.

use std::fmt;
use std::io;
use std::mem::size_of;
use std::path::Path;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use zerocopy::byteorder::{BigEndian, I64, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Fixed-width fields ───────────────────────────────────────────────────────

/// Length of the client-supplied name that follows.
///
/// Wire size: 4 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct NameLength {
    /// Valid range is 1..=MAX_NAME_LEN. Anything else fails the frame
    /// before the name is read.
    pub value: U32<BigEndian>,
}

assert_eq_size!(NameLength, [u8; 4]);

/// Number of payload bytes that follow the name.
///
/// Wire size: 8 bytes. Signed on the wire; negative values are rejected.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct DeclaredSize {
    pub value: I64<BigEndian>,
}

assert_eq_size!(DeclaredSize, [u8; 8]);

// ── Constants ─────────────────────────────────────────────────────────────────

/// Largest accepted name length in bytes.
pub const MAX_NAME_LEN: u32 = 1024;

/// Default payload transfer chunk. At most this much payload is held in
/// memory per connection.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default TCP port for the image service.
pub const DEFAULT_PORT: u16 = 1717;

/// Default per-step read timeout in seconds.
pub const FRAME_TIMEOUT_SECS: u64 = 30;

/// Default bound in seconds on the whole payload step, however the bytes
/// are paced.
pub const PAYLOAD_TIMEOUT_SECS: u64 = 300;

/// Upper bound on a response line read by the client.
pub const MAX_RESPONSE_LEN: usize = 4096;

// ── Frame types ───────────────────────────────────────────────────────────────

/// The header of a transfer request: everything before the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw name bytes as sent by the client. Not necessarily UTF-8 and not
    /// necessarily a safe path segment.
    pub name: Vec<u8>,
    pub declared_size: u64,
}

impl FrameHeader {
    pub fn new(name: impl Into<Vec<u8>>, declared_size: u64) -> Self {
        Self {
            name: name.into(),
            declared_size,
        }
    }

    /// Encode the name length, name and size fields.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let name_len = checked_name_len(self.name.len())?;
        let size = i64::try_from(self.declared_size)
            .map_err(|_| ProtocolError::SizeOverflow(self.declared_size))?;

        let mut buf = BytesMut::with_capacity(
            size_of::<NameLength>() + self.name.len() + size_of::<DeclaredSize>(),
        );
        buf.put_slice(
            NameLength {
                value: U32::new(name_len),
            }
            .as_bytes(),
        );
        buf.put_slice(&self.name);
        buf.put_slice(
            DeclaredSize {
                value: I64::new(size),
            }
            .as_bytes(),
        );
        Ok(buf.freeze())
    }
}

/// Result of a complete payload transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadReceipt {
    pub bytes: u64,
    /// BLAKE3 hash of the payload bytes, computed while streaming.
    pub digest: [u8; 32],
}

/// Which part of the frame was being read when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    NameLength,
    Name,
    Size,
    Payload,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Field::NameLength => "name length",
            Field::Name => "name",
            Field::Size => "size",
            Field::Payload => "payload",
        };
        f.write_str(s)
    }
}

/// Tunables applied to every frame read.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    /// Payload bytes moved per read/write step.
    pub chunk_size: usize,
    /// Bound on each header field read and on each payload chunk read.
    pub read_timeout: Duration,
    /// Deadline for the payload as a whole, measured from its first read.
    pub payload_timeout: Duration,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: Duration::from_secs(FRAME_TIMEOUT_SECS),
            payload_timeout: Duration::from_secs(PAYLOAD_TIMEOUT_SECS),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Framing failures. Every variant is fatal to the connection it occurred on.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid name length {0} (expected 1..={})", MAX_NAME_LEN)]
    InvalidNameLength(usize),

    #[error("invalid declared size {0}")]
    InvalidSize(i64),

    #[error("declared size {0} does not fit the signed size field")]
    SizeOverflow(u64),

    #[error("connection closed while reading {0}")]
    HeaderIncomplete(Field),

    #[error("truncated transfer: received {received} of {expected} bytes")]
    TruncatedTransfer { expected: u64, received: u64 },

    #[error("timed out after {secs}s reading {field}")]
    Timeout { field: Field, secs: u64 },

    #[error("body ended after {sent} of {declared} declared bytes")]
    SizeMismatch { declared: u64, sent: u64 },

    #[error("payload sink failed: {0}")]
    Sink(#[source] io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

fn checked_name_len(len: usize) -> Result<u32, ProtocolError> {
    match u32::try_from(len) {
        Ok(n) if n != 0 && n <= MAX_NAME_LEN => Ok(n),
        _ => Err(ProtocolError::InvalidNameLength(len)),
    }
}

// ── Decoding (server side) ────────────────────────────────────────────────────

async fn read_field<R>(
    reader: &mut R,
    buf: &mut [u8],
    field: Field,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, reader.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::HeaderIncomplete(field))
        }
        Ok(Err(e)) => Err(ProtocolError::Io(e)),
        Err(_) => Err(ProtocolError::Timeout {
            field,
            secs: timeout.as_secs(),
        }),
    }
}

/// Read and validate the name length, name and size fields.
///
/// An invalid name length is reported before the name is read, so no byte
/// past the length prefix is consumed.
pub async fn read_header<R>(reader: &mut R, limits: &FrameLimits) -> Result<FrameHeader, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut name_len = NameLength::new_zeroed();
    read_field(
        reader,
        name_len.as_bytes_mut(),
        Field::NameLength,
        limits.read_timeout,
    )
    .await?;
    let name_len = checked_name_len(name_len.value.get() as usize)?;

    let mut name = vec![0u8; name_len as usize];
    read_field(reader, &mut name, Field::Name, limits.read_timeout).await?;

    let mut size = DeclaredSize::new_zeroed();
    read_field(reader, size.as_bytes_mut(), Field::Size, limits.read_timeout).await?;
    let size = size.value.get();
    if size < 0 {
        return Err(ProtocolError::InvalidSize(size));
    }

    Ok(FrameHeader {
        name,
        declared_size: size as u64,
    })
}

/// Copy exactly `declared_size` payload bytes from `reader` into `sink`.
///
/// A zero-length read or a read error before the count is reached is a
/// truncated transfer. Each read waits at most `read_timeout`, and the
/// whole step ends at `payload_timeout`. The caller owns cleanup of whatever
/// reached the sink.
pub async fn read_payload<R, W>(
    reader: &mut R,
    sink: &mut W,
    declared_size: u64,
    limits: &FrameLimits,
) -> Result<PayloadReceipt, ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; limits.chunk_size.max(1)];
    let mut hasher = blake3::Hasher::new();
    let mut received: u64 = 0;
    let deadline = Instant::now() + limits.payload_timeout;

    while received < declared_size {
        let want = (declared_size - received).min(buf.len() as u64) as usize;
        let step = (Instant::now() + limits.read_timeout).min(deadline);
        let n = match tokio::time::timeout_at(step, reader.read(&mut buf[..want])).await {
            Ok(Ok(0)) | Ok(Err(_)) => {
                return Err(ProtocolError::TruncatedTransfer {
                    expected: declared_size,
                    received,
                })
            }
            Ok(Ok(n)) => n,
            Err(_) => {
                let bound = if step == deadline {
                    limits.payload_timeout
                } else {
                    limits.read_timeout
                };
                return Err(ProtocolError::Timeout {
                    field: Field::Payload,
                    secs: bound.as_secs(),
                });
            }
        };
        sink.write_all(&buf[..n]).await.map_err(ProtocolError::Sink)?;
        hasher.update(&buf[..n]);
        received += n as u64;
    }
    sink.flush().await.map_err(ProtocolError::Sink)?;

    Ok(PayloadReceipt {
        bytes: received,
        digest: *hasher.finalize().as_bytes(),
    })
}

/// Stream the payload into a newly created file at `path`.
///
/// On any failure the partially written file is removed before the error
/// is returned. A failed removal is logged; the transfer error still wins.
pub async fn receive_to_file<R>(
    reader: &mut R,
    path: &Path,
    declared_size: u64,
    limits: &FrameLimits,
) -> Result<PayloadReceipt, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let file = tokio::fs::File::create(path)
        .await
        .map_err(ProtocolError::Sink)?;
    let mut sink = BufWriter::new(file);

    match read_payload(reader, &mut sink, declared_size, limits).await {
        Ok(receipt) => Ok(receipt),
        Err(e) => {
            drop(sink);
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(rm) if rm.kind() == io::ErrorKind::NotFound => {}
                Err(rm) => tracing::warn!(
                    path = %path.display(),
                    error = %rm,
                    "failed to remove partial upload"
                ),
            }
            Err(e)
        }
    }
}

/// Write a status line back to the client.
pub async fn write_response<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

// ── Encoding (client side) ────────────────────────────────────────────────────

/// Send a complete request: header, then exactly `header.declared_size`
/// bytes pulled from `body` in `chunk_size` pieces.
pub async fn write_request<W, R>(
    writer: &mut W,
    header: &FrameHeader,
    body: &mut R,
    chunk_size: usize,
) -> Result<u64, ProtocolError>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    writer.write_all(&header.encode()?).await?;

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent: u64 = 0;
    while sent < header.declared_size {
        let want = (header.declared_size - sent).min(buf.len() as u64) as usize;
        let n = body.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(ProtocolError::SizeMismatch {
                declared: header.declared_size,
                sent,
            });
        }
        writer.write_all(&buf[..n]).await?;
        sent += n as u64;
    }
    writer.flush().await?;
    Ok(sent)
}

/// Read the server's status text until it closes the connection.
pub async fn read_response<R>(reader: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(MAX_RESPONSE_LEN as u64)
        .read_to_end(&mut buf)
        .await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
