//! 请求/响应帧的线缆布局。
//!
//! ```text
//! request  := path_len:u16 | path:utf8 | body_len:u32 | body
//! response := status:u16   | body_len:u32 | body
//! ```
//!
//! 所有整数均为大端序；单帧负载不超过 [`MAX_BODY_LEN`]。

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use spark_command_core::{TransportRequest, TransportResponse};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// 单帧负载上限：16 MiB。
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub(crate) enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("frame body of {len} bytes exceeds the {limit} byte limit")]
    TooLarge { len: usize, limit: usize },
    #[error("request path is not valid utf-8")]
    InvalidPath,
}

pub(crate) fn encode_request(request: &TransportRequest) -> Result<Bytes, FrameError> {
    let path = request.path().as_bytes();
    let path_len = u16::try_from(path.len()).map_err(|_| FrameError::TooLarge {
        len: path.len(),
        limit: usize::from(u16::MAX),
    })?;
    let body = request.body();
    let body_len = checked_body_len(body.len())?;
    let mut buf = BytesMut::with_capacity(2 + path.len() + 4 + body.len());
    buf.put_u16(path_len);
    buf.put_slice(path);
    buf.put_u32(body_len);
    buf.put_slice(body);
    Ok(buf.freeze())
}

pub(crate) fn encode_response(response: &TransportResponse) -> Result<Bytes, FrameError> {
    let body = response.body();
    let body_len = checked_body_len(body.len())?;
    let mut buf = BytesMut::with_capacity(2 + 4 + body.len());
    buf.put_u16(response.status());
    buf.put_u32(body_len);
    buf.put_slice(body);
    Ok(buf.freeze())
}

fn checked_body_len(len: usize) -> Result<u32, FrameError> {
    if len > MAX_BODY_LEN {
        return Err(FrameError::TooLarge {
            len,
            limit: MAX_BODY_LEN,
        });
    }
    u32::try_from(len).map_err(|_| FrameError::TooLarge {
        len,
        limit: MAX_BODY_LEN,
    })
}

async fn read_body<R>(reader: &mut R) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_BODY_LEN {
        return Err(FrameError::TooLarge {
            len,
            limit: MAX_BODY_LEN,
        });
    }
    let mut body = vec![0_u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}

/// 读取一个请求帧；对端在帧边界处关闭连接时返回 `Ok(None)`。
pub(crate) async fn read_request<R>(reader: &mut R) -> Result<Option<TransportRequest>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let path_len = match reader.read_u16().await {
        Ok(len) => usize::from(len),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut path = vec![0_u8; path_len];
    reader.read_exact(&mut path).await?;
    let path = String::from_utf8(path).map_err(|_| FrameError::InvalidPath)?;
    let body = read_body(reader).await?;
    Ok(Some(TransportRequest::new(path, body)))
}

pub(crate) async fn read_response<R>(reader: &mut R) -> Result<TransportResponse, FrameError>
where
    R: AsyncRead + Unpin,
{
    let status = reader.read_u16().await?;
    let body = read_body(reader).await?;
    Ok(TransportResponse::new(status, body))
}

pub(crate) async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn request_frame_layout_is_stable() {
        let request = TransportRequest::new("/cmd", Bytes::from_static(b"hi"));
        let frame = encode_request(&request).unwrap();
        assert_eq!(
            &frame[..],
            &[0, 4, b'/', b'c', b'm', b'd', 0, 0, 0, 2, b'h', b'i'][..]
        );

        let mut reader = &frame[..];
        let decoded = read_request(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, request);
        assert!(read_request(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_body_is_rejected_before_allocation() {
        let mut frame = BytesMut::new();
        frame.put_u16(200);
        frame.put_u32(u32::MAX);
        let mut reader = &frame[..];
        let err = read_response(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn truncated_response_is_an_io_error() {
        let response = TransportResponse::ok(Bytes::from_static(b"payload"));
        let frame = encode_response(&response).unwrap();
        let mut reader = &frame[..frame.len() - 2];
        assert!(matches!(
            read_response(&mut reader).await,
            Err(FrameError::Io(_))
        ));
    }
}
