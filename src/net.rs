//! Wire helpers for the byte-oriented duplex streams between parties.
//!
//! Every on-wire integer is an 8-byte little-endian value. All helpers are
//! generic over the stream type so tests can run the protocol over
//! `tokio::io::duplex` pipes instead of TCP sockets.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::field::Field;

pub async fn send_field<S>(stream: &mut S, value: Field) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&value.to_le_bytes()).await
}

pub async fn recv_field<S>(stream: &mut S) -> io::Result<Field>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await?;
    Ok(Field::from_le_bytes(buf))
}

pub async fn send_signed<S>(stream: &mut S, value: i64) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&value.to_le_bytes()).await
}

pub async fn recv_signed<S>(stream: &mut S) -> io::Result<i64>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await?;
    Ok(i64::from_le_bytes(buf))
}

/// Write a whole vector as one buffered frame of 8-byte elements.
pub async fn send_vector<S>(stream: &mut S, values: &[Field]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(values.len() * 8);
    for value in values {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    stream.write_all(&buf).await
}

pub async fn recv_vector<S>(stream: &mut S, len: usize) -> io::Result<Vec<Field>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len * 8];
    stream.read_exact(&mut buf).await?;
    Ok(buf
        .chunks_exact(8)
        .map(|chunk| Field::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn field_and_vector_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        send_field(&mut a, 0xDEAD_BEEF).await.unwrap();
        send_signed(&mut a, -5).await.unwrap();
        send_vector(&mut a, &[1, 2, 0xFFFF_FFFF]).await.unwrap();

        assert_eq!(recv_field(&mut b).await.unwrap(), 0xDEAD_BEEF);
        assert_eq!(recv_signed(&mut b).await.unwrap(), -5);
        assert_eq!(recv_vector(&mut b, 3).await.unwrap(), vec![1, 2, 0xFFFF_FFFF]);
    }

    #[tokio::test]
    async fn short_read_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        assert!(recv_field(&mut b).await.is_err());
    }
}
