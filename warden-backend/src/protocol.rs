//! Wire clients for the two status protocols a Java server speaks: the
//! server list ping over TCP and the full-stat query over UDP.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tracing::debug;

use crate::presence::{
    PingProtocol, PingSample, PingStatus, ProbeError, QueryProtocol, QueryStatus,
};

const VARINT_MAX_BYTES: usize = 5;

/// Handshake protocol version. -1 lets the server answer with its own.
const PROTOCOL_VERSION: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;
const STATUS_PACKET: i32 = 0x00;
/// Upper bound on a status response frame.
const MAX_STATUS_LEN: usize = 1 << 21;

const QUERY_MAGIC: [u8; 2] = [0xFE, 0xFD];
const QUERY_HANDSHAKE: u8 = 0x09;
const QUERY_STAT: u8 = 0x00;
/// Only the low nibble of each byte is echoed back by the server.
const QUERY_SESSION: u32 = 0x0107_0A03;
/// `splitnum\0\x80\0` after the type and session id.
const STAT_HEADER_LEN: usize = 1 + 4 + 11;
/// `\x01player_\0\0` between the key/value section and the player names.
const PLAYER_SECTION_PADDING: usize = 10;
const MAX_DATAGRAM: usize = 64 * 1024;

fn ping_error(message: impl Into<String>) -> ProbeError {
    ProbeError::Ping(message.into())
}

fn query_error(message: impl Into<String>) -> ProbeError {
    ProbeError::Query(message.into())
}

pub(crate) fn put_varint(buf: &mut impl BufMut, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value & 0x7F | 0x80) as u8);
        value >>= 7;
    }
}

pub(crate) fn get_varint(buf: &mut impl Buf) -> Result<i32, ProbeError> {
    let mut result: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        if !buf.has_remaining() {
            return Err(ping_error("truncated varint"));
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(ping_error("varint longer than 5 bytes"))
}

async fn read_varint(stream: &mut TcpStream) -> Result<i32, ProbeError> {
    let mut result: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        let byte = stream
            .read_u8()
            .await
            .map_err(|err| ping_error(err.to_string()))?;
        result |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(ping_error("varint longer than 5 bytes"))
}

fn put_string(buf: &mut impl BufMut, s: &str) {
    put_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Length-prefixed packet: `varint(len) varint(id) body`.
pub(crate) fn frame(id: i32, body: &[u8]) -> Bytes {
    let mut payload = BytesMut::with_capacity(body.len() + VARINT_MAX_BYTES);
    put_varint(&mut payload, id);
    payload.put_slice(body);

    let mut out = BytesMut::with_capacity(payload.len() + VARINT_MAX_BYTES);
    put_varint(&mut out, payload.len() as i32);
    out.put_slice(&payload);
    out.freeze()
}

#[derive(Deserialize)]
struct StatusJson {
    players: StatusPlayers,
}

#[derive(Deserialize)]
struct StatusPlayers {
    online: u32,
    max: u32,
    #[serde(default)]
    sample: Vec<StatusSample>,
}

#[derive(Deserialize)]
struct StatusSample {
    id: String,
    name: String,
}

/// Decode the JSON document carried by a status response.
pub(crate) fn decode_status(json: &[u8]) -> Result<PingStatus, ProbeError> {
    let status: StatusJson =
        serde_json::from_slice(json).map_err(|err| ping_error(format!("bad status json: {err}")))?;
    Ok(PingStatus {
        online: status.players.online,
        max: status.players.max,
        sample: status
            .players
            .sample
            .into_iter()
            .map(|sample| PingSample {
                id: sample.id,
                name: sample.name,
            })
            .collect(),
    })
}

/// Server list ping over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerListPing;

impl ServerListPing {
    async fn exchange(host: &str, port: u16) -> Result<PingStatus, ProbeError> {
        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|err| ping_error(err.to_string()))?;

        let mut handshake = BytesMut::new();
        put_varint(&mut handshake, PROTOCOL_VERSION);
        put_string(&mut handshake, host);
        handshake.put_u16(port);
        put_varint(&mut handshake, NEXT_STATE_STATUS);

        let mut request = BytesMut::new();
        request.put_slice(&frame(STATUS_PACKET, &handshake));
        request.put_slice(&frame(STATUS_PACKET, &[]));
        stream
            .write_all(&request)
            .await
            .map_err(|err| ping_error(err.to_string()))?;

        let len = read_varint(&mut stream).await?;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| (1..=MAX_STATUS_LEN).contains(len))
            .ok_or_else(|| ping_error(format!("bad frame length {len}")))?;
        let mut packet = vec![0; len];
        stream
            .read_exact(&mut packet)
            .await
            .map_err(|err| ping_error(err.to_string()))?;

        let mut packet = Bytes::from(packet);
        let id = get_varint(&mut packet)?;
        if id != STATUS_PACKET {
            return Err(ping_error(format!("unexpected packet id {id}")));
        }
        let json_len = usize::try_from(get_varint(&mut packet)?)
            .map_err(|_| ping_error("negative string length"))?;
        if packet.remaining() < json_len {
            return Err(ping_error("truncated status json"));
        }
        decode_status(&packet.copy_to_bytes(json_len))
    }
}

#[async_trait]
impl PingProtocol for ServerListPing {
    async fn ping(&self, host: &str, port: u16, timeout: Duration) -> Result<PingStatus, ProbeError> {
        debug!(host, port, "pinging server");
        tokio::time::timeout(timeout, Self::exchange(host, port))
            .await
            .map_err(|_| ProbeError::Timeout)?
    }
}

/// Null-terminated string from the front of `buf`.
fn take_cstr(buf: &mut Bytes) -> Result<String, ProbeError> {
    let end = buf
        .iter()
        .position(|byte| *byte == 0)
        .ok_or_else(|| query_error("unterminated string"))?;
    let text = buf.split_to(end);
    buf.advance(1);
    Ok(String::from_utf8_lossy(&text).into_owned())
}

/// Decode a full-stat response datagram.
pub(crate) fn decode_full_stat(datagram: &[u8]) -> Result<QueryStatus, ProbeError> {
    if datagram.len() < STAT_HEADER_LEN || datagram[0] != QUERY_STAT {
        return Err(query_error("not a full-stat response"));
    }
    let mut buf = Bytes::copy_from_slice(&datagram[STAT_HEADER_LEN..]);

    let mut online = None;
    let mut max = None;
    loop {
        let key = take_cstr(&mut buf)?;
        if key.is_empty() {
            break;
        }
        let value = take_cstr(&mut buf)?;
        match key.as_str() {
            "numplayers" => online = value.parse().ok(),
            "maxplayers" => max = value.parse().ok(),
            _ => {}
        }
    }

    let mut players = Vec::new();
    if buf.remaining() >= PLAYER_SECTION_PADDING {
        buf.advance(PLAYER_SECTION_PADDING);
        while buf.has_remaining() {
            let name = take_cstr(&mut buf)?;
            if name.is_empty() {
                break;
            }
            players.push(name);
        }
    }

    Ok(QueryStatus {
        online: online.ok_or_else(|| query_error("missing numplayers"))?,
        max: max.ok_or_else(|| query_error("missing maxplayers"))?,
        players,
    })
}

/// Challenge token from a handshake response.
pub(crate) fn decode_challenge(datagram: &[u8]) -> Result<i32, ProbeError> {
    if datagram.len() < 6 || datagram[0] != QUERY_HANDSHAKE {
        return Err(query_error("not a handshake response"));
    }
    let mut buf = Bytes::copy_from_slice(&datagram[5..]);
    let token = take_cstr(&mut buf)?;
    token
        .trim()
        .parse()
        .map_err(|_| query_error(format!("bad challenge token {token:?}")))
}

fn query_request(kind: u8, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(7 + payload.len());
    out.put_slice(&QUERY_MAGIC);
    out.put_u8(kind);
    out.put_u32(QUERY_SESSION);
    out.put_slice(payload);
    out.freeze()
}

/// Full-stat query over UDP on the game port.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullStatQuery;

impl FullStatQuery {
    async fn round_trip(socket: &UdpSocket, request: &[u8]) -> Result<Vec<u8>, ProbeError> {
        socket
            .send(request)
            .await
            .map_err(|err| query_error(err.to_string()))?;
        let mut datagram = vec![0; MAX_DATAGRAM];
        let len = socket
            .recv(&mut datagram)
            .await
            .map_err(|err| query_error(err.to_string()))?;
        datagram.truncate(len);
        Ok(datagram)
    }

    async fn exchange(host: &str, port: u16) -> Result<QueryStatus, ProbeError> {
        let target = lookup_host((host, port))
            .await
            .map_err(|err| query_error(err.to_string()))?
            .next()
            .ok_or_else(|| query_error(format!("{host} did not resolve")))?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|err| query_error(err.to_string()))?;
        socket
            .connect(target)
            .await
            .map_err(|err| query_error(err.to_string()))?;

        let handshake = Self::round_trip(&socket, &query_request(QUERY_HANDSHAKE, &[])).await?;
        let token = decode_challenge(&handshake)?;

        let mut payload = BytesMut::with_capacity(8);
        payload.put_i32(token);
        payload.put_u32(0);
        let stat = Self::round_trip(&socket, &query_request(QUERY_STAT, &payload)).await?;
        decode_full_stat(&stat)
    }
}

#[async_trait]
impl QueryProtocol for FullStatQuery {
    async fn query(&self, host: &str, port: u16, timeout: Duration) -> Result<QueryStatus, ProbeError> {
        debug!(host, port, "querying server");
        tokio::time::timeout(timeout, Self::exchange(host, port))
            .await
            .map_err(|_| ProbeError::Timeout)?
    }
}
