//! Async UDP transport for SNMP GET requests

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::ber::{Message, SnmpValue, PDU_RESPONSE};
use crate::query::SnmpError;

/// Async UDP transport bound to one agent
pub struct SnmpTransport {
    socket: UdpSocket,
    target: SocketAddr,
    timeout: Duration,
    mtu: usize,
    request_id: i32,
}

impl SnmpTransport {
    /// Create a new transport towards `ip:port`
    pub async fn new(ip: IpAddr, port: u16, timeout_ms: u64) -> Result<Self, SnmpError> {
        let unspecified = match ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;

        Ok(Self {
            socket,
            target: SocketAddr::new(ip, port),
            timeout: Duration::from_millis(timeout_ms),
            mtu: 65_507,
            // Seed from the clock so consecutive transports do not reuse ids
            request_id: (std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos())
                .unwrap_or(1)
                & 0x3fff_ffff) as i32,
        })
    }

    /// Get next request id
    fn next_request_id(&mut self) -> i32 {
        self.request_id = self.request_id.wrapping_add(1) & 0x7fff_ffff;
        self.request_id
    }

    /// Send a GET for one object and wait for the matching response
    pub async fn get(&mut self, community: &str, oid: &[u32]) -> Result<SnmpValue, SnmpError> {
        let request_id = self.next_request_id();
        let packet = Message::get_request(community, request_id, oid).encode()?;

        trace!(
            target = %self.target,
            request_id = request_id,
            len = packet.len(),
            "Sending SNMP GET"
        );

        self.socket.send_to(&packet, self.target).await?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; self.mtu];

        // Late answers to earlier requests may still arrive; skip them
        loop {
            let (len, from) = timeout_at(deadline, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| SnmpError::Timeout(self.target))??;

            if from.ip() != self.target.ip() {
                trace!(from = %from, "Ignoring datagram from unexpected peer");
                continue;
            }

            let response = match Message::decode(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(target = %self.target, error = %e, "Undecodable SNMP response");
                    continue;
                }
            };

            if response.pdu_tag != PDU_RESPONSE || response.request_id != request_id {
                trace!(
                    expected = request_id,
                    got = response.request_id,
                    "Skipping unrelated SNMP response"
                );
                continue;
            }

            if response.error_status != 0 {
                return Err(SnmpError::ErrorStatus(response.error_status));
            }

            return response
                .varbinds
                .into_iter()
                .next()
                .map(|(_, value)| value)
                .ok_or(SnmpError::EmptyResponse);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::{parse_oid, VERSION_2C};

    /// Answer `count` requests on a local socket with `reply`
    async fn fake_agent<F>(count: usize, reply: F) -> SocketAddr
    where
        F: Fn(&Message) -> Option<Message> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            for _ in 0..count {
                let (len, from) = socket.recv_from(&mut buf).await.unwrap();
                let request = Message::decode(&buf[..len]).unwrap();
                if let Some(response) = reply(&request) {
                    socket
                        .send_to(&response.encode().unwrap(), from)
                        .await
                        .unwrap();
                }
            }
        });
        addr
    }

    fn respond(request: &Message, request_id: i32, value: SnmpValue) -> Message {
        Message {
            version: VERSION_2C,
            community: request.community.clone(),
            pdu_tag: PDU_RESPONSE,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: vec![(request.varbinds[0].0.clone(), value)],
        }
    }

    #[tokio::test]
    async fn test_get_returns_value() {
        let agent = fake_agent(1, |req| {
            assert_eq!(req.community, b"public");
            Some(respond(req, req.request_id, SnmpValue::TimeTicks(123_456)))
        })
        .await;

        let mut transport = SnmpTransport::new(agent.ip(), agent.port(), 1000)
            .await
            .unwrap();
        let oid = parse_oid("1.3.6.1.2.1.1.3.0").unwrap();
        let value = transport.get("public", &oid).await.unwrap();
        assert_eq!(value, SnmpValue::TimeTicks(123_456));
    }

    #[tokio::test]
    async fn test_get_skips_stale_response() {
        let agent = fake_agent(1, |req| {
            Some(respond(req, req.request_id.wrapping_sub(1), SnmpValue::Integer(1)))
        })
        .await;

        let mut transport = SnmpTransport::new(agent.ip(), agent.port(), 200)
            .await
            .unwrap();
        let oid = parse_oid("1.3.6.1.2.1.2.1.0").unwrap();
        let err = transport.get("public", &oid).await.unwrap_err();
        assert!(matches!(err, SnmpError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_get_times_out_without_agent() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let mut transport = SnmpTransport::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port(), 100)
            .await
            .unwrap();
        let oid = parse_oid("1.3.6.1.2.1.1.1.0").unwrap();
        assert!(matches!(
            transport.get("public", &oid).await,
            Err(SnmpError::Timeout(_))
        ));
    }
}
