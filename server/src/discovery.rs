use log::{debug, warn};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Sends discovery offers to the local segment.
pub struct OfferBroadcaster {
    socket: UdpSocket,
    target: SocketAddr,
    failures: u32,
}

impl OfferBroadcaster {
    pub async fn bind(target: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            target,
            failures: 0,
        })
    }

    /// Sends one offer. Failures are logged, never fatal; the next interval
    /// simply tries again.
    pub async fn announce(&mut self, offer: &[u8]) {
        match self.socket.send_to(offer, self.target).await {
            Ok(_) => self.failures = 0,
            Err(e) => {
                if self.failures == 0 {
                    warn!("Failed to send offer to {}: {}", self.target, e);
                } else {
                    debug!("Failed to send offer to {}: {}", self.target, e);
                }
                self.failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{decode_offer, encode_offer, OFFER_LEN};

    #[tokio::test]
    async fn test_announce_reaches_listener() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut broadcaster = OfferBroadcaster::bind(receiver.local_addr().unwrap())
            .await
            .unwrap();

        let offer = encode_offer("Trivia", 4321).unwrap();
        broadcaster.announce(&offer).await;

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, OFFER_LEN);

        let offer = decode_offer(&buf[..len]).unwrap();
        assert_eq!(offer.name, "Trivia");
        assert_eq!(offer.port, 4321);
    }
}
