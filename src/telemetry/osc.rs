//! Fire-and-forget OSC sender for per-frame metrics.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use anyhow::{anyhow, Context, Result};
use rosc::{encoder, OscMessage, OscPacket, OscType};

use crate::occupancy::OccupancyTally;

pub const AVG_MOTION_ADDRESS: &str = "/avg_motion_rate";
pub const ZONE_AMOUNT_ADDRESS: &str = "/zone/amount";

/// `/avg_motion_rate` with a single float argument.
pub fn avg_motion_message(avg_motion: f32) -> OscMessage {
    OscMessage {
        addr: AVG_MOTION_ADDRESS.to_string(),
        args: vec![OscType::Float(avg_motion)],
    }
}

/// `/zone/amount` with the zone name and its count.
pub fn zone_amount_message(name: &str, count: u32) -> OscMessage {
    OscMessage {
        addr: ZONE_AMOUNT_ADDRESS.to_string(),
        args: vec![
            OscType::String(name.to_string()),
            OscType::Int(count.min(i32::MAX as u32) as i32),
        ],
    }
}

/// UDP sender for per-frame metrics.
pub struct OscSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscSink {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let target = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve OSC target {}:{}", host, port))?
            .next()
            .ok_or_else(|| anyhow!("OSC target {}:{} resolved to no address", host, port))?;
        let bind: SocketAddr = if target.is_ipv6() {
            "[::]:0".parse()?
        } else {
            "0.0.0.0:0".parse()?
        };
        let socket = UdpSocket::bind(bind).context("failed to bind OSC socket")?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send the average motion followed by one message per zone.
    /// Delivery failures are logged at debug and otherwise ignored.
    pub fn send_frame(&self, avg_motion: f32, tally: &OccupancyTally) {
        self.send(avg_motion_message(avg_motion));
        for (name, _) in tally.iter() {
            self.send(zone_amount_message(name, tally.get(name).unwrap_or(0)));
        }
    }

    fn send(&self, message: OscMessage) {
        let addr = message.addr.clone();
        let result = encoder::encode(&OscPacket::Message(message))
            .map_err(|e| anyhow!("encode failed: {}", e))
            .and_then(|data| {
                self.socket
                    .send_to(&data, self.target)
                    .map_err(anyhow::Error::from)
            });
        if let Err(e) = result {
            log::debug!("OSC send {} failed: {}", addr, e);
        }
    }
}
