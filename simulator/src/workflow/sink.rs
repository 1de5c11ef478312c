use anyhow::Context;
use fusioncore::instrument_interface::{CommandSink, TriggerCommand};
use fusioncore::{FusionError, FusionResult};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Sends each command frame as one UDP datagram to the recording subsystem.
pub struct UdpCommandSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpCommandSink {
    pub fn connect(target: &str) -> anyhow::Result<Self> {
        let target = target
            .to_socket_addrs()
            .with_context(|| format!("resolving trigger address {target}"))?
            .next()
            .with_context(|| format!("trigger address {target} resolved to nothing"))?;
        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).context("binding trigger socket")?;
        log::info!("trigger commands go to {}", target);
        Ok(Self { socket, target })
    }
}

impl CommandSink for UdpCommandSink {
    fn send(&mut self, command: &TriggerCommand) -> FusionResult<()> {
        let frame = command.encode();
        self.socket
            .send_to(frame.as_bytes(), self.target)
            .map_err(|err| FusionError::Dispatch(format!("{} to {}", err, self.target)))?;
        log::debug!("sent {:?} to {}", frame, self.target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn frames_arrive_as_single_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = receiver.local_addr().unwrap().to_string();

        let mut sink = UdpCommandSink::connect(&addr).unwrap();
        let command = TriggerCommand::new(vec![true, false, false, true]);
        sink.send(&command).unwrap();

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf).unwrap();
        let frame = std::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(frame, command.encode());
        assert_eq!(TriggerCommand::parse(frame).unwrap(), command);
    }

    #[test]
    fn unresolvable_address_is_an_error() {
        assert!(UdpCommandSink::connect("not an address").is_err());
    }
}
