// TAS-755C UART to Ethernet bridge
//
// In data mode every byte written goes out over the configured TCP/UDP
// link. `+++` switches to command mode, where settings are written as
// `AT+KEY=a,b,c` and read back as `AT+KEY?`; `AT&W` stores them and
// `ATO` returns to data mode.

use core::fmt;
use core::net::Ipv4Addr;

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};

use super::at::{self, Reply, Timing};
use crate::error::{Error, Result};

const ESCAPE: &[u8] = b"+++";
const ESCAPE_WAIT_MS: u32 = 50;

const TIMING: Timing = Timing {
    settle_ms: 100,
    quiet_ms: 20,
    timeout_ms: 1000,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpConfig {
    pub dhcp: bool,
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub dns: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    TcpClient = 0,
    TcpServer = 1,
    Udp = 2,
}

/// Socket settings; `remote` is an address or host name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig<'a> {
    pub local_port: u16,
    pub remote_port: u16,
    pub mode: LinkMode,
    pub remote: &'a str,
}

pub struct Tas755c<U> {
    uart: U,
}

impl<U: Read + Write + ReadReady> Tas755c<U> {
    pub fn new(uart: U) -> Self {
        Self { uart }
    }

    /// Leave data mode. Only accepted after a pause in traffic.
    pub fn enter_command_mode<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        at::drain(&mut self.uart)?;
        self.uart.write_all(ESCAPE).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)?;
        delay.delay_ms(ESCAPE_WAIT_MS);
        let reply = at::read_reply(&mut self.uart, &TIMING, delay)?;
        if reply.text() != "OK" {
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    pub fn enter_data_mode<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.execute(format_args!("ATO\r\n"), delay).map(drop)
    }

    /// Raw reply to `AT+<key>?`.
    pub fn query<D: DelayNs>(&mut self, key: &str, delay: &mut D) -> Result<Reply, U::Error> {
        self.execute(format_args!("AT+{}?\r\n", key), delay)
    }

    /// Send `AT+<key>=<args>`; for settings without a typed setter.
    pub fn configure<D: DelayNs>(
        &mut self,
        key: &str,
        args: fmt::Arguments<'_>,
        delay: &mut D,
    ) -> Result<(), U::Error> {
        self.execute(format_args!("AT+{}={}\r\n", key, args), delay).map(drop)
    }

    pub fn set_serial<D: DelayNs>(&mut self, config: &SerialConfig, delay: &mut D) -> Result<(), U::Error> {
        if !matches!(config.data_bits, 7 | 8) || !matches!(config.stop_bits, 1 | 2) {
            return Err(Error::InvalidArgument("data bits must be 7/8, stop bits 1/2"));
        }
        self.configure(
            "UARTCFG",
            format_args!(
                "{},{},{},{}",
                config.baud, config.data_bits, config.parity as u8, config.stop_bits
            ),
            delay,
        )
    }

    /// Idle time in ms that closes a serial packet.
    pub fn set_packet_time<D: DelayNs>(&mut self, ms: u16, delay: &mut D) -> Result<(), U::Error> {
        self.configure("UARTTIME", format_args!("{}", ms), delay)
    }

    pub fn set_mac<D: DelayNs>(&mut self, mac: [u8; 6], delay: &mut D) -> Result<(), U::Error> {
        let [a, b, c, d, e, f] = mac;
        self.configure(
            "MACADDR",
            format_args!("{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}", a, b, c, d, e, f),
            delay,
        )
    }

    pub fn set_ip<D: DelayNs>(&mut self, config: &IpConfig, delay: &mut D) -> Result<(), U::Error> {
        self.configure(
            "IPCONFIG",
            format_args!(
                "{},{},{},{},{}",
                config.dhcp as u8, config.ip, config.gateway, config.subnet, config.dns
            ),
            delay,
        )
    }

    pub fn set_link<D: DelayNs>(&mut self, config: &LinkConfig<'_>, delay: &mut D) -> Result<(), U::Error> {
        if config.remote.is_empty() || config.remote.contains(',') {
            return Err(Error::InvalidArgument("remote address must be non-empty without commas"));
        }
        self.configure(
            "TCPCFG",
            format_args!(
                "{},{},{},{}",
                config.local_port, config.remote_port, config.mode as u8, config.remote
            ),
            delay,
        )
    }

    /// Prefix received network data with its source.
    pub fn set_source_header<D: DelayNs>(&mut self, enable: bool, delay: &mut D) -> Result<(), U::Error> {
        self.configure("CIPHEAD", format_args!("{}", enable as u8), delay)
    }

    pub fn set_modbus_gateway<D: DelayNs>(&mut self, enable: bool, delay: &mut D) -> Result<(), U::Error> {
        self.configure("TCPMODBUS", format_args!("{}", enable as u8), delay)
    }

    pub fn set_disconnect_time<D: DelayNs>(&mut self, seconds: u16, delay: &mut D) -> Result<(), U::Error> {
        self.configure("DSCTIME", format_args!("{}", seconds), delay)
    }

    pub fn set_mqtt_client_id<D: DelayNs>(&mut self, id: &str, delay: &mut D) -> Result<(), U::Error> {
        self.configure("MQTTCLIENTID", format_args!("{}", id), delay)
    }

    pub fn set_mqtt_topics<D: DelayNs>(&mut self, subscribe: &str, publish: &str, delay: &mut D) -> Result<(), U::Error> {
        self.configure("MQTTSUBTOPIC", format_args!("{}", subscribe), delay)?;
        self.configure("MQTTPUBTOPIC", format_args!("{}", publish), delay)
    }

    /// Persist the settings across power cycles.
    pub fn save<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.execute(format_args!("AT&W\r\n"), delay).map(drop)
    }

    pub fn restart<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), U::Error> {
        self.execute(format_args!("AT+CFUN=1,1\r\n"), delay).map(drop)
    }

    pub fn has_data(&mut self) -> Result<bool, U::Error> {
        self.uart.read_ready().map_err(Error::Bus)
    }

    pub fn send(&mut self, data: &[u8]) -> Result<(), U::Error> {
        self.uart.write_all(data).map_err(Error::Bus)?;
        self.uart.flush().map_err(Error::Bus)
    }

    /// Non-blocking; 0 when nothing is waiting.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize, U::Error> {
        if !self.has_data()? {
            return Ok(0);
        }
        self.uart.read(buf).map_err(Error::Bus)
    }

    pub fn release(self) -> U {
        self.uart
    }

    fn execute<D: DelayNs>(&mut self, args: fmt::Arguments<'_>, delay: &mut D) -> Result<Reply, U::Error> {
        let reply = at::command(&mut self.uart, args, &TIMING, delay)?;
        if !reply.text().contains("OK") {
            log::warn!("tas755c: command refused: {}", reply.text());
            return Err(Error::InvalidResponse);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockSerial};

    fn bridge() -> (Tas755c<MockSerial>, MockSerial, MockDelay) {
        let uart = MockSerial::new();
        (Tas755c::new(uart.clone()), uart, MockDelay::new())
    }

    #[test]
    fn test_escape_to_command_mode() {
        let (mut eth, uart, mut delay) = bridge();
        uart.queue_reply(b"OK\r\n");
        eth.enter_command_mode(&mut delay).unwrap();
        assert_eq!(uart.sent(), b"+++");

        uart.queue_reply(b"+++");
        assert_eq!(eth.enter_command_mode(&mut delay), Err(Error::InvalidResponse));
    }

    #[test]
    fn test_ip_and_link_commands() {
        let (mut eth, uart, mut delay) = bridge();
        uart.queue_reply(b"OK\r\n");
        uart.queue_reply(b"OK\r\n");
        let ip = IpConfig {
            dhcp: false,
            ip: Ipv4Addr::new(192, 168, 1, 50),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            dns: Ipv4Addr::new(8, 8, 8, 8),
        };
        eth.set_ip(&ip, &mut delay).unwrap();
        let link = LinkConfig {
            local_port: 8000,
            remote_port: 9000,
            mode: LinkMode::Udp,
            remote: "192.168.1.2",
        };
        eth.set_link(&link, &mut delay).unwrap();
        assert_eq!(
            uart.sent(),
            b"AT+IPCONFIG=0,192.168.1.50,192.168.1.1,255.255.255.0,8.8.8.8\r\nAT+TCPCFG=8000,9000,2,192.168.1.2\r\n"
        );
    }

    #[test]
    fn test_refused_and_invalid_settings() {
        let (mut eth, uart, mut delay) = bridge();
        uart.queue_reply(b"ERROR\r\n");
        assert_eq!(eth.set_packet_time(20, &mut delay), Err(Error::InvalidResponse));

        let serial = SerialConfig { data_bits: 9, ..SerialConfig::default() };
        assert!(eth.set_serial(&serial, &mut delay).is_err());
        let link = LinkConfig { local_port: 1, remote_port: 2, mode: LinkMode::TcpClient, remote: "a,b" };
        assert!(eth.set_link(&link, &mut delay).is_err());
    }

    #[test]
    fn test_query_and_mac() {
        let (mut eth, uart, mut delay) = bridge();
        uart.queue_reply(b"+UARTCFG:115200,8,0,1\r\nOK\r\n");
        let reply = eth.query("UARTCFG", &mut delay).unwrap();
        assert_eq!(reply.field("+UARTCFG"), Some("115200,8,0,1"));

        uart.queue_reply(b"OK\r\n");
        eth.set_mac([0x02, 0x00, 0xAB, 0xCD, 0x01, 0xFF], &mut delay).unwrap();
        assert!(uart.sent().ends_with(b"AT+MACADDR=0200ABCD01FF\r\n"));
    }

    #[test]
    fn test_data_mode_traffic() {
        let (mut eth, uart, _) = bridge();
        let mut buf = [0u8; 8];
        assert_eq!(eth.receive(&mut buf).unwrap(), 0);
        uart.inject(b"pong");
        assert_eq!(eth.receive(&mut buf).unwrap(), 4);
        eth.send(b"ping").unwrap();
        assert_eq!(uart.sent(), b"ping");
    }
}
