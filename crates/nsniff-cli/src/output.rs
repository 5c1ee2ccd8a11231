//! Packet rendering

use nsniff_core::packet::{format_mac, TcpFlags, TransportHeader};
use nsniff_platform::CapturedFrame;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::io::{self, Write};

/// Bytes per hex dump line
const HEX_LINE: usize = 32;

/// How delivered packets are printed
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    /// JSON lines instead of text blocks
    pub json: bool,
    /// Include the Ethernet header block
    pub link_header: bool,
    /// Include the payload hex dump
    pub payload: bool,
}

impl Printer {
    /// Write one packet to stdout
    pub fn print(&self, frame: &CapturedFrame<'_>) {
        let rendered = if self.json {
            let mut line = render_json(frame, self.payload).to_string();
            line.push('\n');
            line
        } else {
            render_text(frame, self.link_header, self.payload)
        };

        let mut stdout = io::stdout().lock();
        // A closed pipe only loses output
        let _ = stdout.write_all(rendered.as_bytes());
        let _ = stdout.flush();
    }
}

/// `[XX]` bytes, 32 per line
pub fn hex_dump(data: &[u8]) -> String {
    data.chunks(HEX_LINE)
        .map(|line| {
            line.iter()
                .map(|b| format!("[{b:02X}]"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn flag(flags: TcpFlags, bit: TcpFlags) -> u8 {
    u8::from(flags.contains(bit))
}

/// Text block with one section per header
pub fn render_text(frame: &CapturedFrame<'_>, link_header: bool, payload: bool) -> String {
    let packet = frame.packet;
    let mut out = String::new();

    if link_header {
        if let Some(eth) = &packet.ethernet {
            let _ = write!(
                out,
                "\n        ETH Header\n\
                 | Destination Address: {}\n\
                 | Source Address: {}\n\
                 | Protocol: {}\n",
                format_mac(&eth.destination),
                format_mac(&eth.source),
                eth.ethertype
            );
        }
    }

    let ip = &packet.ip;
    let _ = write!(
        out,
        "\n        IP Header\n\
         | Version: {}\n\
         | Header Length: {} bytes\n\
         | Total Length: {} bytes\n\
         | TTL (Time To Live): {}\n\
         | Protocol number value: {}\n\
         | Checksum: {}\n\
         | Source IP: {}\n\
         | Destination IP: {}\n\
         | Time: {}\n",
        ip.version,
        ip.header_len,
        ip.total_length,
        ip.ttl,
        ip.protocol,
        ip.checksum,
        ip.source,
        ip.destination,
        frame.timestamp
    );

    match &packet.transport {
        TransportHeader::Icmp(icmp) => {
            let _ = write!(
                out,
                "\n        ICMP Header\n\
                 | Type: {}\n\
                 | Code: {}\n\
                 | Checksum: {}\n",
                icmp.icmp_type, icmp.code, icmp.checksum
            );
        }
        TransportHeader::Tcp(tcp) => {
            let _ = write!(
                out,
                "\n        TCP Header\n\
                 | Source Port: {}\n\
                 | Destination Port: {}\n\
                 | Sequence Number: {}\n\
                 | Acknowledge Number: {}\n\
                 | Finish (Flag): {}\n\
                 | Sync (Flag): {}\n\
                 | Reset (Flag): {}\n\
                 | Acknowledge (Flag): {}\n\
                 | Urgent (Flag): {}\n\
                 | Window Size: {}\n\
                 | Checksum: {}\n\
                 | Urgent Point: {}\n",
                tcp.source_port,
                tcp.destination_port,
                tcp.sequence,
                tcp.acknowledgment,
                flag(tcp.flags, TcpFlags::FIN),
                flag(tcp.flags, TcpFlags::SYN),
                flag(tcp.flags, TcpFlags::RST),
                flag(tcp.flags, TcpFlags::ACK),
                flag(tcp.flags, TcpFlags::URG),
                tcp.window,
                tcp.checksum,
                tcp.urgent_pointer
            );
        }
        TransportHeader::Udp(udp) => {
            let _ = write!(
                out,
                "\n        UDP Header\n\
                 | Source Port: {}\n\
                 | Destination Port: {}\n\
                 | Length: {}\n\
                 | Checksum: {}\n",
                udp.source_port, udp.destination_port, udp.length, udp.checksum
            );
        }
        TransportHeader::None => {}
    }

    if payload {
        let data = frame.payload();
        if !data.is_empty() {
            let _ = write!(out, "\n      Data\n{}\n", hex_dump(data));
        }
    }

    out
}

/// One JSON object per packet
pub fn render_json(frame: &CapturedFrame<'_>, payload: bool) -> Value {
    let packet = frame.packet;
    let ip = &packet.ip;

    let transport = match &packet.transport {
        TransportHeader::Icmp(icmp) => json!({
            "protocol": "icmp",
            "type": icmp.icmp_type,
            "code": icmp.code,
            "checksum": icmp.checksum,
        }),
        TransportHeader::Tcp(tcp) => json!({
            "protocol": "tcp",
            "source_port": tcp.source_port,
            "destination_port": tcp.destination_port,
            "sequence": tcp.sequence,
            "acknowledgment": tcp.acknowledgment,
            "flags": format!("{:?}", tcp.flags),
            "window": tcp.window,
        }),
        TransportHeader::Udp(udp) => json!({
            "protocol": "udp",
            "source_port": udp.source_port,
            "destination_port": udp.destination_port,
            "length": udp.length,
        }),
        TransportHeader::None => Value::Null,
    };

    let mut value = json!({
        "time": frame.timestamp.to_string(),
        "timestamp": {
            "sec": frame.timestamp.timestamp_sec,
            "nsec": frame.timestamp.timestamp_nsec,
        },
        "len": frame.len,
        "ip": {
            "version": ip.version,
            "header_len": ip.header_len,
            "total_length": ip.total_length,
            "ttl": ip.ttl,
            "protocol": ip.protocol,
            "source": ip.source.to_string(),
            "destination": ip.destination.to_string(),
        },
        "transport": transport,
        "payload_len": frame.payload().len(),
    });

    if let Some(eth) = &packet.ethernet {
        value["ethernet"] = json!({
            "source": format_mac(&eth.source),
            "destination": format_mac(&eth.destination),
            "ethertype": eth.ethertype,
        });
    }

    if payload {
        let hex: String = frame.payload().iter().map(|b| format!("{b:02x}")).collect();
        value["payload"] = Value::String(hex);
    }

    value
}
