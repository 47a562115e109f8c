// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Emulated Channel-To-Channel adapter over a pair of TCP sockets.
//!
//! One [`Ctc`] owns both halves of a single emulated CTC device: the
//! socket Hercules dials into us (receive side) and the socket we dial
//! into Hercules (send side). On top of raw framed sends and reads it
//! offers the two composite CCW primitives the operation layer is built
//! from, [`Ctc::control_write`] and [`Ctc::sense_read`].

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream,
               ToSocketAddrs};
use std::thread;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace};

use crate::error::Error;

/// CCW commands seen on the CTC link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    Test,
    Write,
    Read,
    Control,
    Sense,
    /// Anything else on the wire; preserved so desync errors can show
    /// the raw command byte.
    Other(u8),
}

impl Cmd {
    pub fn from_u8(b: u8) -> Cmd {
        match b {
            0x00 => Cmd::Test,
            0x01 => Cmd::Write,
            0x02 => Cmd::Read,
            0x07 => Cmd::Control,
            0x14 => Cmd::Sense,
            other => Cmd::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Cmd::Test => 0x00,
            Cmd::Write => 0x01,
            Cmd::Read => 0x02,
            Cmd::Control => 0x07,
            Cmd::Sense => 0x14,
            Cmd::Other(other) => other,
        }
    }

    fn fsm_state(self) -> u8 {
        match self {
            Cmd::Control => 0x01,
            Cmd::Write => 0x03,
            Cmd::Read | Cmd::Sense => 0x04,
            _ => 0x00,
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cmd::Test => write!(f, "TEST"),
            Cmd::Write => write!(f, "WRITE"),
            Cmd::Read => write!(f, "READ"),
            Cmd::Control => write!(f, "CONTROL"),
            Cmd::Sense => write!(f, "SENSE"),
            Cmd::Other(other) => write!(f, "{other:02x}"),
        }
    }
}

/// Which Hercules generation the emulator side is running. The two
/// variants differ in header length, connection convention, and whether
/// an initial handshake record is exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HerculesVersion {
    /// Hercules 3.13: 12-byte headers, odd-port connection convention,
    /// no handshake record.
    Old,
    /// Spinhawk and Hyperion: 16-byte headers with a handshake record.
    New,
}

impl HerculesVersion {
    fn header_len(self) -> usize {
        match self {
            HerculesVersion::Old => HDR_LEN_OLD,
            HerculesVersion::New => HDR_LEN_NEW,
        }
    }
}

/// Byte order of the emulator host process. Header and handshake integer
/// fields are serialised in the emulator's native order; data payloads
/// are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    fn put_u16(self, buf: &mut [u8], v: u16) {
        match self {
            Endian::Big => BigEndian::write_u16(buf, v),
            Endian::Little => LittleEndian::write_u16(buf, v),
        }
    }

    fn get_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Big => BigEndian::read_u16(buf),
            Endian::Little => LittleEndian::read_u16(buf),
        }
    }
}

const HDR_LEN_OLD: usize = 12;
const HDR_LEN_NEW: usize = 16;

const SSID: u16 = 1;

/// "Hercules info" magic opening the handshake record.
const HERC_INFO: u16 = 0x8010;

/// Pause between the CONTROL/SENSE exchange and the WRITE in
/// [`Ctc::control_write`]. Removing it exposes a race in the emulator or
/// the guest where the channel state change from SENSE to WRITE is
/// sometimes never observed. Do not remove.
const SENSE_WRITE_PAUSE: Duration = Duration::from_millis(10);

struct Header {
    cmd: Cmd,
    scount: u16,
    pktseq: u16,
    sndlen: u16,
    devnum: u16,
    ssid: u16,
}

impl Header {
    fn encode(&self, ver: HerculesVersion, bo: Endian) -> Vec<u8> {
        let mut buf = vec![0u8; ver.header_len()];
        buf[0] = self.cmd.as_u8();
        buf[1] = self.cmd.fsm_state();
        bo.put_u16(&mut buf[2..4], self.scount);
        bo.put_u16(&mut buf[4..6], self.pktseq);
        match ver {
            HerculesVersion::Old => {
                bo.put_u16(&mut buf[6..8], self.sndlen);
                bo.put_u16(&mut buf[8..10], self.devnum);
                bo.put_u16(&mut buf[10..12], self.ssid);
            }
            HerculesVersion::New => {
                // Reserved word at 6..8, another at 14..16.
                bo.put_u16(&mut buf[8..10], self.sndlen);
                bo.put_u16(&mut buf[10..12], self.devnum);
                bo.put_u16(&mut buf[12..14], self.ssid);
            }
        }
        buf
    }

    fn parse(buf: &[u8], ver: HerculesVersion, bo: Endian) -> Header {
        let (sndlen, devnum, ssid) = match ver {
            HerculesVersion::Old => (
                bo.get_u16(&buf[6..8]),
                bo.get_u16(&buf[8..10]),
                bo.get_u16(&buf[10..12]),
            ),
            HerculesVersion::New => (
                bo.get_u16(&buf[8..10]),
                bo.get_u16(&buf[10..12]),
                bo.get_u16(&buf[12..14]),
            ),
        };
        Header {
            cmd: Cmd::from_u8(buf[0]),
            scount: bo.get_u16(&buf[2..4]),
            pktseq: bo.get_u16(&buf[4..6]),
            sndlen,
            devnum,
            ssid,
        }
    }
}

/// The face a CTC device shows to the operation layer. The composite
/// primitives are all the verbs need; keeping them behind a trait lets
/// the operation layer be exercised against scripted channels.
pub trait Channel: Send {
    /// Hand one record to the peer: CONTROL, await SENSE, WRITE the
    /// data, await READ.
    fn control_write(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Pull one record from the peer: await CONTROL, send SENSE, take
    /// the WRITE payload, acknowledge with READ.
    fn sense_read(&mut self) -> Result<Vec<u8>, Error>;

    /// Close both sockets. Idempotent.
    fn close(&mut self);
}

/// One emulated CTC adapter.
pub struct Ctc {
    raddr: String,
    rip: IpAddr,
    rport: u16,
    lport: u16,
    devnum: u16,
    ver: HerculesVersion,
    bo: Endian,
    seq: u16,
    recvsock: Option<TcpStream>,
    sendsock: Option<TcpStream>,
}

impl Ctc {
    /// Resolves the remote host and prepares a disconnected device. No
    /// sockets are opened until [`Ctc::connect`].
    pub fn new(
        lport: u16,
        rport: u16,
        devnum: u16,
        raddr: &str,
        ver: HerculesVersion,
        bo: Endian,
    ) -> Result<Ctc, Error> {
        let rip = (raddr, 0u16)
            .to_socket_addrs()?
            .next()
            .map(|sa| sa.ip())
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address found for '{raddr}'"),
                ))
            })?;

        Ok(Ctc {
            raddr: raddr.to_string(),
            rip,
            rport,
            lport,
            devnum,
            ver,
            bo,
            seq: 1,
            recvsock: None,
            sendsock: None,
        })
    }

    /// Establishes both halves of the CTC connection: accept the inbound
    /// connection from Hercules, dial the outbound one, and perform the
    /// handshake record exchange on the *New* variant. Any failure
    /// leaves the device fully disconnected.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.sendsock.is_some() || self.recvsock.is_some() {
            return Err(Error::AlreadyConnected);
        }

        // Hercules 3.13 expects the odd member of each port pair.
        let mut lport = self.lport;
        let mut rport = self.rport;
        if self.ver == HerculesVersion::Old {
            lport += 1;
            rport += 1;
        }

        info!(port = lport, "waiting for Hercules to connect to us");
        let listener = TcpListener::bind(("0.0.0.0", lport))?;
        let (recvsock, peer) = listener.accept()?;
        info!(peer = %peer, "got connection from Hercules");
        drop(listener);

        info!(host = %self.raddr, port = rport, "connecting to remote Hercules");
        let mut sendsock = match self.dial(rport) {
            Ok(sock) => sock,
            Err(err) => {
                drop(recvsock);
                return Err(Error::Io(err));
            }
        };

        if self.ver == HerculesVersion::New {
            let mut recvsock = recvsock;
            if let Err(err) = self.handshake(&mut recvsock, &mut sendsock) {
                // Dropping both sockets tears the half-open link down.
                return Err(Error::Handshake(err));
            }
            info!("Hercules handshake successful");
            self.recvsock = Some(recvsock);
        } else {
            self.recvsock = Some(recvsock);
        }
        self.sendsock = Some(sendsock);

        Ok(())
    }

    fn dial(&self, rport: u16) -> io::Result<TcpStream> {
        if self.ver == HerculesVersion::New {
            return TcpStream::connect(SocketAddr::new(self.rip, rport));
        }

        // Hercules 3.13 requires that we connect with a *source port*
        // matching the remote port configured in its CTCE device.
        let (domain, src): (Domain, SocketAddr) = match self.rip {
            IpAddr::V4(_) => (
                Domain::IPV4,
                (Ipv4Addr::UNSPECIFIED, self.lport).into(),
            ),
            IpAddr::V6(_) => (
                Domain::IPV6,
                (Ipv6Addr::UNSPECIFIED, self.lport).into(),
            ),
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&src.into())?;
        socket.connect(&SocketAddr::new(self.rip, rport).into())?;
        Ok(socket.into())
    }

    fn handshake(&self, recv: &mut TcpStream, send: &mut TcpStream) -> io::Result<()> {
        // Hercules sends 16 bytes of its own info record first; nothing
        // in it is needed.
        let mut buf = [0u8; HDR_LEN_NEW];
        recv.read_exact(&mut buf)?;

        let mut msg = [0u8; HDR_LEN_NEW];
        self.bo.put_u16(&mut msg[0..2], HERC_INFO);
        self.bo.put_u16(&mut msg[2..4], self.lport);
        // Our IP address field, network byte order. Hercules only
        // handles IPv4 here, so an IPv6 address contributes its first
        // four bytes.
        let ip4: [u8; 4] = match self.rip {
            IpAddr::V4(ip) => ip.octets(),
            IpAddr::V6(ip) => {
                let octets = ip.octets();
                [octets[0], octets[1], octets[2], octets[3]]
            }
        };
        msg[4..8].copy_from_slice(&ip4);
        self.bo.put_u16(&mut msg[8..10], HDR_LEN_NEW as u16);
        self.bo.put_u16(&mut msg[10..12], self.devnum);
        self.bo.put_u16(&mut msg[12..14], SSID);
        // msg[14..16] stays zero padding.

        send.write_all(&msg)
    }

    /// Sends one frame. The sequence counter advances only when the
    /// whole frame went out.
    pub fn send(&mut self, cmd: Cmd, count: u16, data: &[u8]) -> Result<(), Error> {
        if self.recvsock.is_none() {
            return Err(Error::NotConnected);
        }
        let Some(sock) = self.sendsock.as_mut() else {
            return Err(Error::NotConnected);
        };

        let header = Header {
            cmd,
            scount: count,
            pktseq: self.seq,
            sndlen: (self.ver.header_len() + data.len()) as u16,
            devnum: self.devnum,
            ssid: SSID,
        };
        let mut frame = header.encode(self.ver, self.bo);
        frame.extend_from_slice(data);

        trace!(command = %cmd, frame = %hex(&frame), "SEND");

        sock.write_all(&frame)?;
        self.seq = self.seq.wrapping_add(1);
        Ok(())
    }

    /// Reads the next frame, transparently discarding TEST keep-alives.
    pub fn read(&mut self) -> Result<(Cmd, u16, Vec<u8>), Error> {
        loop {
            let (cmd, count, data) = self.read_frame()?;
            if cmd != Cmd::Test {
                return Ok((cmd, count, data));
            }
            trace!("discarding TEST frame");
        }
    }

    fn read_frame(&mut self) -> Result<(Cmd, u16, Vec<u8>), Error> {
        let hdr_len = self.ver.header_len();
        let ver = self.ver;
        let bo = self.bo;
        let Some(sock) = self.recvsock.as_mut() else {
            return Err(Error::NotConnected);
        };

        let mut buf = vec![0u8; hdr_len];
        sock.read_exact(&mut buf)?;
        trace!(header = %hex(&buf), "READ");

        let header = Header::parse(&buf, ver, bo);
        let data_len = header.sndlen.saturating_sub(hdr_len as u16) as usize;
        let mut data = vec![0u8; data_len];
        sock.read_exact(&mut data)?;
        trace!(data = %hex(&data), "READ");

        Ok((header.cmd, header.scount, data))
    }

    /// Hands one record to the peer: CONTROL, await the SENSE that
    /// clears it, WRITE the data, await the peer's READ.
    pub fn control_write(&mut self, data: &[u8]) -> Result<(), Error> {
        debug!("control_write: sending CONTROL");
        self.send(Cmd::Control, 1, &[])?;

        debug!("control_write: awaiting SENSE");
        let (cmd, _, _) = self.read()?;
        if cmd != Cmd::Sense {
            return Err(Error::ProtocolDesync(format!(
                "expected SENSE, but got {cmd}"
            )));
        }

        // Without this pause, either Hercules or the guest occasionally
        // misses the channel state change from SENSE to WRITE under
        // stress.
        thread::sleep(SENSE_WRITE_PAUSE);

        debug!("control_write: sending WRITE");
        self.send(Cmd::Write, data.len() as u16, data)?;

        debug!("control_write: awaiting READ");
        let (cmd, _, _) = self.read()?;
        if cmd != Cmd::Read {
            return Err(Error::ProtocolDesync(format!(
                "expected READ, but got {cmd}"
            )));
        }

        Ok(())
    }

    /// WRITE followed by the expected READ, with no CONTROL/SENSE
    /// prologue. For use when the prologue already happened out of band.
    pub fn naked_write(&mut self, data: &[u8]) -> Result<(), Error> {
        debug!("naked_write: sending WRITE");
        self.send(Cmd::Write, data.len() as u16, data)?;

        debug!("naked_write: awaiting READ");
        let (cmd, _, _) = self.read()?;
        if cmd != Cmd::Read {
            return Err(Error::ProtocolDesync(format!(
                "expected READ, but got {cmd}"
            )));
        }

        Ok(())
    }

    /// Pulls one record from the peer: await CONTROL, answer with SENSE,
    /// take the WRITE payload, acknowledge with READ.
    pub fn sense_read(&mut self) -> Result<Vec<u8>, Error> {
        debug!("sense_read: awaiting CONTROL");
        let (cmd, _, _) = self.read()?;
        if cmd != Cmd::Control {
            return Err(Error::ProtocolDesync(format!(
                "expected CONTROL, but got {cmd}"
            )));
        }

        debug!("sense_read: sending SENSE");
        self.send(Cmd::Sense, 1, &[])?;

        debug!("sense_read: reading data");
        let (cmd, count, data) = self.read()?;
        debug!(command = %cmd, count, data = %hex(&data), "data read from CTC adapter");
        if cmd != Cmd::Write {
            return Err(Error::ProtocolDesync(format!(
                "expected WRITE, but got {cmd}"
            )));
        }

        // Acknowledge that we have taken the record.
        self.send(Cmd::Read, count, &[])?;

        Ok(data)
    }

    /// Closes both sockets (if present) and resets the device to its
    /// initial state. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(sock) = self.sendsock.take() {
            debug!("closing send socket");
            let _ = sock.shutdown(Shutdown::Both);
        }
        if let Some(sock) = self.recvsock.take() {
            debug!("closing receive socket");
            let _ = sock.shutdown(Shutdown::Both);
        }
        self.seq = 1;
    }
}

impl Channel for Ctc {
    fn control_write(&mut self, data: &[u8]) -> Result<(), Error> {
        Ctc::control_write(self, data)
    }

    fn sense_read(&mut self) -> Result<Vec<u8>, Error> {
        Ctc::sense_read(self)
    }

    fn close(&mut self) {
        Ctc::close(self);
    }
}

impl Drop for Ctc {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            cmd: Cmd::Write,
            scount: 258,
            pktseq: 7,
            sndlen: 0,
            devnum: 0x500,
            ssid: SSID,
        }
    }

    #[test]
    fn header_round_trips_all_variants() {
        let data_len = 258usize;
        for ver in [HerculesVersion::Old, HerculesVersion::New] {
            for bo in [Endian::Big, Endian::Little] {
                let mut h = header();
                h.sndlen = (ver.header_len() + data_len) as u16;
                let buf = h.encode(ver, bo);
                assert_eq!(buf.len(), ver.header_len());

                let parsed = Header::parse(&buf, ver, bo);
                assert_eq!(parsed.cmd, h.cmd);
                assert_eq!(parsed.scount, h.scount);
                assert_eq!(parsed.pktseq, h.pktseq);
                assert_eq!(parsed.sndlen, h.sndlen);
                assert_eq!(parsed.devnum, h.devnum);
                assert_eq!(parsed.ssid, h.ssid);
                assert_eq!(
                    parsed.sndlen as usize - ver.header_len(),
                    data_len,
                    "SndLen must be header length plus payload length"
                );
            }
        }
    }

    #[test]
    fn fsm_state_per_command() {
        assert_eq!(Cmd::Control.fsm_state(), 0x01);
        assert_eq!(Cmd::Write.fsm_state(), 0x03);
        assert_eq!(Cmd::Read.fsm_state(), 0x04);
        assert_eq!(Cmd::Sense.fsm_state(), 0x04);
        assert_eq!(Cmd::Test.fsm_state(), 0x00);
    }

    #[test]
    fn unknown_command_bytes_are_preserved() {
        assert_eq!(Cmd::from_u8(0x42), Cmd::Other(0x42));
        assert_eq!(Cmd::Other(0x42).as_u8(), 0x42);
        assert_eq!(Cmd::from_u8(0x14), Cmd::Sense);
    }

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let a = TcpStream::connect(addr).unwrap();
        let (b, _) = listener.accept().unwrap();
        (a, b)
    }

    /// A device with both sockets wired to in-process peers, bypassing
    /// the connection dance.
    fn wired_device(ver: HerculesVersion, bo: Endian) -> (Ctc, TcpStream, TcpStream) {
        let mut dev = Ctc::new(0, 0, 0x500, "127.0.0.1", ver, bo).unwrap();
        let (send_ours, send_theirs) = socket_pair();
        let (recv_theirs, recv_ours) = socket_pair();
        dev.sendsock = Some(send_ours);
        dev.recvsock = Some(recv_ours);
        (dev, send_theirs, recv_theirs)
    }

    fn peer_frame(ver: HerculesVersion, bo: Endian, cmd: Cmd, count: u16, data: &[u8]) -> Vec<u8> {
        let mut frame = Header {
            cmd,
            scount: count,
            pktseq: 1,
            sndlen: (ver.header_len() + data.len()) as u16,
            devnum: 0x500,
            ssid: SSID,
        }
        .encode(ver, bo);
        frame.extend_from_slice(data);
        frame
    }

    #[test]
    fn send_frames_carry_sequence_and_length() {
        let ver = HerculesVersion::New;
        let bo = Endian::Little;
        let (mut dev, mut peer_recv, _peer_send) = wired_device(ver, bo);

        dev.send(Cmd::Write, 3, b"abc").unwrap();
        dev.send(Cmd::Control, 1, &[]).unwrap();

        let mut buf = vec![0u8; ver.header_len() + 3];
        peer_recv.read_exact(&mut buf).unwrap();
        let h = Header::parse(&buf, ver, bo);
        assert_eq!(h.cmd, Cmd::Write);
        assert_eq!(h.scount, 3);
        assert_eq!(h.pktseq, 1);
        assert_eq!(h.sndlen as usize, ver.header_len() + 3);
        assert_eq!(&buf[ver.header_len()..], b"abc");

        let mut buf = vec![0u8; ver.header_len()];
        peer_recv.read_exact(&mut buf).unwrap();
        let h = Header::parse(&buf, ver, bo);
        assert_eq!(h.cmd, Cmd::Control);
        assert_eq!(h.pktseq, 2);
    }

    #[test]
    fn sequence_wraps_without_panic() {
        let (mut dev, mut peer_recv, _peer_send) = wired_device(HerculesVersion::Old, Endian::Big);
        dev.seq = u16::MAX;

        dev.send(Cmd::Write, 0, &[]).unwrap();
        assert_eq!(dev.seq, 0);
        dev.send(Cmd::Write, 0, &[]).unwrap();
        assert_eq!(dev.seq, 1);

        let mut buf = vec![0u8; HDR_LEN_OLD * 2];
        peer_recv.read_exact(&mut buf).unwrap();
        assert_eq!(
            Header::parse(&buf[..HDR_LEN_OLD], HerculesVersion::Old, Endian::Big).pktseq,
            u16::MAX
        );
        assert_eq!(
            Header::parse(&buf[HDR_LEN_OLD..], HerculesVersion::Old, Endian::Big).pktseq,
            0
        );
    }

    #[test]
    fn test_frames_are_transparent() {
        let ver = HerculesVersion::New;
        let bo = Endian::Big;
        let (mut dev, _peer_recv, mut peer_send) = wired_device(ver, bo);

        peer_send
            .write_all(&peer_frame(ver, bo, Cmd::Test, 0, &[]))
            .unwrap();
        peer_send
            .write_all(&peer_frame(ver, bo, Cmd::Sense, 1, &[]))
            .unwrap();

        let (cmd, count, data) = dev.read().unwrap();
        assert_eq!(cmd, Cmd::Sense);
        assert_eq!(count, 1);
        assert!(data.is_empty());
    }

    #[test]
    fn read_returns_payload() {
        let ver = HerculesVersion::Old;
        let bo = Endian::Little;
        let (mut dev, _peer_recv, mut peer_send) = wired_device(ver, bo);

        peer_send
            .write_all(&peer_frame(ver, bo, Cmd::Write, 5, b"hello"))
            .unwrap();

        let (cmd, count, data) = dev.read().unwrap();
        assert_eq!(cmd, Cmd::Write);
        assert_eq!(count, 5);
        assert_eq!(data, b"hello");
    }

    #[test]
    fn disconnected_device_rejects_io() {
        let mut dev = Ctc::new(0, 0, 0x500, "127.0.0.1", HerculesVersion::New, Endian::Big)
            .unwrap();
        assert!(matches!(
            dev.send(Cmd::Write, 0, &[]),
            Err(Error::NotConnected)
        ));
        assert!(matches!(dev.read(), Err(Error::NotConnected)));
    }

    #[test]
    fn connect_rejects_connected_device() {
        let (mut dev, _peer_recv, _peer_send) =
            wired_device(HerculesVersion::New, Endian::Big);
        assert!(matches!(dev.connect(), Err(Error::AlreadyConnected)));
    }

    #[test]
    fn close_resets_and_is_idempotent() {
        let (mut dev, _peer_recv, _peer_send) =
            wired_device(HerculesVersion::New, Endian::Big);
        dev.seq = 17;
        dev.close();
        assert_eq!(dev.seq, 1);
        assert!(dev.sendsock.is_none() && dev.recvsock.is_none());
        dev.close();
        assert!(matches!(
            dev.send(Cmd::Write, 0, &[]),
            Err(Error::NotConnected)
        ));
    }
}
