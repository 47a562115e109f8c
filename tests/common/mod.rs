// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! A scripted stand-in for the Hercules side of a CTC device. It owns
//! both TCP connections of one device (the one it dials into the
//! device under test, and the one it accepts from it) and speaks raw
//! frames, independently of the crate's own header code.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const CMD_TEST: u8 = 0x00;
pub const CMD_WRITE: u8 = 0x01;
pub const CMD_READ: u8 = 0x02;
pub const CMD_CONTROL: u8 = 0x07;
pub const CMD_SENSE: u8 = 0x14;

#[derive(Debug)]
pub struct Frame {
    pub cmd: u8,
    pub count: u16,
    pub seq: u16,
    pub data: Vec<u8>,
}

pub struct Peer {
    /// Frames we send travel here; the device reads them.
    pub to_device: TcpStream,
    /// The device's sends arrive here.
    pub from_device: TcpStream,
    pub old: bool,
    pub big: bool,
    seq: u16,
}

pub struct PeerConfig {
    pub device_lport: u16,
    pub peer_port: u16,
    pub old: bool,
    pub big: bool,
}

fn put16(big: bool, buf: &mut [u8], v: u16) {
    let bytes = if big { v.to_be_bytes() } else { v.to_le_bytes() };
    buf.copy_from_slice(&bytes);
}

pub fn get16(big: bool, buf: &[u8]) -> u16 {
    let bytes = [buf[0], buf[1]];
    if big {
        u16::from_be_bytes(bytes)
    } else {
        u16::from_le_bytes(bytes)
    }
}

fn dial_retry(port: u16) -> TcpStream {
    for _ in 0..500 {
        if let Ok(sock) = TcpStream::connect(("127.0.0.1", port)) {
            return sock;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("couldn't connect to 127.0.0.1:{port}");
}

/// Picks a port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Picks a port `p` such that both `p` and `p + 1` were free a moment
/// ago, for the odd-port convention of the old emulator variant.
pub fn free_port_pair() -> u16 {
    loop {
        let port = free_port();
        if port == u16::MAX {
            continue;
        }
        if TcpListener::bind(("127.0.0.1", port + 1)).is_ok() {
            return port;
        }
    }
}

/// Runs the emulator side of one device `connect` on its own thread:
/// listen where the device will dial, dial where the device listens,
/// then hand both connections to the script. The device under test must
/// call `connect` on the calling thread. For the old variant the
/// emulator-facing ports are the odd members of each pair and the
/// device's source port is asserted.
pub fn start_peer<F, R>(cfg: PeerConfig, script: F) -> JoinHandle<R>
where
    F: FnOnce(Peer) -> R + Send + 'static,
    R: Send + 'static,
{
    thread::spawn(move || {
        let listen_port = if cfg.old { cfg.peer_port + 1 } else { cfg.peer_port };
        let listener = TcpListener::bind(("127.0.0.1", listen_port)).unwrap();

        let target = if cfg.old { cfg.device_lport + 1 } else { cfg.device_lport };
        let to_device = dial_retry(target);

        let (from_device, from_addr) = listener.accept().unwrap();
        if cfg.old {
            assert_eq!(
                from_addr.port(),
                cfg.device_lport,
                "Hercules 3.13 requires the dial to come from the configured local port"
            );
        }

        script(Peer {
            to_device,
            from_device,
            old: cfg.old,
            big: cfg.big,
            seq: 1,
        })
    })
}

impl Peer {
    fn hdr_len(&self) -> usize {
        if self.old {
            12
        } else {
            16
        }
    }

    /// Emulator side of the New-variant handshake: send a throwaway
    /// 16-byte record, then return the init record the device answers
    /// with.
    pub fn handshake(&mut self) -> [u8; 16] {
        self.to_device.write_all(&[0u8; 16]).unwrap();
        let mut init = [0u8; 16];
        self.from_device.read_exact(&mut init).unwrap();
        init
    }

    pub fn send_frame(&mut self, cmd: u8, count: u16, data: &[u8]) {
        let hl = self.hdr_len();
        let mut buf = vec![0u8; hl];
        buf[0] = cmd;
        buf[1] = match cmd {
            CMD_CONTROL => 0x01,
            CMD_WRITE => 0x03,
            CMD_READ | CMD_SENSE => 0x04,
            _ => 0x00,
        };
        put16(self.big, &mut buf[2..4], count);
        put16(self.big, &mut buf[4..6], self.seq);
        let off = if self.old { 6 } else { 8 };
        put16(self.big, &mut buf[off..off + 2], (hl + data.len()) as u16);
        put16(self.big, &mut buf[off + 2..off + 4], 0x500);
        put16(self.big, &mut buf[off + 4..off + 6], 1);
        buf.extend_from_slice(data);
        self.to_device.write_all(&buf).unwrap();
        self.seq = self.seq.wrapping_add(1);
    }

    pub fn read_frame(&mut self) -> Frame {
        let hl = self.hdr_len();
        let mut buf = vec![0u8; hl];
        self.from_device.read_exact(&mut buf).unwrap();
        let off = if self.old { 6 } else { 8 };
        let sndlen = get16(self.big, &buf[off..off + 2]);
        let mut data = vec![0u8; sndlen as usize - hl];
        self.from_device.read_exact(&mut data).unwrap();
        Frame {
            cmd: buf[0],
            count: get16(self.big, &buf[2..4]),
            seq: get16(self.big, &buf[4..6]),
            data,
        }
    }

    pub fn expect(&mut self, cmd: u8) -> Frame {
        let frame = self.read_frame();
        assert_eq!(frame.cmd, cmd, "unexpected command from device");
        frame
    }

    /// Emulator side of the device's `control_write`: SENSE the CONTROL
    /// away, take the WRITE payload, acknowledge it with READ.
    pub fn serve_control_write(&mut self) -> Frame {
        self.expect(CMD_CONTROL);
        self.send_frame(CMD_SENSE, 1, &[]);
        let write = self.expect(CMD_WRITE);
        self.send_frame(CMD_READ, write.count, &[]);
        write
    }

    /// Emulator side of the device's `sense_read`: offer a record with
    /// CONTROL, await the SENSE, WRITE the data, await the READ.
    pub fn serve_sense_read(&mut self, data: &[u8]) {
        self.send_frame(CMD_CONTROL, 1, &[]);
        self.expect(CMD_SENSE);
        self.send_frame(CMD_WRITE, data.len() as u16, data);
        let read = self.expect(CMD_READ);
        assert_eq!(read.count as usize, data.len());
    }
}
