// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! High-level operations against the mainframe-side CTC server job.
//!
//! [`CtcApi`] drives a pair of channels, one for commands and one for
//! data, and serialises every verb through a single mutex: a verb runs
//! to completion, terminator sentinels included, before the next one
//! may touch either channel.

use std::sync::{LazyLock, Mutex};

use byteorder::{BigEndian, ByteOrder};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::codepage;
use crate::ctc::{hex, Channel};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    DsList = 0x01,
    MbrList = 0x02,
    Read = 0x03,
    Submit = 0x04,
    Write = 0x05,
    Quit = 0xFF,
}

/// Every command frame carries a parameter field of exactly this size.
const PARAM_LEN: usize = 255;

/// Catalog entry describing one dataset, decoded from the 147-byte
/// record the DSLIST operation returns per entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DsInfo {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Volume")]
    pub volume: String,
    #[serde(rename = "DSOrg")]
    pub dsorg: String,
    #[serde(rename = "RecFM")]
    pub recfm: String,
    #[serde(rename = "BlockSize")]
    pub block_size: u16,
    #[serde(rename = "LRecLen")]
    pub lrec_len: u16,
}

static DS_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z$#@-][a-zA-Z0-9$#@-]{0,7}(\.[a-zA-Z$#@-][a-zA-Z0-9$#@-]{0,7})*\.?$",
    )
    .unwrap()
});

static DS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z$#@-][a-zA-Z0-9$#@-]{0,7}(\.[a-zA-Z$#@-][a-zA-Z0-9$#@-]{0,7})*$")
        .unwrap()
});

static DS_NAME_MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([a-zA-Z$#@-][a-zA-Z0-9$#@-]{0,7}(?:\.[a-zA-Z$#@-][a-zA-Z0-9$#@-]{0,7})*)(?:\(([a-zA-Z$#@-][a-zA-Z0-9$#@-]{0,7})\))?$",
    )
    .unwrap()
});

struct Channels<T> {
    cmd: T,
    data: T,
}

/// The CTC operation layer. One instance lives for the process lifetime
/// and owns both CTC devices.
pub struct CtcApi<T: Channel> {
    inner: Mutex<Channels<T>>,
}

impl<T: Channel> CtcApi<T> {
    pub fn new(cmd: T, data: T) -> CtcApi<T> {
        CtcApi {
            inner: Mutex::new(Channels { cmd, data }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Channels<T>>, Error> {
        self.inner.lock().map_err(|_| Error::Lock)
    }

    fn send_command(cmd: &mut T, op: Opcode, param: &[u8]) -> Result<(), Error> {
        // Opcode, two bytes of big-endian parameter length, then the
        // parameter left-aligned in a zero-padded 255-byte field.
        let mut buf = Vec::with_capacity(3 + PARAM_LEN);
        buf.push(op as u8);
        let mut len = [0u8; 2];
        BigEndian::write_u16(&mut len, param.len() as u16);
        buf.extend_from_slice(&len);
        let mut padded = [0u8; PARAM_LEN];
        padded[..param.len()].copy_from_slice(param);
        buf.extend_from_slice(&padded);

        debug!(
            "sending opcode {:02x} with param {}",
            op as u8,
            hex(param)
        );
        cmd.control_write(&buf)
    }

    /// Catalog search for all datasets under `basename`.
    pub fn get_ds_list(&self, basename: &str) -> Result<Vec<DsInfo>, Error> {
        if basename.len() > 44 {
            return Err(Error::InvalidInput(format!(
                "dataset name too long; got {} characters but needs to be 44 or fewer",
                basename.len()
            )));
        }
        if !DS_PREFIX.is_match(basename) {
            return Err(Error::InvalidInput(
                "dataset search prefix is invalid".to_string(),
            ));
        }

        // A bare HLQ gets a trailing period so the catalog search
        // returns the datasets under it instead of the single master
        // catalog alias entry for the HLQ.
        let mut basename = basename.to_string();
        if !basename.contains('.') {
            basename.push('.');
        }

        let ebcdic = codepage::to_ebcdic(&basename.to_uppercase());
        debug!(
            ebcdic = %hex(&ebcdic),
            "performing catalog search for '{basename}'"
        );

        let mut chans = self.lock()?;
        Self::send_command(&mut chans.cmd, Opcode::DsList, &ebcdic)?;

        debug!("get_ds_list: reading initial response");
        let data = chans.data.sense_read()?;
        if data.len() != 6 {
            return Err(Error::ProtocolDesync(format!(
                "get_ds_list: got {} bytes of data, expected 6",
                data.len()
            )));
        }

        let result_code = BigEndian::read_u32(&data[0..4]);
        let num_entries = BigEndian::read_u16(&data[4..6]);
        if result_code != 0 {
            info!("get_ds_list: unsuccessful result code: {result_code:02x}");
            return Err(Error::RemoteResult {
                code: result_code,
                additional: None,
            });
        }

        debug!("get_ds_list: number of results: {num_entries}");

        let mut entries = Vec::new();
        for i in 0..num_entries {
            debug!("get_ds_list: reading item {} of {}", i + 1, num_entries);
            let data = chans.data.sense_read()?;

            if data.len() != 147 {
                error!(
                    "got length {} dslist record, but expected 147",
                    data.len()
                );
                // Keep draining records so the peer and we stay in step.
                continue;
            }

            entries.push(decode_dscb(&data));
        }

        Ok(entries)
    }

    /// Lists the members of a partitioned dataset.
    pub fn get_member_list(&self, pds_name: &str) -> Result<Vec<String>, Error> {
        if pds_name.len() > 44 {
            return Err(Error::InvalidInput(format!(
                "dataset name too long; got {} characters but needs to be 44 or fewer",
                pds_name.len()
            )));
        }
        if !DS_NAME.is_match(pds_name) {
            return Err(Error::InvalidInput("dataset name is invalid".to_string()));
        }

        let ebcdic = codepage::to_ebcdic(&pds_name.to_uppercase());
        let padded = pad_ebcdic(&ebcdic, 44);

        let mut chans = self.lock()?;
        debug!(pds = %hex(&ebcdic), "getting member list for '{pds_name}'");
        Self::send_command(&mut chans.cmd, Opcode::MbrList, &padded)?;

        debug!("get_member_list: reading initial response");
        let data = chans.data.sense_read()?;
        if data.len() != 8 {
            return Err(Error::ProtocolDesync(format!(
                "get_member_list: got {} bytes in initial response but expected 8",
                data.len()
            )));
        }

        let result_code = BigEndian::read_u32(&data[0..4]);
        if result_code != 0 {
            let additional = BigEndian::read_u32(&data[4..8]);
            info!("get_member_list: unsuccessful result code: {result_code:02x}/{additional:02x}");
            return Err(Error::RemoteResult {
                code: result_code,
                additional: Some(additional),
            });
        }

        let mut entries = Vec::new();
        for i in 1.. {
            debug!("get_member_list: reading item {i}");
            let data = chans.data.sense_read()?;

            // A short record means the stream framing can no longer be
            // trusted; bail out instead of guessing where the next
            // record starts.
            if data.len() < 8 {
                return Err(Error::ProtocolDesync(format!(
                    "got length {} member record, but expected >=8",
                    data.len()
                )));
            }

            if data[0..8] == [0xFF; 8] {
                debug!("get_member_list: got end record");
                break;
            }

            entries.push(codepage::to_ascii(&data[0..8]).trim_end_matches(' ').to_string());
        }

        Ok(entries)
    }

    /// Reads a sequential dataset or a PDS member, addressed as
    /// `dsname` or `dsname(member)`. With `raw` the untranslated EBCDIC
    /// records are returned; otherwise records are translated to ASCII
    /// and right-trimmed.
    pub fn read(&self, dsn: &str, raw: bool) -> Result<Vec<Vec<u8>>, Error> {
        let Some(caps) = DS_NAME_MEMBER.captures(dsn) else {
            return Err(Error::InvalidInput("dataset name is invalid".to_string()));
        };
        let pds_name = caps.get(1).map_or("", |m| m.as_str());
        let mbr_name = caps.get(2).map_or("", |m| m.as_str());

        if pds_name.len() > 44 {
            return Err(Error::InvalidInput(format!(
                "dataset name too long; got {} characters but needs to be 44 or fewer",
                pds_name.len()
            )));
        }
        if mbr_name.len() > 8 {
            return Err(Error::InvalidInput(format!(
                "member name too long; got {} characters but needs to be 8 or fewer",
                mbr_name.len()
            )));
        }

        let pds_ebcdic = codepage::to_ebcdic(&pds_name.to_uppercase());
        let mbr_ebcdic = codepage::to_ebcdic(&mbr_name.to_uppercase());

        let mut chans = self.lock()?;
        debug!(pds = %hex(&pds_ebcdic), "reading dataset '{pds_name}'");
        if !mbr_name.is_empty() {
            debug!(member = %hex(&mbr_ebcdic), "reading member '{mbr_name}'");
        }

        // Complete input is the 44-byte dataset name followed by the
        // 8-byte member name, both space-padded.
        let mut param = pad_ebcdic(&pds_ebcdic, 44);
        param.extend_from_slice(&pad_ebcdic(&mbr_ebcdic, 8));

        Self::send_command(&mut chans.cmd, Opcode::Read, &param)?;

        debug!("read: reading initial response");
        let data = chans.data.sense_read()?;
        if data.len() != 8 {
            return Err(Error::ProtocolDesync(format!(
                "read: got {} bytes of data, expected 8",
                data.len()
            )));
        }

        let result_code = BigEndian::read_u32(&data[0..4]);
        if result_code != 0 {
            let additional = BigEndian::read_u32(&data[4..8]);
            info!("read: unsuccessful result code: {result_code:02x}/{additional:02x}");
            return Err(Error::RemoteResult {
                code: result_code,
                additional: Some(additional),
            });
        }

        let mut records = Vec::new();
        for i in 1.. {
            debug!("read: reading record {i}");
            let data = chans.data.sense_read()?;

            if data.len() == 1 && data[0] == 0xFF {
                // Last record.
                break;
            }

            if raw {
                records.push(data);
            } else {
                let record = codepage::to_ascii(&data);
                records.push(record.trim_end_matches(' ').to_string().into_bytes());
            }
        }

        Ok(records)
    }

    /// Submits JCL to the internal reader and returns the job number.
    pub fn submit(&self, jcl: &[String]) -> Result<String, Error> {
        if jcl.is_empty() {
            let err = Error::InvalidInput("JCL must contain at least 1 record".to_string());
            debug!("invalid JCL in submit: {err}");
            return Err(err);
        }
        for (i, line) in jcl.iter().enumerate() {
            if line.len() > 80 {
                let err = Error::InvalidInput(format!(
                    "line {} of JCL is {} characters; must be <= 80",
                    i + 1,
                    line.len()
                ));
                debug!("invalid JCL in submit: {err}");
                return Err(err);
            }
        }

        let mut chans = self.lock()?;
        debug!("sending submit command with {} job lines", jcl.len());

        let mut count = [0u8; 4];
        BigEndian::write_u32(&mut count, jcl.len() as u32);
        Self::send_command(&mut chans.cmd, Opcode::Submit, &count)?;

        let data = chans.data.sense_read()?;
        if data.len() != 4 {
            return Err(Error::ProtocolDesync(format!(
                "got {} bytes in initial response, expected 4",
                data.len()
            )));
        }
        let result_code = BigEndian::read_u32(&data[0..4]);
        if result_code != 0 {
            return Err(Error::RemoteResult {
                code: result_code,
                additional: None,
            });
        }
        debug!("submit: initial response code: {result_code:08x}");

        for (i, line) in jcl.iter().enumerate() {
            // Each input line becomes a right-space-padded 80 character
            // record; lengths were verified above.
            let record = pad_ebcdic(&codepage::to_ebcdic(line), 80);

            debug!("submit: sending JCL record");
            chans.cmd.control_write(&record)?;

            debug!("submit: reading response");
            let data = chans.data.sense_read()?;
            if data.len() != 4 {
                return Err(Error::ProtocolDesync(format!(
                    "got {} response length, expected 4",
                    data.len()
                )));
            }
            let code = BigEndian::read_u32(&data[0..4]);
            debug!("submit: got response {:08x} after record {}", code, i);
            if code != 0 {
                error!("submit: unsuccessful result code {code:08x} after record {i}");
                return Err(Error::RemoteResult {
                    code,
                    additional: None,
                });
            }
        }

        debug!("submit: getting job number");
        let data = chans.data.sense_read()?;
        if !(data.len() == 12 || data.len() == 4) {
            return Err(Error::ProtocolDesync(format!(
                "unexpected final response length: {}",
                data.len()
            )));
        }
        let code = BigEndian::read_u32(&data[0..4]);
        if code != 0 {
            error!("submit: unexpected final response code {code:08x}");
            return Err(Error::RemoteResult {
                code,
                additional: None,
            });
        }

        let jobnum = codepage::to_ascii(&data[4..]);
        debug!("submit: job number is {jobnum}");
        Ok(jobnum)
    }

    /// Replaces the contents of a sequential dataset or PDS member with
    /// the given records.
    pub fn write(&self, dsn: &str, records: &[String]) -> Result<(), Error> {
        let Some(caps) = DS_NAME_MEMBER.captures(dsn) else {
            return Err(Error::InvalidInput("dataset name is invalid".to_string()));
        };
        let pds_name = caps.get(1).map_or("", |m| m.as_str());
        let mbr_name = caps.get(2).map_or("", |m| m.as_str());

        if pds_name.len() > 44 {
            return Err(Error::InvalidInput(format!(
                "dataset name too long; got {} characters but needs to be 44 or fewer",
                pds_name.len()
            )));
        }
        if mbr_name.len() > 8 {
            return Err(Error::InvalidInput(format!(
                "member name too long; got {} characters but needs to be 8 or fewer",
                mbr_name.len()
            )));
        }
        if records.is_empty() {
            return Err(Error::InvalidInput(
                "data must contain at least 1 record".to_string(),
            ));
        }
        for (i, line) in records.iter().enumerate() {
            if line.len() > 80 {
                return Err(Error::InvalidInput(format!(
                    "line {} is {} characters; must be <= 80",
                    i + 1,
                    line.len()
                )));
            }
        }

        let pds_ebcdic = codepage::to_ebcdic(&pds_name.to_uppercase());
        let mbr_ebcdic = codepage::to_ebcdic(&mbr_name.to_uppercase());

        let mut chans = self.lock()?;
        debug!(
            pds = %hex(&pds_ebcdic),
            "writing {} records to dataset '{pds_name}'",
            records.len()
        );

        // The 44-byte dataset name and 8-byte member name, both
        // space-padded, followed by the record count.
        let mut param = pad_ebcdic(&pds_ebcdic, 44);
        param.extend_from_slice(&pad_ebcdic(&mbr_ebcdic, 8));
        let mut count = [0u8; 4];
        BigEndian::write_u32(&mut count, records.len() as u32);
        param.extend_from_slice(&count);

        Self::send_command(&mut chans.cmd, Opcode::Write, &param)?;

        let data = chans.data.sense_read()?;
        if data.len() != 4 {
            return Err(Error::ProtocolDesync(format!(
                "got {} bytes in initial response, expected 4",
                data.len()
            )));
        }
        let result_code = BigEndian::read_u32(&data[0..4]);
        if result_code != 0 {
            return Err(Error::RemoteResult {
                code: result_code,
                additional: None,
            });
        }

        for (i, line) in records.iter().enumerate() {
            let record = pad_ebcdic(&codepage::to_ebcdic(line), 80);

            debug!("write: sending record");
            chans.cmd.control_write(&record)?;

            debug!("write: reading response");
            let data = chans.data.sense_read()?;
            if data.len() != 4 {
                return Err(Error::ProtocolDesync(format!(
                    "got {} response length, expected 4",
                    data.len()
                )));
            }
            let code = BigEndian::read_u32(&data[0..4]);
            if code != 0 {
                error!("write: unsuccessful result code {code:08x} after record {i}");
                return Err(Error::RemoteResult {
                    code,
                    additional: None,
                });
            }
        }

        debug!("write: reading final response");
        let data = chans.data.sense_read()?;
        if data.len() != 4 {
            return Err(Error::ProtocolDesync(format!(
                "unexpected final response length: {}",
                data.len()
            )));
        }
        let code = BigEndian::read_u32(&data[0..4]);
        if code != 0 {
            error!("write: unexpected final response code {code:08x}");
            return Err(Error::RemoteResult {
                code,
                additional: None,
            });
        }

        Ok(())
    }

    /// Instructs the CTC server job on the mainframe side to quit. No
    /// response is awaited.
    pub fn quit(&self) -> Result<(), Error> {
        let mut chans = self.lock()?;
        debug!("sending quit command");
        Self::send_command(&mut chans.cmd, Opcode::Quit, &[])
    }
}

fn pad_ebcdic(data: &[u8], len: usize) -> Vec<u8> {
    let mut padded = vec![0x40u8; len];
    padded[..data.len()].copy_from_slice(data);
    padded
}

fn decode_dscb(data: &[u8]) -> DsInfo {
    let kind = codepage::to_ascii(&data[0..1]);
    let name = codepage::to_ascii(&data[1..45]).trim().to_string();
    let volume = codepage::to_ascii(&data[45..51]).trim().to_string();

    // data[51..] corresponds to the 96 bytes of a (likely) format-1
    // DSCB beginning at offset 44/0x2C, as returned by OBTAIN.
    if data[51] != 0xF1 && kind != "X" {
        warn!(
            "unexpected DSCB format type: expecting F1, but got {:02x} for {}",
            data[51], name
        );
    }

    // For DSORG bit definitions, see DS1DSORG in SYS1.AMODGEN(IECSDSL1).
    let dsorg = if data[89] & 0x80 != 0 {
        "IS"
    } else if data[89] & 0x40 != 0 {
        "PS"
    } else if data[89] & 0x20 != 0 {
        "DA"
    } else if data[89] & 0x10 != 0 {
        "CX"
    } else if data[89] & 0x02 != 0 {
        "PO"
    } else if data[90] & 0x08 != 0 {
        // Second byte of DS1DSORG.
        "VS"
    } else {
        "Unk"
    };

    let mut recfm = String::new();
    match data[91] & 0xC0 {
        0x80 => recfm.push('F'),
        0x40 => recfm.push('V'),
        0xC0 => recfm.push('U'),
        _ => {}
    }
    // "B" for blocked.
    if data[91] & 0x10 == 0x10 {
        recfm.push('B');
    }
    // Variable records can additionally be spanned.
    if data[91] & 0xC0 == 0x40 && data[91] & 0x08 == 0x08 {
        recfm.push('S');
    }

    DsInfo {
        kind,
        name,
        volume,
        dsorg: dsorg.to_string(),
        recfm,
        block_size: BigEndian::read_u16(&data[93..95]),
        lrec_len: BigEndian::read_u16(&data[95..97]),
    }
}
