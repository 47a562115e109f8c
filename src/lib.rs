// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Host-side bridge to a mainframe guest running under the Hercules
//! S/370/390 emulator, speaking over a pair of emulated Channel-To-
//! Channel adapters.
//!
//! Each CTC device is a pair of TCP sockets with a framed, sequenced
//! protocol on top ([`ctc`]); a command channel and a data channel
//! together carry catalog, dataset, member, read/write and
//! job-submission operations ([`api`]); an HTTP facade exposes each
//! operation as an endpoint ([`http`]).
//!
//! # Examples
//! ```no_run
//! use ctc::api::CtcApi;
//! use ctc::ctc::{Ctc, Endian, HerculesVersion};
//!
//! # fn main() -> Result<(), ctc::error::Error> {
//! let mut cmd = Ctc::new(8500, 8501, 0x500, "localhost", HerculesVersion::New, Endian::Little)?;
//! let mut data = Ctc::new(8502, 8503, 0x501, "localhost", HerculesVersion::New, Endian::Little)?;
//! cmd.connect()?;
//! data.connect()?;
//!
//! let api = CtcApi::new(cmd, data);
//! for ds in api.get_ds_list("SYS1")? {
//!     println!("{} on {}", ds.name, ds.volume);
//! }
//! # Ok(())
//! # }
//! ```
pub mod api;
pub mod codepage;
pub mod config;
pub mod ctc;
pub mod error;
pub mod http;
