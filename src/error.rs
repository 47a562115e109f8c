// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

use std::io;

/// Errors produced by the CTC link layer, the operation layer, and
/// process startup.
///
/// The link layer propagates errors as-is; the operation layer adds
/// verb context where the raw error would be ambiguous; the HTTP facade
/// maps everything to a 500 response carrying [`Error::to_string`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file could not be read or parsed. Fatal at
    /// startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested emulator version is not one of the two supported
    /// variants.
    #[error("invalid Hercules version")]
    InvalidVersion,

    /// A caller-supplied dataset name, member name, or record set failed
    /// validation before anything was put on the wire.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `connect` was called while at least half of the connection was
    /// already established. Call `close` first.
    #[error("already connected")]
    AlreadyConnected,

    /// A send or receive was attempted on a CTC device that is not
    /// connected.
    #[error("not connected")]
    NotConnected,

    /// A socket operation failed. The link cannot be recovered; the
    /// process must be restarted.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The version-dependent connection handshake failed. Both sockets
    /// have been torn down.
    #[error("handshake error: {0}")]
    Handshake(io::Error),

    /// The CTC mutex was poisoned by a panicking operation.
    #[error("CTC lock error: panicked")]
    Lock,

    /// The peer sent a command or a response shape the CCW state machine
    /// did not expect. The current operation is lost and the link is
    /// likely desynchronised for good.
    #[error("protocol desync: {0}")]
    ProtocolDesync(String),

    /// The mainframe-side program reported a non-zero result code.
    #[error("unsuccessful result code: {}", fmt_result_code(.code, .additional))]
    RemoteResult { code: u32, additional: Option<u32> },
}

fn fmt_result_code(code: &u32, additional: &Option<u32>) -> String {
    match additional {
        Some(additional) => format!("{code:02x}/{additional:02x}"),
        None => format!("{code:02x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_result_display() {
        let plain = Error::RemoteResult {
            code: 0x0c,
            additional: None,
        };
        assert_eq!(plain.to_string(), "unsuccessful result code: 0c");

        let with_additional = Error::RemoteResult {
            code: 0x08,
            additional: Some(0x14),
        };
        assert_eq!(
            with_additional.to_string(),
            "unsuccessful result code: 08/14"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = io::Error::new(io::ErrorKind::ConnectionReset, "peer gone").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
