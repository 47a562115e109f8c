// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! ASCII/EBCDIC translation.
//!
//! Two table variants are supported: the Hercules default mapping, which
//! keeps the square brackets at their traditional 0xAD/0xBD positions,
//! and IBM Code Page 37. The active variant is selected once at startup
//! with [`set_codepage`] and never changes afterwards.

use std::sync::OnceLock;

/// EBCDIC substitution character, used for ASCII bytes with no mapping.
const SUB_EBCDIC: u8 = 0x3F;
/// ASCII SUB, used for EBCDIC bytes with no mapping.
const SUB_ASCII: u8 = 0x1A;

/// Selects which translation tables [`to_ebcdic`] and [`to_ascii`] use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codepage {
    /// Hercules default mapping: `[` = 0xAD, `]` = 0xBD.
    Bracket,
    /// IBM Code Page 37: `[` = 0xBA, `]` = 0xBB.
    Cp37,
}

struct Tables {
    a2e: [u8; 256],
    e2a: [u8; 256],
}

// (ascii, ebcdic) pairs shared by both variants. Letters and digits are
// filled in as runs below.
const COMMON: &[(u8, u8)] = &[
    (0x00, 0x00), // NUL
    (0x09, 0x05), // HT
    (0x0A, 0x25), // LF
    (0x0D, 0x0D), // CR
    (b' ', 0x40),
    (b'!', 0x5A),
    (b'"', 0x7F),
    (b'#', 0x7B),
    (b'$', 0x5B),
    (b'%', 0x6C),
    (b'&', 0x50),
    (b'\'', 0x7D),
    (b'(', 0x4D),
    (b')', 0x5D),
    (b'*', 0x5C),
    (b'+', 0x4E),
    (b',', 0x6B),
    (b'-', 0x60),
    (b'.', 0x4B),
    (b'/', 0x61),
    (b':', 0x7A),
    (b';', 0x5E),
    (b'<', 0x4C),
    (b'=', 0x7E),
    (b'>', 0x6E),
    (b'?', 0x6F),
    (b'@', 0x7C),
    (b'\\', 0xE0),
    (b'_', 0x6D),
    (b'`', 0x79),
    (b'{', 0xC0),
    (b'|', 0x4F),
    (b'}', 0xD0),
    (b'~', 0xA1),
];

// (first ascii, first ebcdic, length) for the contiguous letter and
// digit runs of the EBCDIC layout.
const RUNS: &[(u8, u8, u8)] = &[
    (b'a', 0x81, 9),
    (b'j', 0x91, 9),
    (b's', 0xA2, 8),
    (b'A', 0xC1, 9),
    (b'J', 0xD1, 9),
    (b'S', 0xE2, 8),
    (b'0', 0xF0, 10),
];

const fn map(mut t: Tables, ascii: u8, ebcdic: u8) -> Tables {
    t.a2e[ascii as usize] = ebcdic;
    t.e2a[ebcdic as usize] = ascii;
    t
}

const fn build(variant: &[(u8, u8)]) -> Tables {
    let mut t = Tables {
        a2e: [SUB_EBCDIC; 256],
        e2a: [SUB_ASCII; 256],
    };

    let mut i = 0;
    while i < COMMON.len() {
        t = map(t, COMMON[i].0, COMMON[i].1);
        i += 1;
    }

    i = 0;
    while i < RUNS.len() {
        let (ascii, ebcdic, len) = RUNS[i];
        let mut k = 0;
        while k < len {
            t = map(t, ascii + k, ebcdic + k);
            k += 1;
        }
        i += 1;
    }

    i = 0;
    while i < variant.len() {
        t = map(t, variant[i].0, variant[i].1);
        i += 1;
    }

    t
}

static BRACKET: Tables = build(&[(b'[', 0xAD), (b']', 0xBD), (b'^', 0x5F)]);
static CP37: Tables = build(&[(b'[', 0xBA), (b']', 0xBB), (b'^', 0xB0)]);

static ACTIVE: OnceLock<Codepage> = OnceLock::new();

impl Codepage {
    fn tables(self) -> &'static Tables {
        match self {
            Codepage::Bracket => &BRACKET,
            Codepage::Cp37 => &CP37,
        }
    }

    /// Translates an ASCII string to EBCDIC, byte by byte. Bytes without
    /// a mapping become the EBCDIC substitution character.
    pub fn to_ebcdic(self, s: &str) -> Vec<u8> {
        let t = self.tables();
        s.bytes().map(|b| t.a2e[b as usize]).collect()
    }

    /// Translates EBCDIC bytes to an ASCII string. Bytes without a
    /// mapping become ASCII SUB.
    pub fn to_ascii(self, data: &[u8]) -> String {
        let t = self.tables();
        data.iter().map(|&b| t.e2a[b as usize] as char).collect()
    }
}

/// Selects the process-wide codepage. The first call wins; later calls
/// are ignored.
pub fn set_codepage(cp: Codepage) {
    let _ = ACTIVE.set(cp);
}

fn active() -> Codepage {
    ACTIVE.get().copied().unwrap_or(Codepage::Bracket)
}

/// Translates with the process-wide codepage. See [`Codepage::to_ebcdic`].
pub fn to_ebcdic(s: &str) -> Vec<u8> {
    active().to_ebcdic(s)
}

/// Translates with the process-wide codepage. See [`Codepage::to_ascii`].
pub fn to_ascii(data: &[u8]) -> String {
    active().to_ascii(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_name_to_ebcdic() {
        assert_eq!(
            Codepage::Bracket.to_ebcdic("SYS1.MACLIB"),
            [0xE2, 0xE8, 0xE2, 0xF1, 0x4B, 0xD4, 0xC1, 0xC3, 0xD3, 0xC9, 0xC2]
        );
    }

    #[test]
    fn ebcdic_to_ascii() {
        assert_eq!(
            Codepage::Bracket.to_ascii(&[0xD1, 0xD6, 0xC2, 0xF0, 0xF0, 0xF1, 0xF2, 0xF3]),
            "JOB00123"
        );
        assert_eq!(Codepage::Bracket.to_ascii(&[0x40, 0x40]), "  ");
    }

    #[test]
    fn bracket_positions_differ_between_variants() {
        assert_eq!(Codepage::Bracket.to_ebcdic("[]"), [0xAD, 0xBD]);
        assert_eq!(Codepage::Cp37.to_ebcdic("[]"), [0xBA, 0xBB]);
        assert_eq!(Codepage::Bracket.to_ascii(&[0xAD, 0xBD]), "[]");
        assert_eq!(Codepage::Cp37.to_ascii(&[0xBA, 0xBB]), "[]");
    }

    #[test]
    fn printable_ascii_round_trips() {
        for cp in [Codepage::Bracket, Codepage::Cp37] {
            for b in 0x20u8..0x7F {
                let s = (b as char).to_string();
                let e = cp.to_ebcdic(&s);
                assert_ne!(e[0], SUB_EBCDIC, "no EBCDIC mapping for {:?}", b as char);
                assert_eq!(cp.to_ascii(&e), s, "round trip failed for {:?}", b as char);
            }
        }
    }

    #[test]
    fn unknown_bytes_substitute() {
        assert_eq!(Codepage::Bracket.to_ebcdic("\u{7f}"), [SUB_EBCDIC]);
        // 0xFF has no assignment in either table.
        assert_eq!(
            Codepage::Bracket.to_ascii(&[0xFF]),
            (SUB_ASCII as char).to_string()
        );
    }
}
