//! IPS patch format: 5-byte magic `PATCH`, a sequence of address/length/
//! payload records terminated by the literal ASCII `EOF`, with a
//! zero-length record meaning an RLE run instead of a literal payload.
//! Always targets `default.xbe`; never title-scoped.

use std::fs;
use std::path::Path;

use crate::model::{Operation, Patch, SubPatch};

const MAGIC: &[u8] = b"PATCH";
const EOF_MARKER: [u8; 3] = *b"EOF";
const DEFAULT_TARGET: &str = "default.xbe";

pub fn parse(path: &Path) -> Option<Patch> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("cannot read IPS patch '{}': {}", path.display(), e);
            return None;
        }
    };

    match parse_bytes(&bytes) {
        Ok(operations) => Some(Patch {
            title_id: None,
            name: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            author: None,
            sub_patches: vec![SubPatch {
                target_file: Some(DEFAULT_TARGET.to_string()),
                operations,
            }],
        }),
        Err(e) => {
            tracing::warn!("invalid IPS patch '{}': {}", path.display(), e);
            None
        }
    }
}

fn parse_bytes(bytes: &[u8]) -> Result<Vec<Operation>, String> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err("missing PATCH magic".to_string());
    }

    let mut pos = MAGIC.len();
    let mut operations = Vec::new();

    loop {
        let address_bytes = read_exact(bytes, &mut pos, 3)?;
        if address_bytes == EOF_MARKER {
            break;
        }
        let address = u32::from(address_bytes[0]) << 16
            | u32::from(address_bytes[1]) << 8
            | u32::from(address_bytes[2]);

        let length_bytes = read_exact(bytes, &mut pos, 2)?;
        let length = u16::from_be_bytes(length_bytes.try_into().unwrap());

        let patched_bytes = if length == 0 {
            let rle_header = read_exact(bytes, &mut pos, 2)?;
            let run_length = u16::from_be_bytes(rle_header.try_into().unwrap());
            let byte = read_exact(bytes, &mut pos, 1)?[0];
            vec![byte; run_length as usize]
        } else {
            read_exact(bytes, &mut pos, length as usize)?.to_vec()
        };

        operations.push(Operation::Address {
            address: address as u64,
            patched_bytes,
        });
    }

    Ok(operations)
}

fn read_exact<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], String> {
    let end = pos.checked_add(n).filter(|&e| e <= bytes.len());
    match end {
        Some(end) => {
            let slice = &bytes[*pos..end];
            *pos = end;
            Ok(slice)
        }
        None => Err("unexpected end of IPS file".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_ips(contents: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::with_suffix(".ips").unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_literal_record_round_trip() {
        let mut data = Vec::new();
        data.extend_from_slice(b"PATCH");
        data.extend_from_slice(&0x00ABCDu32.to_be_bytes()[1..]); // 3-byte address
        data.extend_from_slice(&0x0003u16.to_be_bytes()); // length
        data.extend_from_slice(&[0x01, 0x02, 0x03]);
        data.extend_from_slice(b"EOF");

        let f = write_ips(&data);
        let patch = parse(f.path()).expect("should parse");
        assert_eq!(patch.sub_patches.len(), 1);
        assert_eq!(patch.sub_patches[0].operations.len(), 1);
        match &patch.sub_patches[0].operations[0] {
            Operation::Address {
                address,
                patched_bytes,
            } => {
                assert_eq!(*address, 0xABCD);
                assert_eq!(patched_bytes, &[0x01, 0x02, 0x03]);
            }
            _ => panic!("expected Address operation"),
        }
    }

    #[test]
    fn test_rle_record() {
        let mut data = Vec::new();
        data.extend_from_slice(b"PATCH");
        data.extend_from_slice(&0x000010u32.to_be_bytes()[1..]);
        data.extend_from_slice(&0x0000u16.to_be_bytes()); // length == 0 => RLE
        data.extend_from_slice(&0x0004u16.to_be_bytes()); // run length
        data.push(0x7F);
        data.extend_from_slice(b"EOF");

        let f = write_ips(&data);
        let patch = parse(f.path()).unwrap();
        match &patch.sub_patches[0].operations[0] {
            Operation::Address { patched_bytes, .. } => {
                assert_eq!(patched_bytes, &[0x7F, 0x7F, 0x7F, 0x7F]);
            }
            _ => panic!("expected Address operation"),
        }
    }

    #[test]
    fn test_rejects_missing_magic() {
        let f = write_ips(b"NOTAPATCH");
        assert!(parse(f.path()).is_none());
    }
}
