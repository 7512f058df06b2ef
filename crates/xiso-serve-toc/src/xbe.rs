//! XBE certificate title extraction, shared by the Façade (title resolution
//! for request logging / cache keys) and the `PatchEngine` (media-patch
//! title id, `select()`'s title match).

use xiso_serve_core::{Result, XBE_CERT_ADDRESS_OFFSET, XBE_CERT_LENGTH};

/// `title_id` and `title_name` as read from an XBE certificate, or both
/// `None` when the certificate offset is absent or out of range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleInfo {
    pub title_id: Option<String>,
    pub title_name: Option<String>,
}

/// Minimal random-access byte view an `.xbe` file can be read through,
/// satisfied by a plain file handle or by a `TocBuilder`'s file-region
/// accessor.
pub trait TitleSource {
    fn len(&mut self) -> Result<u64>;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Reads the little-endian uint16 certificate offset at byte 280, then the
/// title id (4 bytes at `cert_offset + 8`, byte-reversed, lowercase hex) and
/// title name (40 bytes at `cert_offset + 12`, UTF-16LE, NUL-stripped).
pub fn extract_title(source: &mut dyn TitleSource) -> Result<TitleInfo> {
    let total = source.len()?;
    if total < XBE_CERT_ADDRESS_OFFSET + 2 {
        return Ok(TitleInfo::default());
    }

    let mut offset_buf = [0u8; 2];
    source.read_at(XBE_CERT_ADDRESS_OFFSET, &mut offset_buf)?;
    let cert_offset = u16::from_le_bytes(offset_buf) as u64;

    if cert_offset == 0 || cert_offset + XBE_CERT_LENGTH > total {
        return Ok(TitleInfo::default());
    }

    let mut id_buf = [0u8; 4];
    source.read_at(cert_offset + 8, &mut id_buf)?;
    id_buf.reverse();
    let title_id = Some(id_buf.iter().map(|b| format!("{:02x}", b)).collect::<String>());

    let mut name_buf = [0u8; 40];
    source.read_at(cert_offset + 12, &mut name_buf)?;
    let (decoded, _, _) = encoding_rs::UTF_16LE.decode(&name_buf);
    let trimmed = decoded.trim_end_matches('\0');
    let title_name = if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    };

    Ok(TitleInfo {
        title_id,
        title_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemSource {
        data: Vec<u8>,
    }

    impl TitleSource for MemSource {
        fn len(&mut self) -> Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
            let start = offset as usize;
            buf.copy_from_slice(&self.data[start..start + buf.len()]);
            Ok(())
        }
    }

    fn xbe_with_cert(cert_offset: u16, title_id_be: [u8; 4], title_name: &str) -> Vec<u8> {
        let mut data = vec![0u8; cert_offset as usize + XBE_CERT_LENGTH as usize];
        data[280..282].copy_from_slice(&cert_offset.to_le_bytes());

        let mut id_le = title_id_be;
        id_le.reverse();
        let cert_start = cert_offset as usize;
        data[cert_start + 8..cert_start + 12].copy_from_slice(&id_le);

        let mut name_bytes = vec![0u8; 40];
        let utf16: Vec<u16> = title_name.encode_utf16().collect();
        for (i, unit) in utf16.iter().enumerate() {
            if i * 2 + 2 > 40 {
                break;
            }
            name_bytes[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        data[cert_start + 12..cert_start + 52].copy_from_slice(&name_bytes);

        data
    }

    #[test]
    fn test_extract_title_byte_reversal() {
        let data = xbe_with_cert(400, [0xAB, 0xCD, 0x12, 0x34], "Halo");
        let mut source = MemSource { data };
        let info = extract_title(&mut source).unwrap();
        // [0xAB, 0xCD, 0x12, 0x34] reversed -> [0x34, 0x12, 0xCD, 0xAB]
        assert_eq!(info.title_id.as_deref(), Some("3412cdab"));
        assert_eq!(info.title_name.as_deref(), Some("Halo"));
    }

    #[test]
    fn test_extract_title_zero_cert_offset_is_null() {
        let mut data = vec![0u8; 1024];
        data[280..282].copy_from_slice(&0u16.to_le_bytes());
        let mut source = MemSource { data };
        let info = extract_title(&mut source).unwrap();
        assert_eq!(info, TitleInfo::default());
    }

    #[test]
    fn test_extract_title_cert_past_eof_is_null() {
        let mut data = vec![0u8; 300];
        data[280..282].copy_from_slice(&290u16.to_le_bytes());
        let mut source = MemSource { data };
        let info = extract_title(&mut source).unwrap();
        assert_eq!(info, TitleInfo::default());
    }
}
