//! JMP ("Jay's Magic Patcher") text patch format: a fixed two-line header, a
//! 5-line key/value block (title, region, version, author, notes), then a
//! body of find/replace hex-string line pairs with `#`-prefixed comments.

use std::fs;
use std::path::Path;

use crate::model::{Operation, Patch, SubPatch};

const HEADER_LINE: &str = "#Jay's Magic Patcher (www.jayxbox.com)";
const SYSTEM_LINE: &str = "system=Xbox";

pub fn parse(path: &Path) -> Option<Patch> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("cannot read JMP patch '{}': {}", path.display(), e);
            return None;
        }
    };

    match parse_text(&text) {
        Ok((title_id, author, target_file, operations)) => Some(Patch {
            title_id: Some(title_id),
            name: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            author: Some(author),
            sub_patches: vec![SubPatch {
                target_file,
                operations,
            }],
        }),
        Err(e) => {
            tracing::warn!("invalid JMP patch '{}': {}", path.display(), e);
            None
        }
    }
}

type ParsedJmp = (String, String, Option<String>, Vec<Operation>);

fn parse_text(text: &str) -> Result<ParsedJmp, String> {
    let mut lines = text.lines();

    let header = lines.next().ok_or("empty file")?.trim_end();
    if header != HEADER_LINE {
        return Err("missing JMP header line".to_string());
    }

    let system = lines.next().ok_or("missing system line")?.trim_end();
    if system != SYSTEM_LINE {
        return Err("unexpected system line".to_string());
    }

    let _title = key_value_line(lines.next(), "title")?;
    let _region = key_value_line(lines.next(), "region")?;
    let version = key_value_line(lines.next(), "version")?;
    let author = key_value_line(lines.next(), "author")?;
    let notes = key_value_line(lines.next(), "notes")?;

    let mut clean = !notes.contains(".xbe");
    let mut operations = Vec::new();
    let mut pending_find: Option<String> = None;

    for line in lines {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            clean = clean && !comment.contains(".xbe");
            continue;
        }

        match pending_find.take() {
            None => pending_find = Some(line.to_string()),
            Some(find) => {
                let original_bytes = decode_hex(&find)?;
                let patched_bytes = decode_hex(line)?;
                operations.push(Operation::OriginalBytes {
                    original_bytes,
                    patched_bytes,
                });
            }
        }
    }

    let title_id = version
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();
    let target_file = if clean {
        Some("default.xbe".to_string())
    } else {
        None
    };

    Ok((title_id, author, target_file, operations))
}

fn key_value_line(line: Option<&str>, key: &str) -> Result<String, String> {
    let line = line.ok_or_else(|| format!("missing {} line", key))?.trim_end();
    line.split_once('=')
        .map(|(_, v)| v.to_string())
        .ok_or_else(|| format!("malformed {} line", key))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(format!("odd-length hex string '{}'", s));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_jmp(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::with_suffix(".jmp").unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    const HEADER_BLOCK: &str = "#Jay's Magic Patcher (www.jayxbox.com)\nsystem=Xbox\ntitle=Some Game\nregion=US\nversion=ABCD1234 v1.0\nauthor=someone\nnotes=no notes\n";

    #[test]
    fn test_clean_target_default_xbe() {
        let mut contents = HEADER_BLOCK.to_string();
        contents.push_str("AABB\nCCDD\n");
        let f = write_jmp(&contents);
        let patch = parse(f.path()).expect("should parse");
        assert_eq!(patch.title_id.as_deref(), Some("abcd1234"));
        assert_eq!(patch.sub_patches[0].target_file.as_deref(), Some("default.xbe"));
        assert_eq!(patch.sub_patches[0].operations.len(), 1);
    }

    #[test]
    fn test_xbe_mentioned_in_notes_leaves_target_unresolved() {
        let contents = HEADER_BLOCK.replace("notes=no notes", "notes=patches eeprom.xbe too");
        let f = write_jmp(&contents);
        let patch = parse(f.path()).unwrap();
        assert_eq!(patch.sub_patches[0].target_file, None);
    }

    #[test]
    fn test_comment_mentioning_xbe_also_unresolves_target() {
        let mut contents = HEADER_BLOCK.to_string();
        contents.push_str("# touches save.xbe too\nAABB\nCCDD\n");
        let f = write_jmp(&contents);
        let patch = parse(f.path()).unwrap();
        assert_eq!(patch.sub_patches[0].target_file, None);
    }

    #[test]
    fn test_rejects_wrong_header() {
        let f = write_jmp("not the right header\n");
        assert!(parse(f.path()).is_none());
    }
}
