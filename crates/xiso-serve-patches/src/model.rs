//! Canonical patch representation every format parser converts into.

/// One byte-level rewrite within a patch's target file.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Already resolved to an absolute offset within the target file.
    Address {
        address: u64,
        patched_bytes: Vec<u8>,
    },
    /// Needs a byte-pattern scan against the target file's contents before
    /// it can be applied; [`crate::engine::PatchEngine::resolve`] converts
    /// this to [`Operation::Address`].
    OriginalBytes {
        original_bytes: Vec<u8>,
        patched_bytes: Vec<u8>,
    },
}

/// One patch file's worth of operations, scoped to a single target file.
#[derive(Debug, Clone)]
pub struct SubPatch {
    pub target_file: Option<String>,
    pub operations: Vec<Operation>,
}

/// A fully parsed patch, in whichever of the three on-disk formats it came
/// from (JSON, IPS, JMP), before selection or resolution.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Lowercase 8-hex-char title id this patch targets, or `None` to apply
    /// to any image (see [`crate::engine::PatchEngine::select`]).
    pub title_id: Option<String>,
    pub name: Option<String>,
    pub author: Option<String>,
    pub sub_patches: Vec<SubPatch>,
}

/// A patch after [`crate::engine::PatchEngine::resolve`] has converted every
/// operation to [`Operation::Address`] form and dropped any that could not
/// be resolved.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPatch {
    /// Resolved operations, keyed by target file path (without a leading
    /// slash, matching `TOC:`/`FILE:` region-key path conventions).
    pub by_file: std::collections::HashMap<String, Vec<(u64, Vec<u8>)>>,
}

impl ResolvedPatch {
    pub fn operations_for(&self, file: &str) -> Option<&[(u64, Vec<u8>)]> {
        self.by_file.get(file).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }
}
