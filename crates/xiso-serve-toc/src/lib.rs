//! The two `TocBuilder` backends (§4.5 XISO passthrough, §4.6 directory
//! synthesis) behind one tagged-variant capability set, plus the XBE
//! certificate title extraction shared by the `PatchEngine` and the
//! Façade.

pub mod builder;
pub mod directory_builder;
pub mod name_tree;
pub mod xbe;
pub mod xiso_builder;

pub use builder::TocBuilder;
pub use directory_builder::DirectoryTocBuilder;
pub use name_tree::{NameTree, PreorderEntry};
pub use xbe::{extract_title, TitleInfo, TitleSource};
pub use xiso_builder::XisoTocBuilder;
