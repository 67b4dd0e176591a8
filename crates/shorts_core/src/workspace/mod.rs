//! On-disk workspace: stage directories, item discovery and relocation,
//! and the pre-run reset.

mod items;
mod layout;
mod reset;

pub use items::{
    discover_items, files_with_prefix, load_sidecar, move_file, relocate, remove_if_exists,
    remove_item,
};
pub use layout::{is_video, WorkspaceLayout, VIDEO_EXTENSIONS};
pub use reset::{ResetError, ResetReport, WorkspaceReset};
