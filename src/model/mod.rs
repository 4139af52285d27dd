pub mod layout;
pub mod manifest;

pub use layout::{GrammarLayout, LayoutError};
pub use manifest::{Manifest, ManifestEntry, ManifestError};
