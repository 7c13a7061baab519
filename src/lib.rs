pub mod checksum;
pub mod color;
pub mod image;
pub mod block;
pub mod names;
pub mod icon;
pub mod header;
pub mod container;

pub use checksum::{checksum, Checksum};
pub use header::{G3aHeader, HEADER_SIZE};
pub use icon::{Icon, IconSet, MonoIcon};
pub use names::{Locale, LocalizedNames};
pub use container::{build, extract_icons, update_icons, BuildOptions, ContainerError};
