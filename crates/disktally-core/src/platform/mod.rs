/// Platform glue: allocated-size probes and volume capacity lookup.
pub mod probe;
pub mod volume;

pub use probe::{DiskSizeProbe, SizeProbe};
pub use volume::{volume_info, VolumeInfo};
