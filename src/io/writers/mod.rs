//! Output writers: compressed GeoTIFFs, colour-mapped PNG previews with
//! world files, and JSON run logs.
pub mod metadata;
pub mod png;
pub mod tiff;
pub mod worldfile;
