//! Opaque EXIF metadata passthrough for exported rasters
//!
//! The alignment core never looks inside the metadata; it only threads the
//! block from the source photo into the exported file. Extraction failure
//! is non-fatal: the export proceeds without metadata and logs a warning.

use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use tracing::warn;

/// An opaque metadata block lifted from the source photo.
pub struct MetadataBlock(Metadata);

impl std::fmt::Debug for MetadataBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MetadataBlock(..)")
    }
}

/// The narrow two-function contract the export compositor consumes.
pub trait MetadataService {
    /// Extract the metadata block from the original photo bytes, or `None`
    /// if there is none (or it cannot be parsed).
    fn extract(&self, photo_bytes: &[u8]) -> Option<MetadataBlock>;

    /// Reinsert a previously extracted block into freshly encoded JPEG
    /// bytes. Failure degrades to returning the bytes unchanged.
    fn reinsert(&self, block: MetadataBlock, image_bytes: Vec<u8>) -> Vec<u8>;
}

/// EXIF-backed implementation for JPEG photos.
#[derive(Debug, Default)]
pub struct ExifService;

impl MetadataService for ExifService {
    fn extract(&self, photo_bytes: &[u8]) -> Option<MetadataBlock> {
        let buffer = photo_bytes.to_vec();
        match Metadata::new_from_vec(&buffer, FileExtension::JPEG) {
            Ok(metadata) => Some(MetadataBlock(metadata)),
            Err(err) => {
                warn!("could not extract photo metadata, exporting without it: {err}");
                None
            }
        }
    }

    fn reinsert(&self, block: MetadataBlock, image_bytes: Vec<u8>) -> Vec<u8> {
        let mut bytes = image_bytes;
        let MetadataBlock(metadata) = block;
        if let Err(err) = metadata.write_to_vec(&mut bytes, FileExtension::JPEG) {
            warn!("could not reinsert metadata into export: {err}");
        }
        bytes
    }
}

/// Implementation that carries nothing; used when the caller opts out of
/// metadata handling entirely.
#[derive(Debug, Default)]
pub struct NoMetadata;

impl MetadataService for NoMetadata {
    fn extract(&self, _photo_bytes: &[u8]) -> Option<MetadataBlock> {
        None
    }

    fn reinsert(&self, _block: MetadataBlock, image_bytes: Vec<u8>) -> Vec<u8> {
        image_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_garbage_is_none() {
        let service = ExifService;
        assert!(service.extract(b"definitely not a jpeg").is_none());
    }

    #[test]
    fn test_no_metadata_service_passes_bytes_through() {
        let service = NoMetadata;
        assert!(service.extract(&[0xff, 0xd8, 0xff]).is_none());
    }
}
