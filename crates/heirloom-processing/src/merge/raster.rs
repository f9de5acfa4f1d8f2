//! Image parts rendered as single full-bleed pages.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Object, Stream};

use super::{MergeError, OutputDocument};

#[derive(Debug, thiserror::Error)]
pub(super) enum RasterError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has zero width or height")]
    Empty,

    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl OutputDocument {
    /// Append one page showing `bytes` at 1 point per pixel.
    pub(super) fn append_image(&mut self, bytes: &[u8]) -> Result<(), RasterError> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(RasterError::Empty);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(rgb.as_raw())
            .map_err(MergeError::from)?;
        let compressed = encoder.finish().map_err(MergeError::from)?;

        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "FlateDecode",
            },
            compressed,
        ));

        let content = format!("q {} 0 0 {} 0 0 cm /Im1 Do Q", width, height);
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), (width as i64).into(), (height as i64).into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im1" => image_id,
                },
            },
            "Contents" => content_id,
        });
        self.kids.push(page_id);

        Ok(())
    }
}
