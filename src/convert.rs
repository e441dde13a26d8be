//! Conversion of article figure images to archival TIFF.
//!
//! Archive destinations want figures as uncompressed TIFF at a fixed
//! resolution. Source figures arrive as whatever the authors uploaded
//! (PNG, JPEG, occasionally with transparency), so conversion decodes
//! defensively, flattens any alpha channel onto a white background, and
//! re-encodes as RGB TIFF with an embedded provenance description. Only
//! the first frame of a multi-frame source is kept.

use std::io::Cursor;

use image::{ImageReader, Rgb, RgbImage};
use thiserror::Error;
use tiff::encoder::colortype::RGB8;
use tiff::encoder::{Rational, TiffEncoder};
use tiff::tags::{ResolutionUnit, Tag};
use tracing::{debug, instrument, warn};

use quick_xml::Reader;
use quick_xml::events::Event;

/// Resolution, in dots per inch, recorded in converted TIFFs.
pub const TIFF_DPI: u32 = 500;

/// One figure converted for archiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedImage {
    /// Output file name, `<graphic href>.tif`.
    pub name: String,
    /// Encoded TIFF bytes.
    pub bytes: Vec<u8>,
}

/// Errors from converting one figure.
///
/// Note on `From` trait implementations: conversions are deliberately not
/// implemented as `From` so call sites attach the failing stage explicitly.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The source bytes could not be decoded as an image.
    #[error("could not decode source image")]
    Decode {
        /// Decoder diagnostic.
        #[source]
        source: image::ImageError,
    },

    /// The decoded image could not be written as TIFF.
    #[error("could not encode TIFF")]
    Encode {
        /// Encoder diagnostic.
        #[source]
        source: tiff::TiffError,
    },
}

/// Converts source figures to uncompressed archival TIFF.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageConverter;

impl ImageConverter {
    /// Creates a converter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Converts one source image to uncompressed RGB TIFF at
    /// [`TIFF_DPI`], embedding `description` as the TIFF image
    /// description.
    ///
    /// Decoder size limits are lifted: source figures are trusted
    /// journal uploads and occasionally exceed default decode budgets.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] when the source cannot be decoded or the
    /// TIFF cannot be encoded.
    #[instrument(skip_all, fields(len = raw.len()))]
    pub fn convert(&self, raw: &[u8], description: &str) -> Result<Vec<u8>, ConvertError> {
        let mut reader = ImageReader::new(Cursor::new(raw))
            .with_guessed_format()
            .map_err(|error| ConvertError::Decode {
                source: image::ImageError::IoError(error),
            })?;
        reader.no_limits();
        let decoded = reader
            .decode()
            .map_err(|error| ConvertError::Decode { source: error })?;
        debug!(
            width = decoded.width(),
            height = decoded.height(),
            "decoded source image"
        );

        let flattened = flatten_onto_white(&decoded.to_rgba8());
        encode_tiff(&flattened, description)
            .map_err(|error| ConvertError::Encode { source: error })
    }
}

/// Composites an RGBA image over an opaque white background.
///
/// Fully opaque pixels pass through unchanged.
fn flatten_onto_white(rgba: &image::RgbaImage) -> RgbImage {
    let (width, height) = rgba.dimensions();
    let mut rgb = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.put_pixel(
            x,
            y,
            Rgb([over_white(r, a), over_white(g, a), over_white(b, a)]),
        );
    }
    rgb
}

/// One channel of `source over white`, rounded, in integer arithmetic.
fn over_white(channel: u8, alpha: u8) -> u8 {
    let a = u32::from(alpha);
    let c = u32::from(channel);
    let blended = (c * a + 255 * (255 - a) + 127) / 255;
    u8::try_from(blended).unwrap_or(u8::MAX)
}

fn encode_tiff(rgb: &RgbImage, description: &str) -> Result<Vec<u8>, tiff::TiffError> {
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut out)?;
        let mut image = encoder.new_image::<RGB8>(rgb.width(), rgb.height())?;
        image.resolution(ResolutionUnit::Inch, Rational { n: TIFF_DPI, d: 1 });
        image.encoder().write_tag(Tag::ImageDescription, description)?;
        image.write_data(rgb.as_raw())?;
    }
    Ok(out.into_inner())
}

/// The provenance text embedded in each converted TIFF.
#[must_use]
pub fn tiff_description(
    image_url: &str,
    today: chrono::NaiveDate,
    title: &str,
    doi: &str,
    published: &str,
    journal_name: &str,
) -> String {
    format!(
        "Image converted from {image_url} on {today} for article titled \
         \"{title}\", DOI {doi}, originally published on {published} in \
         {journal_name}."
    )
}

/// Finds the file name the markup assigns to the article's figure.
///
/// Looks for the first `<graphic>` element and reads its `xlink:href`
/// attribute (accepting an unprefixed `href` from sloppier producers).
/// The converted TIFF must carry this name so the markup's reference
/// stays resolvable inside the archive.
#[must_use]
pub fn graphic_name(markup: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(markup);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                if e.name().local_name().as_ref() != b"graphic" {
                    continue;
                }
                for attribute in e.attributes().flatten() {
                    let key = attribute.key.as_ref();
                    if key == b"xlink:href" || key == b"href" {
                        if let Ok(value) = attribute.unescape_value() {
                            return Some(value.into_owned());
                        }
                    }
                }
                return None;
            }
            Ok(Event::Eof) => return None,
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "unreadable markup while looking for <graphic>");
                return None;
            }
        }
    }
}
