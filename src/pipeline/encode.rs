//! Lossy re-encoding: `RasterPage` → baseline JPEG bytes.
//!
//! The JPEG stream is embedded verbatim into the output PDF as a `DCTDecode`
//! image, so what the encoder produces here is exactly what a reader decodes.
//! Quality is the main size lever: 10 gives heavy blocking, 100 is close to
//! lossless and can make the output larger than the source.

use super::render::RasterPage;
use crate::error::DegradeError;
use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

/// One page, ready to be placed into the output document.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub width: u32,
    pub height: u32,
    /// A complete JFIF stream, `FF D8 … FF D9`.
    pub jpeg: Vec<u8>,
}

/// Encode `page` as an RGB JPEG at `quality` (1–100).
///
/// `page_number` is 1-indexed and only used in the error.
pub fn encode_page(
    page: &RasterPage,
    quality: u8,
    page_number: usize,
) -> Result<EncodedPage, DegradeError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(page)
        .map_err(|e| DegradeError::EncodeFailed {
            page: page_number,
            detail: e.to_string(),
        })?;

    debug!(
        "Encoded page {} ({}x{}) → {} bytes JPEG q{}",
        page_number,
        page.width(),
        page.height(),
        jpeg.len(),
        quality
    );

    Ok(EncodedPage {
        width: page.width(),
        height: page.height(),
        jpeg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn busy_page() -> RasterPage {
        RasterPage::from_fn(96, 64, |x, y| {
            Rgb([(x * 31 % 256) as u8, (y * 17 % 256) as u8, ((x ^ y) * 5 % 256) as u8])
        })
    }

    #[test]
    fn produces_a_jpeg_stream() {
        let encoded = encode_page(&busy_page(), 50, 1).unwrap();
        assert_eq!((encoded.width, encoded.height), (96, 64));
        assert_eq!(&encoded.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&encoded.jpeg[encoded.jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn lower_quality_is_smaller() {
        let page = busy_page();
        let low = encode_page(&page, 10, 1).unwrap();
        let high = encode_page(&page, 95, 1).unwrap();
        assert!(
            low.jpeg.len() < high.jpeg.len(),
            "q10 = {} bytes, q95 = {} bytes",
            low.jpeg.len(),
            high.jpeg.len()
        );
    }

    #[test]
    fn encoded_page_decodes_to_same_dimensions() {
        let encoded = encode_page(&busy_page(), 60, 1).unwrap();
        let decoded = image::load_from_memory(&encoded.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (96, 64));
    }
}
