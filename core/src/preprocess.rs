//! Image to tensor conversion.
//!
//! Every image, whatever its color type and size, becomes a single luminance
//! plane resampled to a fixed grid. The same resampled plane feeds both the
//! normalized model input and the display image, so what is shown is exactly
//! what was scored.
use std::path::Path;

use anyhow::{Context, ensure};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use tract_core::prelude::*;

/// Rank and axis order of the model input.
///
/// `Hw` is (1, H, W): a batch of one plane, without channel axis. `Chw` and
/// `Hwc` add the channel axis, in front or at the back of the spatial axes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    #[default]
    Hw,
    Chw,
    Hwc,
}

#[derive(Clone, Debug)]
pub struct Preprocessed {
    /// Normalized model input, values in [0, 1].
    pub tensor: Tensor,
    /// Resampled luminance plane, before normalization.
    pub display: GrayImage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preprocessor {
    pub width: u32,
    pub height: u32,
    pub layout: InputLayout,
}

impl Default for Preprocessor {
    fn default() -> Preprocessor {
        Preprocessor { width: 100, height: 100, layout: InputLayout::Hw }
    }
}

impl Preprocessor {
    pub fn new(width: u32, height: u32, layout: InputLayout) -> Preprocessor {
        Preprocessor { width, height, layout }
    }

    /// Shape of the tensors this preprocessor produces.
    pub fn input_shape(&self) -> TVec<usize> {
        let (h, w) = (self.height as usize, self.width as usize);
        match self.layout {
            InputLayout::Hw => tvec!(1, h, w),
            InputLayout::Chw => tvec!(1, 1, h, w),
            InputLayout::Hwc => tvec!(1, h, w, 1),
        }
    }

    /// Absent input is not an error: it yields `Ok(None)`.
    pub fn preprocess(&self, image: Option<&DynamicImage>) -> TractResult<Option<Preprocessed>> {
        let Some(image) = image else {
            return Ok(None);
        };
        ensure!(
            image.width() > 0 && image.height() > 0,
            "Can not preprocess an empty {}x{} image",
            image.width(),
            image.height()
        );
        let gray = luminance(image);
        let display = imageops::resize(&gray, self.width, self.height, FilterType::Triangle);
        let tensor = self.tensor(&display)?;
        trace!("preprocessed {}x{} image into {:?}", image.width(), image.height(), tensor.shape());
        Ok(Some(Preprocessed { tensor, display }))
    }

    fn tensor(&self, plane: &GrayImage) -> TractResult<Tensor> {
        let (h, w) = (self.height as usize, self.width as usize);
        let mut tensor: Tensor = tract_ndarray::Array3::from_shape_fn((1, h, w), |(_, y, x)| {
            plane[(x as u32, y as u32)][0] as f32 / 255.0
        })
        .into();
        match self.layout {
            InputLayout::Hw => (),
            InputLayout::Chw => tensor.insert_axis(1)?,
            InputLayout::Hwc => tensor.insert_axis(3)?,
        }
        Ok(tensor)
    }
}

/// Single luminance plane. Gray images pass through untouched, color images
/// go through ITU-R BT.601 weights, alpha is dropped.
pub fn luminance(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => image.to_luma8(),
        _ => {
            let rgb = image.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                Luma([bt601(r, g, b)])
            })
        }
    }
}

fn bt601(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

pub fn decode(bytes: &[u8]) -> TractResult<DynamicImage> {
    image::load_from_memory(bytes).context("Decoding image")
}

pub fn open(path: impl AsRef<Path>) -> TractResult<DynamicImage> {
    let path = path.as_ref();
    image::open(path).with_context(|| format!("Opening image {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]))
    }

    fn values(p: &Preprocessed) -> TractResult<Vec<f32>> {
        Ok(p.tensor.as_slice::<f32>()?.to_vec())
    }

    #[test]
    fn absent_image() -> TractResult<()> {
        assert!(Preprocessor::default().preprocess(None)?.is_none());
        Ok(())
    }

    #[test]
    fn fixed_shape_and_range() -> TractResult<()> {
        let image = DynamicImage::ImageLuma8(gradient(320, 41));
        let p = Preprocessor::default().preprocess(Some(&image))?.unwrap();
        assert_eq!(p.tensor.shape(), &[1, 100, 100]);
        assert_eq!(p.tensor.datum_type(), f32::datum_type());
        assert!(values(&p)?.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(p.display.dimensions(), (100, 100));
        Ok(())
    }

    #[test]
    fn display_matches_tensor() -> TractResult<()> {
        let image = DynamicImage::ImageLuma8(gradient(57, 211));
        let p = Preprocessor::default().preprocess(Some(&image))?.unwrap();
        let values = values(&p)?;
        for (ix, pixel) in p.display.pixels().enumerate() {
            assert_eq!(values[ix], pixel[0] as f32 / 255.0);
        }
        Ok(())
    }

    #[test]
    fn gray_and_duplicated_rgb_agree() -> TractResult<()> {
        let gray = gradient(64, 48);
        let rgb = RgbImage::from_fn(64, 48, |x, y| {
            let v = gray[(x, y)][0];
            Rgb([v, v, v])
        });
        let pre = Preprocessor::default();
        let a = pre.preprocess(Some(&DynamicImage::ImageLuma8(gray)))?.unwrap();
        let b = pre.preprocess(Some(&DynamicImage::ImageRgb8(rgb)))?.unwrap();
        assert_eq!(a.tensor, b.tensor);
        assert_eq!(a.display, b.display);
        Ok(())
    }

    #[test]
    fn alpha_is_ignored() -> TractResult<()> {
        let rgb = RgbImage::from_fn(30, 30, |x, y| Rgb([x as u8 * 8, y as u8 * 8, 90]));
        let rgba = RgbaImage::from_fn(30, 30, |x, y| Rgba([x as u8 * 8, y as u8 * 8, 90, 0]));
        let pre = Preprocessor::default();
        let a = pre.preprocess(Some(&DynamicImage::ImageRgb8(rgb)))?.unwrap();
        let b = pre.preprocess(Some(&DynamicImage::ImageRgba8(rgba)))?.unwrap();
        assert_eq!(a.tensor, b.tensor);
        Ok(())
    }

    #[test]
    fn luminance_weights() {
        assert_eq!(bt601(255, 0, 0), 76);
        assert_eq!(bt601(0, 255, 0), 150);
        assert_eq!(bt601(0, 0, 255), 29);
        assert_eq!(bt601(255, 255, 255), 255);
        assert_eq!(bt601(0, 0, 0), 0);
    }

    #[test]
    fn constant_image_stays_constant() -> TractResult<()> {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(13, 250, Luma([200])));
        let p = Preprocessor::default().preprocess(Some(&image))?.unwrap();
        assert!(values(&p)?.iter().all(|v| *v == 200.0 / 255.0));
        Ok(())
    }

    #[test]
    fn layouts() -> TractResult<()> {
        let image = DynamicImage::ImageLuma8(gradient(20, 20));
        for (layout, shape) in [
            (InputLayout::Hw, vec![1usize, 32, 24]),
            (InputLayout::Chw, vec![1, 1, 32, 24]),
            (InputLayout::Hwc, vec![1, 32, 24, 1]),
        ] {
            let pre = Preprocessor::new(24, 32, layout);
            let p = pre.preprocess(Some(&image))?.unwrap();
            assert_eq!(p.tensor.shape(), &*shape);
            assert_eq!(&*pre.input_shape(), &*shape);
            assert_eq!(p.display.dimensions(), (24, 32));
        }
        Ok(())
    }

    #[test]
    fn empty_image_is_an_error() {
        let image = DynamicImage::new_luma8(0, 12);
        assert!(Preprocessor::default().preprocess(Some(&image)).is_err());
    }

    #[test]
    fn decode_garbage() {
        assert!(decode(b"definitely not a png").is_err());
    }

    #[test]
    fn decode_png() -> TractResult<()> {
        let mut bytes = std::io::Cursor::new(vec![]);
        DynamicImage::ImageLuma8(gradient(8, 8))
            .write_to(&mut bytes, image::ImageOutputFormat::Png)?;
        let image = decode(bytes.get_ref())?;
        assert_eq!((image.width(), image.height()), (8, 8));
        Ok(())
    }
}
