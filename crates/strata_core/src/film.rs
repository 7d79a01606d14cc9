//! Film: the framebuffer a render writes into.
//!
//! Pixels are linear radiance, row-major, top row first. Gamma is applied
//! only when exporting to an 8-bit image.

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use strata_math::Vec3;

use crate::error::{SceneError, SceneResult};

/// Snapshot of a film's contents as flat RGB floats.
#[derive(Clone, Debug, PartialEq)]
pub struct FilmBuffer {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` linear RGB values, top row first
    pub data: Vec<f32>,
}

impl FilmBuffer {
    /// Linear color at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        let i = 3 * (y as usize * self.width as usize + x as usize);
        Vec3::from_slice(&self.data[i..i + 3])
    }
}

/// A width×height buffer of linear RGB values.
///
/// Lives in the asset table, so writes go through an interior lock; renders
/// write whole buckets at once.
#[derive(Debug)]
pub struct Film {
    width: u32,
    height: u32,
    pixels: RwLock<Vec<Vec3>>,
}

impl Film {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: RwLock::new(vec![Vec3::ZERO; width as usize * height as usize]),
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Fill with black.
    pub fn clear(&self) {
        let mut pixels = self.pixels.write().unwrap_or_else(PoisonError::into_inner);
        pixels.fill(Vec3::ZERO);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        let pixels = self.pixels.read().unwrap_or_else(PoisonError::into_inner);
        pixels[self.index(x, y)]
    }

    pub fn set_pixel(&self, x: u32, y: u32, color: Vec3) {
        let mut pixels = self.pixels.write().unwrap_or_else(PoisonError::into_inner);
        let i = self.index(x, y);
        pixels[i] = color;
    }

    /// Copy a rectangular block of row-major colors into the film.
    pub fn write_block(&self, x: u32, y: u32, width: u32, colors: &[Vec3]) {
        let mut pixels = self.pixels.write().unwrap_or_else(PoisonError::into_inner);
        for (row, line) in colors.chunks(width as usize).enumerate() {
            let start = self.index(x, y) + row * self.width as usize;
            pixels[start..start + line.len()].copy_from_slice(line);
        }
    }

    /// Read accessor: a copy of the current contents as flat floats.
    pub fn buffer(&self) -> FilmBuffer {
        let pixels = self.pixels.read().unwrap_or_else(PoisonError::into_inner);
        FilmBuffer {
            width: self.width,
            height: self.height,
            data: bytemuck::cast_slice::<Vec3, f32>(&pixels).to_vec(),
        }
    }

    /// Write an 8-bit image (format from the extension), gamma 2.2 encoded.
    pub fn save(&self, path: impl AsRef<Path>) -> SceneResult<()> {
        let pixels = self.pixels.read().unwrap_or_else(PoisonError::into_inner);
        let bytes: Vec<u8> = pixels
            .iter()
            .flat_map(|c| c.to_array().map(encode_gamma))
            .collect();

        let image = image::RgbImage::from_raw(self.width, self.height, bytes)
            .ok_or_else(|| SceneError::Image("film size does not match pixel data".into()))?;
        image
            .save(path.as_ref())
            .map_err(|e| SceneError::Image(format!("{}: {}", path.as_ref().display(), e)))?;

        log::info!("Saved film to {}", path.as_ref().display());
        Ok(())
    }
}

fn encode_gamma(linear: f32) -> u8 {
    (255.0 * linear.max(0.0).powf(1.0 / 2.2).clamp(0.0, 1.0)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_flat_rgb() {
        let film = Film::new(2, 2);
        film.set_pixel(1, 0, Vec3::new(0.1, 0.2, 0.3));

        let buffer = film.buffer();
        assert_eq!(buffer.data.len(), 12);
        assert_eq!(&buffer.data[3..6], &[0.1, 0.2, 0.3]);
        assert_eq!(buffer.pixel(1, 0), Vec3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_write_block() {
        let film = Film::new(4, 3);
        let block = vec![Vec3::ONE; 4];
        film.write_block(2, 1, 2, &block);

        assert_eq!(film.pixel(2, 1), Vec3::ONE);
        assert_eq!(film.pixel(3, 2), Vec3::ONE);
        assert_eq!(film.pixel(1, 1), Vec3::ZERO);
        assert_eq!(film.pixel(2, 0), Vec3::ZERO);

        film.clear();
        assert_eq!(film.pixel(3, 2), Vec3::ZERO);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_index_does_not_wrap_for_large_films() {
        let film = Film {
            width: 70_000,
            height: 70_000,
            pixels: RwLock::new(Vec::new()),
        };
        assert_eq!(film.index(69_999, 69_999), 70_000 * 70_000 - 1);
    }

    #[test]
    fn test_gamma_encoding() {
        assert_eq!(encode_gamma(0.0), 0);
        assert_eq!(encode_gamma(1.0), 255);
        assert_eq!(encode_gamma(4.0), 255);
        assert!(encode_gamma(0.2) > 51);
    }
}
