//! Output images and shared depth maps
use std::sync::atomic::{AtomicU32, Ordering};

/// Generic image type
///
/// The image is laid out in row-major order, and can be indexed either by a
/// `usize` index or a `(row, column)` tuple.
///
/// ```text
///        0 ------------> width (columns)
///        |             |
///        |             |
///        |             |
///        V--------------
///   height (rows)
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image<P> {
    data: Vec<P>,
    width: usize,
    height: usize,
}

/// Depth image, where `0` is empty and `z + 1` means that voxel `z` is the
/// nearest filled voxel in that column
pub type DepthImage = Image<u32>;

/// Normal image, with each normal packed into an RGBA color
pub type NormalImage = Image<[u8; 4]>;

/// 2D image, where `true` marks a pixel inside the shape
pub type MaskImage = Image<bool>;

impl<P: Default + Clone> Image<P> {
    /// Builds a new image filled with `P::default()`
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![P::default(); width * height],
            width,
            height,
        }
    }
}

impl<P> Image<P> {
    /// Builds an image from row-major pixel data
    ///
    /// # Panics
    /// If the data length does not match the image size
    pub(crate) fn from_data(data: Vec<P>, width: usize, height: usize) -> Self {
        assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
        }
    }

    /// Returns the image width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height
    pub fn height(&self) -> usize {
        self.height
    }

    /// Iterates over pixel values
    pub fn iter(&self) -> impl Iterator<Item = &P> + '_ {
        self.data.iter()
    }

    /// Returns the number of pixels in the image
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Generates an image by mapping a simple function over each pixel
    pub fn map<T, F: Fn(&P) -> T>(&self, f: F) -> Image<T> {
        Image {
            data: self.data.iter().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Decomposes the image into its pixel data
    pub fn take(self) -> Vec<P> {
        self.data
    }

    /// Checks a `(row, column)` position
    ///
    /// Returns the input position in the 1D array if valid; panics otherwise
    fn decode_position(&self, pos: (usize, usize)) -> usize {
        let (row, col) = pos;
        assert!(
            row < self.height,
            "row ({row}) must be less than image height ({})",
            self.height
        );
        assert!(
            col < self.width,
            "column ({col}) must be less than image width ({})",
            self.width
        );
        row * self.width + col
    }
}

impl<'a, P: 'a> IntoIterator for &'a Image<P> {
    type Item = &'a P;
    type IntoIter = std::slice::Iter<'a, P>;
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl<P> std::ops::Index<usize> for Image<P> {
    type Output = P;
    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

/// Indexes an image with `(row, col)`
impl<P> std::ops::Index<(usize, usize)> for Image<P> {
    type Output = P;
    fn index(&self, pos: (usize, usize)) -> &Self::Output {
        let index = self.decode_position(pos);
        &self.data[index]
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Shared per-column depth map, written with atomic max
///
/// Each cell covers a square block of columns; depth values only ever
/// increase during a render.
pub(crate) struct DepthMap {
    data: Vec<AtomicU32>,
    width: usize,
    /// Number of image columns covered by each cell, along X and Y
    cell: usize,
}

impl DepthMap {
    /// Builds a zeroed depth map with the given size (in cells)
    pub fn new(width: usize, height: usize, cell: usize) -> Self {
        Self {
            data: (0..width * height).map(|_| AtomicU32::new(0)).collect(),
            width,
            cell,
        }
    }

    /// Returns the index of the cell containing the given image column
    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (x / self.cell) + (y / self.cell) * self.width
    }

    /// Reads the depth at the given image column
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.data[self.index(x, y)].load(Ordering::Relaxed)
    }

    /// Raises the depth at the given image column
    #[inline]
    pub fn fetch_max(&self, x: usize, y: usize, depth: u32) {
        self.data[self.index(x, y)].fetch_max(depth, Ordering::Relaxed);
    }

    /// Resets every cell to zero
    pub fn reset(&mut self) {
        for d in self.data.iter_mut() {
            *d.get_mut() = 0;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn image_indexing() {
        let mut data = vec![0u32; 12];
        data[5] = 7;
        let image = Image::from_data(data, 4, 3);
        assert_eq!(image[(1, 1)], 7);
        assert_eq!(image[5], 7);
        assert_eq!(image.iter().filter(|d| **d > 0).count(), 1);
        let mapped = image.map(|d| *d as f32 * 2.0);
        assert_eq!(mapped[(1, 1)], 14.0);
        assert_eq!(mapped.width(), 4);
        assert_eq!(mapped.height(), 3);
    }

    #[test]
    #[should_panic]
    fn image_out_of_bounds() {
        let image = Image::<u32>::new(4, 3);
        let _ = image[(0, 4)];
    }

    #[test]
    fn depth_map() {
        let mut m = DepthMap::new(2, 2, 4);
        m.fetch_max(5, 1, 3);
        m.fetch_max(6, 2, 2);
        assert_eq!(m.get(4, 0), 3);
        assert_eq!(m.get(7, 3), 3);
        assert_eq!(m.get(0, 0), 0);
        assert_eq!(m.get(0, 4), 0);
        m.fetch_max(0, 7, 9);
        assert_eq!(m.get(3, 4), 9);
        m.reset();
        assert_eq!(m.get(3, 4), 0);
        assert_eq!(m.get(5, 1), 0);
    }
}
