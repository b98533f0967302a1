//! Decoded pixel buffers.

/// Interleaved `f32` pixel buffer.
///
/// Samples are stored pixel-major: all bands of pixel (0, 0), then all bands
/// of pixel (1, 0), and so on row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bands: usize,
    data: Vec<f32>,
}

impl PixelBuffer {
    /// Wrap raw samples. The length is not checked here; see [`PixelBuffer::is_consistent`].
    pub fn new(width: u32, height: u32, bands: usize, data: Vec<f32>) -> Self {
        Self {
            width,
            height,
            bands,
            data,
        }
    }

    /// Buffer with every sample set to `value`.
    pub fn filled(width: u32, height: u32, bands: usize, value: f32) -> Self {
        let len = width as usize * height as usize * bands;
        Self::new(width, height, bands, vec![value; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Number of samples implied by the dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bands
    }

    /// Returns `true` when the buffer is non-empty and its sample count
    /// matches its dimensions.
    pub fn is_consistent(&self) -> bool {
        self.bands > 0 && self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }

    /// Samples of the pixel at local coordinates `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[f32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * self.bands;
        self.data.get(start..start + self.bands)
    }

    /// Iterate over pixels as band slices.
    pub fn pixels(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.bands.max(1))
    }

    /// Size of the sample data in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}
