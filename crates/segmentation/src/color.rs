//! Class-to-color table

use rand::RngCore;
use rand_mt::Mt;
use std::sync::Arc;
use tracing::debug;

use crate::SegmentationError;

/// Seed of the color generator (the standard MT19937 default seed)
pub const DEFAULT_COLOR_SEED: u32 = 5489;

/// Largest number of classes a table will hold by default
pub const DEFAULT_MAX_CLASSES: usize = 256;

/// RGB triple
pub type Rgb = [u8; 3];

/// Anything that can turn a class index into a color
pub trait ClassPalette {
    /// Color for `class`, or [`SegmentationError::InvalidIndex`]
    fn class_color(&mut self, class: i64) -> Result<Rgb, SegmentationError>;

    /// Reject `class` without touching any state
    fn check_index(&self, class: i64) -> Result<usize, SegmentationError>;
}

/// Draw an integer uniform in `[low, high]`.
///
/// Widens each 32-bit draw by the range size and keeps the high word,
/// rejecting the few low words that would bias the result. This is the
/// mapping libstdc++ uses for 32-bit engines, so palettes match masks
/// rendered by existing C++ tooling.
pub fn sample_inclusive<R: RngCore + ?Sized>(rng: &mut R, low: u32, high: u32) -> u32 {
    debug_assert!(low <= high);
    let range = u64::from(high - low) + 1;
    if range > u64::from(u32::MAX) {
        return low.wrapping_add(rng.next_u32());
    }

    let mut product = u64::from(rng.next_u32()) * range;
    let mut low_word = product as u32;
    if u64::from(low_word) < range {
        let range32 = range as u32;
        let threshold = range32.wrapping_neg() % range32;
        while low_word < threshold {
            product = u64::from(rng.next_u32()) * range;
            low_word = product as u32;
        }
    }
    low + (product >> 32) as u32
}

/// Lazily grown, deterministic class color table.
///
/// Colors are drawn from a single MT19937 stream, three draws per class in
/// R, G, B order. Requesting an index that is already cached never advances
/// the generator, so the table only depends on how far it has grown.
/// Colors are not guaranteed to be unique.
pub struct ColorTable {
    colors: Vec<Rgb>,
    rng: Mt,
    seed: u32,
    max_classes: usize,
}

impl ColorTable {
    /// Create an empty table seeded with `seed`
    pub fn new(seed: u32, max_classes: usize) -> Self {
        Self {
            colors: Vec::new(),
            rng: Mt::new(seed),
            seed,
            max_classes,
        }
    }

    /// Seed the table was created with
    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn max_classes(&self) -> usize {
        self.max_classes
    }

    /// Number of classes generated so far
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Generated colors in class order
    pub fn as_slice(&self) -> &[Rgb] {
        &self.colors
    }

    /// Color for `class`, growing the table as needed
    pub fn color(&mut self, class: i64) -> Result<Rgb, SegmentationError> {
        let index = self.check_index(class)?;
        if index >= self.colors.len() {
            self.grow_to(index + 1);
        }
        Ok(self.colors[index])
    }

    /// Grow the table to hold at least `len` classes (capped at the maximum)
    pub fn prefill(&mut self, len: usize) {
        self.grow_to(len.min(self.max_classes));
    }

    /// Snapshot of the current table for lock-free shared reads
    pub fn freeze(&self) -> FrozenPalette {
        FrozenPalette {
            colors: Arc::from(self.colors.as_slice()),
        }
    }

    fn grow_to(&mut self, len: usize) {
        if len <= self.colors.len() {
            return;
        }
        debug!("Growing color table from {} to {} classes", self.colors.len(), len);
        self.colors.reserve(len - self.colors.len());
        while self.colors.len() < len {
            let r = sample_inclusive(&mut self.rng, 0, 255) as u8;
            let g = sample_inclusive(&mut self.rng, 0, 255) as u8;
            let b = sample_inclusive(&mut self.rng, 0, 255) as u8;
            self.colors.push([r, g, b]);
        }
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::new(DEFAULT_COLOR_SEED, DEFAULT_MAX_CLASSES)
    }
}

impl ClassPalette for ColorTable {
    fn class_color(&mut self, class: i64) -> Result<Rgb, SegmentationError> {
        self.color(class)
    }

    fn check_index(&self, class: i64) -> Result<usize, SegmentationError> {
        match usize::try_from(class) {
            Ok(index) if index < self.max_classes => Ok(index),
            _ => Err(SegmentationError::InvalidIndex {
                index: class,
                max: self.max_classes,
            }),
        }
    }
}

/// Immutable color table shared between threads
#[derive(Debug, Clone)]
pub struct FrozenPalette {
    colors: Arc<[Rgb]>,
}

impl FrozenPalette {
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color for `class` if it was generated before freezing
    pub fn get(&self, class: i64) -> Result<Rgb, SegmentationError> {
        let index = self.check_index(class)?;
        Ok(self.colors[index])
    }
}

impl ClassPalette for FrozenPalette {
    fn class_color(&mut self, class: i64) -> Result<Rgb, SegmentationError> {
        self.get(class)
    }

    fn check_index(&self, class: i64) -> Result<usize, SegmentationError> {
        match usize::try_from(class) {
            Ok(index) if index < self.colors.len() => Ok(index),
            _ => Err(SegmentationError::InvalidIndex {
                index: class,
                max: self.colors.len(),
            }),
        }
    }
}
