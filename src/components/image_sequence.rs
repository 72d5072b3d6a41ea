//! Image sequence buffers.
//!
//! An [`ImageSequence`] owns the host memory for one acquisition run: `depth`
//! planes of `bytes_per_pixel * width * height` bytes each. Two layouts are
//! supported:
//!
//! - [`SequenceLayout::Fragmented`]: one page-aligned allocation per plane
//! - [`SequenceLayout::Contiguous`]: a single page-aligned block split into
//!   equal planes
//!
//! Caller-owned memory is wrapped with [`SequenceView::wrap`], a borrowed view
//! whose lifetime is tied to the owner.
//!
//! # Example
//!
//! ```
//! use daq_driver_dcam::{ImageSequence, SequenceLayout};
//!
//! let mut seq = ImageSequence::new(2, 64, 32, 3, SequenceLayout::Contiguous)?;
//! seq.plane_mut(1)?.fill(0xAB);
//!
//! let mut flat = vec![0u8; seq.size_in_bytes()];
//! seq.consolidate_to(&mut flat)?;
//! assert_eq!(flat[seq.plane_bytes()], 0xAB);
//!
//! seq.free();
//! assert!(seq.is_free());
//! # Ok::<(), daq_driver_dcam::DcamError>(())
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DcamError, Result};

/// Default alignment of every plane and block in bytes.
pub const DEFAULT_PAGE_ALIGNMENT: usize = 4096;

/// Memory layout of an [`ImageSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceLayout {
    /// One allocation per plane.
    #[default]
    Fragmented,
    /// One allocation holding every plane back to back.
    Contiguous,
}

impl SequenceLayout {
    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fragmented => "fragmented",
            Self::Contiguous => "contiguous",
        }
    }
}

// =============================================================================
// Aligned storage
// =============================================================================

/// Zero-initialised byte region whose start is aligned to `align`.
///
/// Over-allocates by `align` bytes and exposes the aligned window. The
/// backing `Vec` is never resized, so the window stays put when the region
/// is moved.
struct AlignedRegion {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedRegion {
    fn allocate(len: usize, align: usize) -> Result<Self> {
        let total = len
            .checked_add(align)
            .ok_or(DcamError::Allocation { bytes: len })?;
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(total)
            .map_err(|_| DcamError::Allocation { bytes: total })?;
        storage.resize(total, 0);

        let offset = storage.as_ptr().align_offset(align);
        if offset.checked_add(len).map_or(true, |end| end > total) {
            return Err(DcamError::Allocation { bytes: total });
        }
        Ok(Self {
            storage,
            offset,
            len,
        })
    }

    fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

enum Storage {
    Fragmented(Vec<AlignedRegion>),
    Contiguous(AlignedRegion),
    Freed,
}

// =============================================================================
// ImageSequence
// =============================================================================

/// Owned buffer for a sequence of image planes.
pub struct ImageSequence {
    bytes_per_pixel: usize,
    width: usize,
    height: usize,
    depth: usize,
    layout: SequenceLayout,
    alignment: usize,
    timestamp_ns: u64,
    storage: Storage,
}

impl ImageSequence {
    /// Allocate a zeroed sequence with [`DEFAULT_PAGE_ALIGNMENT`].
    ///
    /// # Errors
    ///
    /// - [`DcamError::InvalidArgument`] if any dimension is zero or the total
    ///   size overflows.
    /// - [`DcamError::Allocation`] if any region cannot be allocated. No
    ///   partially built sequence is returned.
    pub fn new(
        bytes_per_pixel: usize,
        width: usize,
        height: usize,
        depth: usize,
        layout: SequenceLayout,
    ) -> Result<Self> {
        Self::with_alignment(
            bytes_per_pixel,
            width,
            height,
            depth,
            layout,
            DEFAULT_PAGE_ALIGNMENT,
        )
    }

    /// Allocate a zeroed sequence aligned to `alignment` (a power of two).
    pub fn with_alignment(
        bytes_per_pixel: usize,
        width: usize,
        height: usize,
        depth: usize,
        layout: SequenceLayout,
        alignment: usize,
    ) -> Result<Self> {
        if bytes_per_pixel == 0 || width == 0 || height == 0 || depth == 0 {
            return Err(DcamError::InvalidArgument(format!(
                "image sequence dimensions must be non-zero (bpp {bytes_per_pixel}, {width}x{height}, depth {depth})"
            )));
        }
        if !alignment.is_power_of_two() {
            return Err(DcamError::InvalidArgument(format!(
                "alignment {alignment} is not a power of two"
            )));
        }
        let plane_bytes = bytes_per_pixel
            .checked_mul(width)
            .and_then(|n| n.checked_mul(height))
            .ok_or_else(|| DcamError::InvalidArgument("plane size overflows".into()))?;
        let total = plane_bytes
            .checked_mul(depth)
            .ok_or_else(|| DcamError::InvalidArgument("sequence size overflows".into()))?;

        let storage = match layout {
            SequenceLayout::Fragmented => Storage::Fragmented(
                (0..depth)
                    .map(|_| AlignedRegion::allocate(plane_bytes, alignment))
                    .collect::<Result<Vec<_>>>()?,
            ),
            SequenceLayout::Contiguous => {
                Storage::Contiguous(AlignedRegion::allocate(total, alignment)?)
            }
        };

        debug!(
            bytes_per_pixel,
            width,
            height,
            depth,
            layout = layout.as_str(),
            total_bytes = total,
            "Allocated image sequence"
        );

        Ok(Self {
            bytes_per_pixel,
            width,
            height,
            depth,
            layout,
            alignment,
            timestamp_ns: 0,
            storage,
        })
    }

    /// Bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// Plane width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Plane height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of planes.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Memory layout.
    pub fn layout(&self) -> SequenceLayout {
        self.layout
    }

    /// Alignment of every plane start for fragmented sequences, and of the
    /// block start for contiguous ones.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Bytes in one plane.
    pub fn plane_bytes(&self) -> usize {
        self.bytes_per_pixel * self.width * self.height
    }

    /// Bytes in the whole sequence, identical for both layouts.
    pub fn size_in_bytes(&self) -> usize {
        self.plane_bytes() * self.depth
    }

    /// Number of separate allocations backing the sequence (0 once freed).
    pub fn fragment_count(&self) -> usize {
        match &self.storage {
            Storage::Fragmented(regions) => regions.len(),
            Storage::Contiguous(_) => 1,
            Storage::Freed => 0,
        }
    }

    /// Time of the last frame transfer, in nanoseconds since the Unix epoch.
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Overwrite the transfer timestamp.
    pub fn set_timestamp_ns(&mut self, timestamp_ns: u64) {
        self.timestamp_ns = timestamp_ns;
    }

    /// Whether [`free`](Self::free) has been called.
    pub fn is_free(&self) -> bool {
        matches!(self.storage, Storage::Freed)
    }

    /// # Errors
    ///
    /// [`DcamError::BufferFreed`] once [`free`](Self::free) has been called.
    pub fn ensure_not_freed(&self) -> Result<()> {
        if self.is_free() {
            Err(DcamError::BufferFreed)
        } else {
            Ok(())
        }
    }

    /// Release all memory. Calling this again has no effect.
    pub fn free(&mut self) {
        if !self.is_free() {
            debug!(
                depth = self.depth,
                total_bytes = self.size_in_bytes(),
                "Freeing image sequence"
            );
            self.storage = Storage::Freed;
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        self.ensure_not_freed()?;
        if index >= self.depth {
            return Err(DcamError::PlaneOutOfRange {
                index,
                depth: self.depth,
            });
        }
        Ok(())
    }

    /// Plane `index`.
    ///
    /// # Errors
    ///
    /// [`DcamError::BufferFreed`] or [`DcamError::PlaneOutOfRange`].
    pub fn plane(&self, index: usize) -> Result<&[u8]> {
        self.check_index(index)?;
        let plane_bytes = self.plane_bytes();
        match &self.storage {
            Storage::Fragmented(regions) => Ok(regions[index].as_slice()),
            Storage::Contiguous(block) => {
                let start = index * plane_bytes;
                Ok(&block.as_slice()[start..start + plane_bytes])
            }
            Storage::Freed => Err(DcamError::BufferFreed),
        }
    }

    /// Plane `index`, mutably.
    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        self.check_index(index)?;
        let plane_bytes = self.plane_bytes();
        match &mut self.storage {
            Storage::Fragmented(regions) => Ok(regions[index].as_mut_slice()),
            Storage::Contiguous(block) => {
                let start = index * plane_bytes;
                Ok(&mut block.as_mut_slice()[start..start + plane_bytes])
            }
            Storage::Freed => Err(DcamError::BufferFreed),
        }
    }

    /// Every plane at once, in order.
    pub fn planes_mut(&mut self) -> Result<Vec<&mut [u8]>> {
        let plane_bytes = self.plane_bytes();
        match &mut self.storage {
            Storage::Fragmented(regions) => {
                Ok(regions.iter_mut().map(AlignedRegion::as_mut_slice).collect())
            }
            Storage::Contiguous(block) => {
                Ok(block.as_mut_slice().chunks_exact_mut(plane_bytes).collect())
            }
            Storage::Freed => Err(DcamError::BufferFreed),
        }
    }

    /// Every plane as a borrowed view.
    pub fn view(&self) -> Result<SequenceView<'_>> {
        let planes = (0..self.depth)
            .map(|i| self.plane(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(SequenceView {
            planes,
            bytes_per_pixel: self.bytes_per_pixel,
            width: self.width,
            height: self.height,
        })
    }

    /// Depth-1 view over plane `index`, sharing its memory.
    pub fn single_plane(&self, index: usize) -> Result<SequenceView<'_>> {
        Ok(SequenceView {
            planes: vec![self.plane(index)?],
            bytes_per_pixel: self.bytes_per_pixel,
            width: self.width,
            height: self.height,
        })
    }

    /// Copy every plane, in order and without gaps, to the start of `dest`.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    ///
    /// # Errors
    ///
    /// [`DcamError::DestinationTooSmall`] if `dest` is shorter than
    /// [`size_in_bytes`](Self::size_in_bytes), or [`DcamError::BufferFreed`].
    pub fn consolidate_to(&self, dest: &mut [u8]) -> Result<usize> {
        self.view()?.consolidate_to(dest)
    }
}

impl fmt::Display for ImageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImageSequence {}x{}x{} @ {} B/px ({}, {} bytes",
            self.width,
            self.height,
            self.depth,
            self.bytes_per_pixel,
            self.layout.as_str(),
            self.size_in_bytes()
        )?;
        if self.is_free() {
            f.write_str(", freed")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for ImageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSequence")
            .field("bytes_per_pixel", &self.bytes_per_pixel)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .field("layout", &self.layout)
            .field("fragments", &self.fragment_count())
            .field("timestamp_ns", &self.timestamp_ns)
            .finish()
    }
}

// =============================================================================
// SequenceView
// =============================================================================

/// Borrowed, read-only sequence of planes.
#[derive(Debug, Clone)]
pub struct SequenceView<'a> {
    planes: Vec<&'a [u8]>,
    bytes_per_pixel: usize,
    width: usize,
    height: usize,
}

impl<'a> SequenceView<'a> {
    /// Wrap caller-owned plane memory.
    ///
    /// Each plane must hold at least `bytes_per_pixel * width * height`
    /// bytes; anything beyond that is ignored.
    ///
    /// # Errors
    ///
    /// [`DcamError::InvalidArgument`] if there are no planes, a dimension is
    /// zero, or a plane is too short.
    pub fn wrap(
        planes: Vec<&'a [u8]>,
        bytes_per_pixel: usize,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        if planes.is_empty() || bytes_per_pixel == 0 || width == 0 || height == 0 {
            return Err(DcamError::InvalidArgument(
                "wrapped sequence needs at least one plane and non-zero dimensions".into(),
            ));
        }
        let plane_bytes = bytes_per_pixel
            .checked_mul(width)
            .and_then(|n| n.checked_mul(height))
            .ok_or_else(|| DcamError::InvalidArgument("plane size overflows".into()))?;
        let planes = planes
            .into_iter()
            .enumerate()
            .map(|(i, plane)| {
                plane.get(..plane_bytes).ok_or_else(|| {
                    DcamError::InvalidArgument(format!(
                        "plane {i} holds {} bytes, need {plane_bytes}",
                        plane.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            planes,
            bytes_per_pixel,
            width,
            height,
        })
    }

    /// Bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// Plane width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Plane height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of planes.
    pub fn depth(&self) -> usize {
        self.planes.len()
    }

    /// Bytes in one plane.
    pub fn plane_bytes(&self) -> usize {
        self.bytes_per_pixel * self.width * self.height
    }

    /// Bytes in all planes.
    pub fn size_in_bytes(&self) -> usize {
        self.plane_bytes() * self.planes.len()
    }

    /// Plane `index`.
    pub fn plane(&self, index: usize) -> Result<&'a [u8]> {
        self.planes
            .get(index)
            .copied()
            .ok_or(DcamError::PlaneOutOfRange {
                index,
                depth: self.planes.len(),
            })
    }

    /// Every plane, in order.
    pub fn planes(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.planes.iter().copied()
    }

    /// Copy every plane, in order, to the start of `dest`.
    pub fn consolidate_to(&self, dest: &mut [u8]) -> Result<usize> {
        let needed = self.size_in_bytes();
        if dest.len() < needed {
            return Err(DcamError::DestinationTooSmall {
                needed,
                available: dest.len(),
            });
        }
        for (chunk, plane) in dest.chunks_exact_mut(self.plane_bytes()).zip(&self.planes) {
            chunk.copy_from_slice(plane);
        }
        Ok(needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(layout: SequenceLayout) -> ImageSequence {
        let mut seq = ImageSequence::new(2, 16, 8, 4, layout).unwrap();
        for (i, plane) in seq.planes_mut().unwrap().into_iter().enumerate() {
            plane.fill(i as u8 + 1);
        }
        seq
    }

    #[test]
    fn test_size_matches_across_layouts() {
        let frag = ImageSequence::new(2, 100, 50, 3, SequenceLayout::Fragmented).unwrap();
        let cont = ImageSequence::new(2, 100, 50, 3, SequenceLayout::Contiguous).unwrap();
        assert_eq!(frag.size_in_bytes(), cont.size_in_bytes());
        assert_eq!(frag.size_in_bytes(), 2 * 100 * 50 * 3);
        assert_eq!(frag.fragment_count(), 3);
        assert_eq!(cont.fragment_count(), 1);
    }

    #[test]
    fn test_planes_are_page_aligned() {
        let frag = ImageSequence::new(1, 33, 7, 3, SequenceLayout::Fragmented).unwrap();
        for i in 0..3 {
            assert_eq!(frag.plane(i).unwrap().as_ptr() as usize % DEFAULT_PAGE_ALIGNMENT, 0);
        }
        let cont = ImageSequence::new(1, 33, 7, 3, SequenceLayout::Contiguous).unwrap();
        assert_eq!(cont.plane(0).unwrap().as_ptr() as usize % DEFAULT_PAGE_ALIGNMENT, 0);
    }

    #[test]
    fn test_contiguous_planes_do_not_overlap() {
        let seq = filled(SequenceLayout::Contiguous);
        let base = seq.plane(0).unwrap().as_ptr() as usize;
        for i in 0..seq.depth() {
            let plane = seq.plane(i).unwrap();
            assert_eq!(plane.as_ptr() as usize - base, i * seq.plane_bytes());
            assert!(plane.iter().all(|&b| b == i as u8 + 1));
        }
    }

    #[test]
    fn test_consolidate_preserves_order() {
        for layout in [SequenceLayout::Fragmented, SequenceLayout::Contiguous] {
            let seq = filled(layout);
            let mut flat = vec![0u8; seq.size_in_bytes() + 10];
            assert_eq!(seq.consolidate_to(&mut flat).unwrap(), seq.size_in_bytes());
            for (i, chunk) in flat[..seq.size_in_bytes()]
                .chunks(seq.plane_bytes())
                .enumerate()
            {
                assert_eq!(chunk, seq.plane(i).unwrap());
            }
            assert!(flat[seq.size_in_bytes()..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_consolidate_destination_too_small() {
        let seq = filled(SequenceLayout::Fragmented);
        let mut flat = vec![0u8; seq.size_in_bytes() - 1];
        let err = seq.consolidate_to(&mut flat).unwrap_err();
        assert!(matches!(
            err,
            DcamError::DestinationTooSmall { needed, available }
                if needed == 1024 && available == 1023
        ));
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut seq = filled(SequenceLayout::Contiguous);
        assert!(!seq.is_free());
        seq.free();
        assert!(seq.is_free());
        seq.free();
        assert!(seq.is_free());
        assert_eq!(seq.fragment_count(), 0);
        assert!(matches!(seq.plane(0), Err(DcamError::BufferFreed)));
        assert!(matches!(seq.planes_mut(), Err(DcamError::BufferFreed)));
        assert!(seq.ensure_not_freed().is_err());
        assert!(seq.to_string().contains("freed"));
    }

    #[test]
    fn test_plane_out_of_range() {
        let mut seq = filled(SequenceLayout::Fragmented);
        assert!(matches!(
            seq.plane(4),
            Err(DcamError::PlaneOutOfRange { index: 4, depth: 4 })
        ));
        assert!(seq.plane_mut(9).is_err());
    }

    #[test]
    fn test_single_plane_view_shares_memory() {
        let seq = filled(SequenceLayout::Fragmented);
        let view = seq.single_plane(2).unwrap();
        assert_eq!(view.depth(), 1);
        assert_eq!(view.plane(0).unwrap().as_ptr(), seq.plane(2).unwrap().as_ptr());
        assert_eq!(view.size_in_bytes(), seq.plane_bytes());
    }

    #[test]
    fn test_wrap_caller_memory() {
        let a = vec![1u8; 12];
        let b = vec![2u8; 16];
        let view = SequenceView::wrap(vec![a.as_slice(), b.as_slice()], 1, 4, 3).unwrap();
        assert_eq!(view.depth(), 2);
        assert_eq!(view.plane(1).unwrap().len(), 12);

        let mut flat = [0u8; 24];
        view.consolidate_to(&mut flat).unwrap();
        assert_eq!(&flat[..12], &a[..]);
        assert!(flat[12..].iter().all(|&x| x == 2));

        let short = vec![0u8; 4];
        assert!(SequenceView::wrap(vec![short.as_slice()], 1, 4, 3).is_err());
        assert!(SequenceView::wrap(Vec::new(), 1, 4, 3).is_err());
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(matches!(
            ImageSequence::new(2, 0, 8, 1, SequenceLayout::Fragmented),
            Err(DcamError::InvalidArgument(_))
        ));
        assert!(ImageSequence::with_alignment(1, 4, 4, 1, SequenceLayout::Contiguous, 3000).is_err());
    }

    #[test]
    fn test_timestamp_and_display() {
        let mut seq = ImageSequence::new(2, 8, 4, 2, SequenceLayout::Fragmented).unwrap();
        seq.set_timestamp_ns(42);
        assert_eq!(seq.timestamp_ns(), 42);
        assert_eq!(
            seq.to_string(),
            "ImageSequence 8x4x2 @ 2 B/px (fragmented, 128 bytes)"
        );
    }
}
