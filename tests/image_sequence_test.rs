#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]
//! Image sequence layouts, consolidation and views.

use daq_driver_dcam::{DcamError, ImageSequence, SequenceLayout, SequenceView};

const LAYOUTS: [SequenceLayout; 2] = [SequenceLayout::Fragmented, SequenceLayout::Contiguous];

fn numbered(layout: SequenceLayout) -> ImageSequence {
    let mut seq = ImageSequence::new(2, 40, 30, 5, layout).unwrap();
    for (index, plane) in seq.planes_mut().unwrap().into_iter().enumerate() {
        for (offset, byte) in plane.iter_mut().enumerate() {
            *byte = (index * 7 + offset % 251) as u8;
        }
    }
    seq
}

#[test]
fn layouts_hold_the_same_bytes() {
    let fragmented = numbered(SequenceLayout::Fragmented);
    let contiguous = numbered(SequenceLayout::Contiguous);
    assert_eq!(fragmented.size_in_bytes(), contiguous.size_in_bytes());
    assert_eq!(fragmented.size_in_bytes(), 2 * 40 * 30 * 5);

    let mut a = vec![0u8; fragmented.size_in_bytes()];
    let mut b = vec![0u8; contiguous.size_in_bytes()];
    assert_eq!(fragmented.consolidate_to(&mut a).unwrap(), a.len());
    assert_eq!(contiguous.consolidate_to(&mut b).unwrap(), b.len());
    assert_eq!(a, b);
}

#[test]
fn consolidation_preserves_plane_order() {
    for layout in LAYOUTS {
        let seq = numbered(layout);
        let mut flat = vec![0u8; seq.size_in_bytes() + 16];
        seq.consolidate_to(&mut flat).unwrap();
        for (index, chunk) in flat
            .chunks_exact(seq.plane_bytes())
            .take(seq.depth())
            .enumerate()
        {
            assert_eq!(chunk, seq.plane(index).unwrap(), "{layout:?} plane {index}");
        }
        // Bytes past the sequence are untouched.
        assert!(flat[seq.size_in_bytes()..].iter().all(|&b| b == 0));
    }
}

#[test]
fn short_destination_is_rejected() {
    let seq = numbered(SequenceLayout::Contiguous);
    let mut flat = vec![0u8; seq.size_in_bytes() - 1];
    assert!(matches!(
        seq.consolidate_to(&mut flat),
        Err(DcamError::DestinationTooSmall { needed, available })
            if needed == seq.size_in_bytes() && available == flat.len()
    ));
}

#[test]
fn free_is_idempotent_and_blocks_access() {
    for layout in LAYOUTS {
        let mut seq = numbered(layout);
        seq.free();
        seq.free();
        assert!(seq.is_free());
        assert_eq!(seq.fragment_count(), 0);
        assert!(matches!(seq.plane(0), Err(DcamError::BufferFreed)));
        assert!(matches!(seq.view(), Err(DcamError::BufferFreed)));
        let mut flat = vec![0u8; seq.size_in_bytes()];
        assert!(matches!(
            seq.consolidate_to(&mut flat),
            Err(DcamError::BufferFreed)
        ));
        assert!(seq.to_string().ends_with("freed)"));
    }
}

#[test]
fn single_plane_view_shares_memory() {
    let seq = numbered(SequenceLayout::Fragmented);
    let view = seq.single_plane(3).unwrap();
    assert_eq!(view.depth(), 1);
    assert_eq!(view.plane(0).unwrap().as_ptr(), seq.plane(3).unwrap().as_ptr());
    assert!(matches!(
        view.plane(1),
        Err(DcamError::PlaneOutOfRange { index: 1, depth: 1 })
    ));
}

#[test]
fn wrapped_view_uses_caller_memory() {
    let first = vec![1u8; 64];
    let second = vec![2u8; 80];
    let view = SequenceView::wrap(vec![first.as_slice(), second.as_slice()], 1, 8, 8).unwrap();
    assert_eq!(view.size_in_bytes(), 128);
    assert_eq!(view.plane(1).unwrap().len(), 64);

    let mut flat = vec![0u8; 128];
    view.consolidate_to(&mut flat).unwrap();
    assert!(flat[..64].iter().all(|&b| b == 1));
    assert!(flat[64..].iter().all(|&b| b == 2));

    assert!(matches!(
        SequenceView::wrap(vec![&first[..10]], 1, 8, 8),
        Err(DcamError::InvalidArgument(_))
    ));
}

#[test]
fn zero_dimensions_are_rejected() {
    for (bpp, w, h, d) in [(0, 4, 4, 1), (1, 0, 4, 1), (1, 4, 0, 1), (1, 4, 4, 0)] {
        assert!(matches!(
            ImageSequence::new(bpp, w, h, d, SequenceLayout::Contiguous),
            Err(DcamError::InvalidArgument(_))
        ));
    }
}

#[test]
fn custom_alignment_applies_to_every_fragment() {
    let seq = ImageSequence::with_alignment(1, 33, 3, 4, SequenceLayout::Fragmented, 256).unwrap();
    assert_eq!(seq.alignment(), 256);
    for index in 0..seq.depth() {
        assert_eq!(seq.plane(index).unwrap().as_ptr() as usize % 256, 0);
    }
}
