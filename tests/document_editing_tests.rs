use image::{Rgba, RgbaImage};
use photofe::canvas::Bounds;
use photofe::document::Document;
use photofe::history::MAX_HISTORY;

fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(px))
}

/// Paint a filled rectangle onto the active layer through the documented
/// edit path: compute after-image, then apply_edit with tight bounds.
fn paint_rect(doc: &mut Document, bounds: Bounds, color: [u8; 4], label: &str) {
    let layer_index = doc.canvas.active_layer_index;
    let before = doc.canvas.layers[layer_index].pixels.clone();
    let mut after = before.clone();
    for y in bounds.y..bounds.y + bounds.h {
        for x in bounds.x..bounds.x + bounds.w {
            after.put_pixel(x, y, Rgba(color));
        }
    }
    doc.apply_edit(layer_index, label.to_string(), &before, after, Some(bounds))
        .expect("edit applies");
}

#[test]
fn brush_strokes_undo_in_reverse_order() {
    let mut doc = Document::from_image("photo.png".into(), solid(32, 32, [255, 255, 255, 255]));

    paint_rect(&mut doc, Bounds::new(0, 0, 4, 4), [255, 0, 0, 255], "red stroke");
    paint_rect(&mut doc, Bounds::new(8, 8, 4, 4), [0, 255, 0, 255], "green stroke");
    paint_rect(&mut doc, Bounds::new(16, 16, 4, 4), [0, 0, 255, 255], "blue stroke");

    assert_eq!(doc.history.undo_count(), 3);
    assert_eq!(doc.history.undo_description(), Some("blue stroke"));

    doc.undo().unwrap();
    let layer = &doc.canvas.layers[0].pixels;
    assert_eq!(layer.get_pixel(16, 16), &Rgba([255, 255, 255, 255]), "blue stroke gone");
    assert_eq!(layer.get_pixel(8, 8), &Rgba([0, 255, 0, 255]), "green stroke intact");

    doc.undo().unwrap();
    doc.undo().unwrap();
    let layer = &doc.canvas.layers[0].pixels;
    assert_eq!(layer.get_pixel(0, 0), &Rgba([255, 255, 255, 255]), "back to the loaded image");
    assert!(!doc.undo().unwrap(), "nothing left to undo");
}

#[test]
fn full_session_inverse_law() {
    let mut doc = Document::new_untitled(1, 24, 24);
    let initial = doc.canvas.layers[0].pixels.clone();

    for i in 0..10u32 {
        paint_rect(
            &mut doc,
            Bounds::new(i * 2, i * 2, 3, 3),
            [(i * 25) as u8, 0, 255 - (i * 25) as u8, 255],
            &format!("stroke {}", i),
        );
    }
    let final_state = doc.canvas.layers[0].pixels.clone();

    for _ in 0..10 {
        assert!(doc.undo().unwrap());
    }
    assert_eq!(doc.canvas.layers[0].pixels.as_raw(), initial.as_raw());

    for _ in 0..10 {
        assert!(doc.redo().unwrap());
    }
    assert_eq!(doc.canvas.layers[0].pixels.as_raw(), final_state.as_raw());
}

#[test]
fn history_caps_at_max_and_drops_the_oldest() {
    let mut doc = Document::new_untitled(1, 16, 16);
    for i in 0..(MAX_HISTORY + 7) {
        paint_rect(
            &mut doc,
            Bounds::new((i % 12) as u32, (i % 12) as u32, 2, 2),
            [i as u8, 0, 0, 255],
            &format!("stroke {}", i),
        );
    }
    assert_eq!(doc.history.undo_count(), MAX_HISTORY);

    let mut undone = 0;
    while doc.undo().unwrap() {
        undone += 1;
    }
    assert_eq!(undone, MAX_HISTORY, "only the retained depth is undoable");
}

#[test]
fn undo_beyond_depth_cannot_reach_the_original_state() {
    let mut doc = Document::new_untitled(1, 8, 8);
    let small_history = 3;
    // Rebuild with a small cap to keep the test fast.
    doc.history = photofe::HistoryManager::new(small_history);

    for i in 0..5u32 {
        paint_rect(&mut doc, Bounds::new(0, 0, 8, 8), [i as u8 * 50, 0, 0, 255], "fill");
    }
    while doc.undo().unwrap() {}
    // Two evicted edits: the floor is the state after edit 1, not the blank
    // canvas.
    assert_eq!(
        doc.canvas.layers[0].pixels.get_pixel(0, 0),
        &Rgba([50, 0, 0, 255])
    );
}

#[test]
fn redo_branch_dies_on_new_edit() {
    let mut doc = Document::new_untitled(1, 8, 8);
    paint_rect(&mut doc, Bounds::new(0, 0, 2, 2), [1, 1, 1, 255], "a");
    paint_rect(&mut doc, Bounds::new(0, 0, 2, 2), [2, 2, 2, 255], "b");
    doc.undo().unwrap();
    assert!(doc.history.can_redo());

    paint_rect(&mut doc, Bounds::new(4, 4, 2, 2), [3, 3, 3, 255], "c");
    assert!(!doc.history.can_redo());
    assert_eq!(doc.history.undo_count(), 2);
}

#[test]
fn save_load_edit_undo_round_trip() {
    let dir = std::env::temp_dir().join("photofe_doc_tests");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("session.png");

    let source = RgbaImage::from_fn(12, 12, |x, y| Rgba([x as u8 * 20, y as u8 * 20, 0, 255]));
    photofe::io::save_image(&path, &source).unwrap();

    let loaded = photofe::io::load_image(&path).unwrap();
    let mut doc = Document::from_image(path.clone(), loaded);
    assert_eq!(doc.name, "session.png");

    paint_rect(&mut doc, Bounds::new(2, 2, 4, 4), [255, 255, 255, 255], "white patch");
    doc.undo().unwrap();
    assert_eq!(doc.canvas.layers[0].pixels.as_raw(), source.as_raw());

    let _ = std::fs::remove_file(&path);
}
