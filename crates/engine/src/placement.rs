use core_types::Anchor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Start,
    Middle,
    End,
}

/// Horizontal and vertical alignment per anchor; `None` for custom.
fn alignment(anchor: Anchor) -> Option<(Align, Align)> {
    use Align::*;
    let pair = match anchor {
        Anchor::TopLeft => (Start, Start),
        Anchor::TopCenter => (Middle, Start),
        Anchor::TopRight => (End, Start),
        Anchor::CenterLeft => (Start, Middle),
        Anchor::Center => (Middle, Middle),
        Anchor::CenterRight => (End, Middle),
        Anchor::BottomLeft => (Start, End),
        Anchor::BottomCenter => (Middle, End),
        Anchor::BottomRight => (End, End),
        Anchor::Custom => return None,
    };
    Some(pair)
}

fn axis(align: Align, content: i64, image: i64, padding: i64) -> i64 {
    match align {
        Align::Start => padding,
        Align::Middle => (image - content) / 2,
        Align::End => image - content - padding,
    }
}

/// Keeps `[pos, pos + content)` inside `[0, image)`. When the content is
/// larger than the image it is pinned to 0.
fn clamp_axis(pos: i64, content: i64, image: i64) -> i64 {
    pos.min(image - content).max(0)
}

/// Top-left corner of the unrotated content box.
#[allow(clippy::too_many_arguments)]
pub fn resolve_position(
    anchor: Anchor,
    custom_x: i64,
    custom_y: i64,
    content_w: i64,
    content_h: i64,
    image_w: i64,
    image_h: i64,
    padding: i64,
) -> (i64, i64) {
    let (x, y) = match alignment(anchor) {
        Some((h, v)) => (
            axis(h, content_w, image_w, padding),
            axis(v, content_h, image_h, padding),
        ),
        None => (custom_x, custom_y),
    };
    (
        clamp_axis(x, content_w, image_w),
        clamp_axis(y, content_h, image_h),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::EDGE_PADDING_PX;

    const P: i64 = EDGE_PADDING_PX;

    fn at(anchor: Anchor) -> (i64, i64) {
        resolve_position(anchor, 0, 0, 40, 10, 200, 100, P)
    }

    #[test]
    fn nine_anchor_table() {
        assert_eq!(at(Anchor::TopLeft), (20, 20));
        assert_eq!(at(Anchor::TopCenter), (80, 20));
        assert_eq!(at(Anchor::TopRight), (140, 20));
        assert_eq!(at(Anchor::CenterLeft), (20, 45));
        assert_eq!(at(Anchor::Center), (80, 45));
        assert_eq!(at(Anchor::CenterRight), (140, 45));
        assert_eq!(at(Anchor::BottomLeft), (20, 70));
        assert_eq!(at(Anchor::BottomCenter), (80, 70));
        assert_eq!(at(Anchor::BottomRight), (140, 70));
    }

    #[test]
    fn custom_uses_given_coordinates() {
        assert_eq!(resolve_position(Anchor::Custom, 33, 7, 40, 10, 200, 100, P), (33, 7));
    }

    #[test]
    fn custom_is_clamped_into_the_image() {
        assert_eq!(resolve_position(Anchor::Custom, -5, -9, 40, 10, 200, 100, P), (0, 0));
        assert_eq!(
            resolve_position(Anchor::Custom, 190, 99, 40, 10, 200, 100, P),
            (160, 90)
        );
    }

    #[test]
    fn oversized_content_is_pinned_to_origin_for_every_anchor() {
        for anchor in Anchor::ALL {
            let (x, y) = resolve_position(anchor, 500, 500, 300, 10, 200, 100, P);
            assert_eq!(x, 0, "{anchor}");
            assert!(y >= 0 && y + 10 <= 100, "{anchor}: y={y}");

            let (x, y) = resolve_position(anchor, 500, 500, 40, 250, 200, 100, P);
            assert_eq!(y, 0, "{anchor}");
            assert!(x >= 0 && x + 40 <= 200, "{anchor}: x={x}");
        }
    }

    #[test]
    fn fitting_content_stays_inside_for_every_anchor() {
        for anchor in Anchor::ALL {
            for (w, h) in [(1, 1), (190, 5), (200, 100), (170, 70)] {
                let (x, y) = resolve_position(anchor, -1000, 1000, w, h, 200, 100, P);
                assert!(x >= 0 && x + w <= 200, "{anchor} {w}x{h}: x={x}");
                assert!(y >= 0 && y + h <= 100, "{anchor} {w}x{h}: y={y}");
            }
        }
    }
}
