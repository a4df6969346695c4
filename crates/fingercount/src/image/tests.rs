use approx::assert_relative_eq;

use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    let data = data
        .into_iter()
        .flat_map(|row| row.into_iter())
        .flat_map(|col| col.0)
        .collect::<Vec<_>>();
    Image::from_rgba8(Resolution::new(W as u32, H as u32), &data)
}

#[test]
fn view_sampling() {
    let image = mkimage([
        [C::YELLOW, C::WHITE, C::WHITE],
        [C::WHITE, C::RED, C::WHITE],
        [C::WHITE, C::WHITE, C::BLUE],
    ]);

    let full = image.view(image.rect());
    assert_eq!(full.sample(0.0, 0.0), C::YELLOW);
    assert_eq!(full.sample(0.5, 0.5), C::RED);
    assert_eq!(full.sample(0.99, 0.99), C::BLUE);

    let center = image.view(Rect::from_top_left(1.0, 1.0, 1.0, 1.0));
    assert_eq!(center.sample(0.5, 0.5), C::RED);

    // Views can extend past the image; those pixels are transparent.
    let padded = image.view(Rect::from_top_left(-3.0, -3.0, 9.0, 9.0));
    assert_eq!(padded.sample(0.1, 0.1), C::NULL);
    assert_eq!(padded.sample(0.4, 0.4), C::YELLOW);
    assert_eq!(padded.sample(0.5, 0.5), C::RED);
    assert_eq!(padded.sample(0.99, 0.99), C::NULL);
}

#[test]
fn view_to_image() {
    let image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);
    let copy = image.view(Rect::from_top_left(1.0, 0.0, 2.0, 2.0)).to_image();
    assert_eq!(copy.resolution(), Resolution::new(2, 2));
    assert_eq!(copy.get(0, 0), C::GREEN);
    assert_eq!(copy.get(0, 1), C::WHITE);
    assert_eq!(copy.get(1, 0), C::NULL);
}

#[test]
fn rect_bounding() {
    assert_eq!(Rect::bounding(std::iter::empty()), None);

    let rect = Rect::bounding([[1.0, 2.0], [-1.0, 5.0], [0.0, 0.0]]).unwrap();
    assert_eq!(rect, Rect::from_top_left(-1.0, 0.0, 2.0, 5.0));
    assert_eq!(rect.center(), [0.0, 2.5]);
}

#[test]
fn rect_fit_aspect() {
    let rect = Rect::from_center(0.0, 0.0, 2.0, 4.0);
    let wide = rect.grow_to_fit_aspect(1.0);
    assert_relative_eq!(wide.width(), 4.0);
    assert_relative_eq!(wide.height(), 4.0);
    assert_eq!(wide.center(), [0.0, 0.0]);

    let tall = Rect::from_top_left(0.0, 0.0, 16.0, 9.0).grow_to_fit_aspect(1.0);
    assert_eq!(tall, Rect::from_top_left(0.0, -3.5, 16.0, 16.0));
}

#[test]
fn resolution() {
    assert_eq!(Resolution::new(1280, 720).to_string(), "1280x720");
    assert_relative_eq!(Resolution::new(640, 480).aspect_ratio().unwrap(), 4.0 / 3.0);
    assert_eq!(Resolution::new(640, 0).aspect_ratio(), None);
}

#[test]
fn draw_clips_to_image() {
    let mut image = Image::new(4, 4);
    draw::circle(&mut image, 0, 0, 5).color(C::RED);
    assert_eq!(image.get(2, 0), C::RED);
    assert_eq!(image.get(0, 2), C::RED);
    assert_eq!(image.get(3, 3), C::NULL);

    draw::line(&mut image, -10, 3, 10, 3).color(C::GREEN);
    for x in 0..4 {
        assert_eq!(image.get(x, 3), C::GREEN);
    }
}

#[test]
fn draw_text_baseline() {
    let mut image = Image::new(100, 60);
    image.clear(C::BLACK);
    draw::text(&mut image, 10, 30, "Hi")
        .align_left()
        .align_baseline()
        .color(C::CYAN);

    let rows_with_text = (0..image.height())
        .filter(|&y| (0..image.width()).any(|x| image.get(x, y) == C::CYAN))
        .collect::<Vec<_>>();
    assert!(!rows_with_text.is_empty());
    // Capital letters sit on the baseline without descending below it.
    assert!(*rows_with_text.last().unwrap() <= 30);
    assert!(rows_with_text[0] > 10);
    assert!((0..10).all(|x| (0..60).all(|y| image.get(x, y) == C::BLACK)));
}

#[test]
fn decode_jpeg() {
    let mut rgb = Vec::new();
    for _ in 0..16 * 8 {
        rgb.extend_from_slice(&[200, 30, 30]);
    }
    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 95)
        .encode(&rgb, 16, 8, image::ColorType::Rgb8)
        .unwrap();

    let decoded = Image::decode_jpeg(&jpeg).unwrap();
    assert_eq!(decoded.resolution(), Resolution::new(16, 8));
    let px = decoded.get(4, 4);
    assert!(px.r() > 180 && px.g() < 60 && px.b() < 60, "{px:?}");
    assert_eq!(px.a(), 255);

    assert!(Image::decode_jpeg(b"not a jpeg").is_err());
}
