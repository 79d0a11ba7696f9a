use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use flowfield::WindAnimator;
use image::RgbaImage;

/// Animator plus the sprite texture it paints into.
///
/// Kept as a non-send resource: the animator owns the receiving end of its viewport channel.
pub struct WindLayer {
    pub animator: WindAnimator,
    pub image: Handle<Image>,
    pub frame: RgbaImage,
}

impl WindLayer {
    pub fn new(animator: WindAnimator, image: Handle<Image>, width: u32, height: u32) -> Self {
        Self {
            animator,
            image,
            frame: RgbaImage::new(width, height),
        }
    }

    /// Clears the frame buffer, reallocating it when the viewport size changed.
    pub fn reset_frame(&mut self, width: u32, height: u32) {
        if self.frame.dimensions() != (width, height) {
            self.frame = RgbaImage::new(width, height);
        } else {
            self.frame.fill(0);
        }
    }
}

#[derive(Component)]
pub struct WindSprite;

/// Sprite texture holding one composited frame.
pub fn frame_image(frame: &RgbaImage) -> Image {
    Image::new(
        Extent3d {
            width: frame.width().max(1),
            height: frame.height().max(1),
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        if frame.width() == 0 || frame.height() == 0 {
            vec![0; 4]
        } else {
            frame.as_raw().clone()
        },
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_image_matches_buffer() {
        let frame = RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 40]));
        let image = frame_image(&frame);
        assert_eq!(image.size(), UVec2::new(4, 2));
        assert_eq!(image.data.as_deref(), Some(frame.as_raw().as_slice()));
    }

    #[test]
    fn test_empty_frame_still_makes_a_texture() {
        let image = frame_image(&RgbaImage::new(0, 0));
        assert_eq!(image.size(), UVec2::new(1, 1));
    }
}
