//! Split-screen viewport layout and the compositor seam.

use crate::memory::Address;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        }
    }
}

/// Equal horizontal bands, player 0 on top.
pub fn split_viewports(width: u32, height: u32, players: usize) -> Vec<Viewport> {
    if players == 0 || width == 0 || height == 0 {
        return Vec::new();
    }
    let band = height as f32 / players as f32;
    (0..players)
        .map(|i| Viewport {
            x: 0.0,
            y: band * i as f32,
            width: width as f32,
            height: band,
        })
        .collect()
}

/// Graphics-side collaborator invoked from the present and resize hooks.
///
/// `surface` is the swap chain handed to the present call.
pub trait Compositor: Send + Sync {
    /// Back-buffer dimensions of `surface`.
    fn surface_size(&self, surface: Address) -> Option<(u32, u32)>;

    /// Apply the per-player viewports for this frame.
    fn compose(&self, surface: Address, viewports: &[Viewport]);

    /// Drop any resources tied to the current back buffers.
    fn release(&self);
}
