//! Layered frames and the front/back swap.
//!
//! The rasterizer owns the back frame outright and writes it without any
//! locking. At the end of a frame the finished back frame becomes the new
//! front: the lock is held only while one `Arc` replaces another, so a
//! reader either gets the whole old frame or the whole new one.

use std::sync::{Arc, PoisonError, RwLock};

/// Foreground pixel with nothing drawn.
pub const TRANSPARENT: u32 = 0;

/// One frame as two ARGB32 layers. Border and text live in `background`;
/// sprite pixels live in `foreground`, [`TRANSPARENT`] elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    background: Box<[u32]>,
    foreground: Box<[u32]>,
    number: u64,
}

impl Frame {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            background: vec![0xFF00_0000; width * height].into_boxed_slice(),
            foreground: vec![TRANSPARENT; width * height].into_boxed_slice(),
            number: 0,
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Frames completed before this one.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    #[must_use]
    pub fn background(&self) -> &[u32] {
        &self.background
    }

    #[must_use]
    pub fn foreground(&self) -> &[u32] {
        &self.foreground
    }

    /// Background and foreground of one row.
    pub(crate) fn row_mut(&mut self, y: usize) -> (&mut [u32], &mut [u32]) {
        let span = y * self.width..(y + 1) * self.width;
        (
            &mut self.background[span.clone()],
            &mut self.foreground[span],
        )
    }

    /// Pixel at (`x`, `y`) with sprites over the background.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y * self.width + x;
        Some(match self.foreground[i] {
            TRANSPARENT => self.background[i],
            sprite => sprite,
        })
    }

    /// Both layers flattened into one ARGB32 image.
    #[must_use]
    pub fn composite(&self) -> Vec<u32> {
        self.background
            .iter()
            .zip(self.foreground.iter())
            .map(|(&bg, &fg)| if fg == TRANSPARENT { bg } else { fg })
            .collect()
    }
}

/// Read side of the double buffer. Cheap to clone, `Send + Sync`.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    front: Arc<RwLock<Arc<Frame>>>,
}

impl FrameHandle {
    /// The last completed frame.
    #[must_use]
    pub fn current(&self) -> Arc<Frame> {
        let front = self.front.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*front)
    }
}

/// Back frame plus the shared front.
#[derive(Debug)]
pub struct FrameBuffers {
    back: Frame,
    /// The previous front, reused once no reader holds it.
    spare: Option<Frame>,
    front: Arc<RwLock<Arc<Frame>>>,
}

impl FrameBuffers {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            back: Frame::new(width, height),
            spare: None,
            front: Arc::new(RwLock::new(Arc::new(Frame::new(width, height)))),
        }
    }

    pub fn back_mut(&mut self) -> &mut Frame {
        &mut self.back
    }

    #[must_use]
    pub fn handle(&self) -> FrameHandle {
        FrameHandle {
            front: Arc::clone(&self.front),
        }
    }

    /// Publish the back frame and start a new one.
    pub fn swap(&mut self) {
        let (width, height) = (self.back.width, self.back.height);
        let number = self.back.number;
        let mut next = self
            .spare
            .take()
            .unwrap_or_else(|| Frame::new(width, height));
        next.number = number + 1;
        let finished = std::mem::replace(&mut self.back, next);

        let previous = {
            let mut front = self.front.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *front, Arc::new(finished))
        };
        // Reuse the old allocation unless a reader still has it
        self.spare = Arc::try_unwrap(previous).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_publishes_back_frame() {
        let mut buffers = FrameBuffers::new(4, 2);
        let handle = buffers.handle();
        buffers.back_mut().row_mut(1).0[3] = 0xFFFF_FFFF;
        assert_eq!(handle.current().pixel(3, 1), Some(0xFF00_0000));

        buffers.swap();
        let front = handle.current();
        assert_eq!(front.pixel(3, 1), Some(0xFFFF_FFFF));
        assert_eq!(front.number(), 0);
        assert_eq!(buffers.back_mut().number(), 1);
    }

    #[test]
    fn held_frame_is_never_reused() {
        let mut buffers = FrameBuffers::new(2, 1);
        let handle = buffers.handle();
        buffers.swap();
        let held = handle.current();
        buffers.swap();
        buffers.back_mut().row_mut(0).0[0] = 0xFF12_3456;
        buffers.swap();
        assert_eq!(held.pixel(0, 0), Some(0xFF00_0000));
        assert_eq!(held.number(), 0);
    }

    #[test]
    fn foreground_overrides_background_in_composite() {
        let mut frame = Frame::new(2, 1);
        let (bg, fg) = frame.row_mut(0);
        bg.fill(0xFF11_1111);
        fg[1] = 0xFF22_2222;
        assert_eq!(frame.composite(), vec![0xFF11_1111, 0xFF22_2222]);
    }
}
