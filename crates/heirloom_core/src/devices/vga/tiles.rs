/*
    Heirloom

    Copyright 2025-2026 The Heirloom Developers

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    devices::vga::tiles.rs

    Dirty-tile grid over the output surface.

*/

use crate::devices::screen::{MAX_SCREEN_HEIGHT, MAX_SCREEN_WIDTH};

pub const TILE_WIDTH: u32 = 16;
pub const TILE_HEIGHT: u32 = 24;
pub const TILE_COLUMNS: u32 = MAX_SCREEN_WIDTH / TILE_WIDTH;
pub const TILE_ROWS: u32 = MAX_SCREEN_HEIGHT / TILE_HEIGHT;

/// One flag per 16x24 tile of the largest surface. Only tiles inside the current surface are
/// ever marked.
pub struct TileGrid {
    dirty: Vec<bool>,
    width: u32,
    height: u32,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self {
            dirty: vec![false; (TILE_COLUMNS * TILE_ROWS) as usize],
            width: 0,
            height: 0,
        }
    }
}

impl TileGrid {
    /// Change the surface the grid covers. Every tile inside it becomes dirty.
    pub fn set_surface(&mut self, width: u32, height: u32) {
        self.width = width.min(MAX_SCREEN_WIDTH);
        self.height = height.min(MAX_SCREEN_HEIGHT);
        self.dirty.fill(false);
        self.mark_all();
    }

    pub fn surface(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Tile columns and rows covering the surface.
    pub fn extent(&self) -> (u32, u32) {
        (self.width.div_ceil(TILE_WIDTH), self.height.div_ceil(TILE_HEIGHT))
    }

    pub fn mark_all(&mut self) {
        let (cols, rows) = self.extent();
        for ty in 0..rows {
            for tx in 0..cols {
                self.dirty[(ty * TILE_COLUMNS + tx) as usize] = true;
            }
        }
    }

    /// Mark every tile overlapping the pixel rectangle [x0, x1) by [y0, y1).
    pub fn mark_region(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        for ty in y0 / TILE_HEIGHT..=(y1 - 1) / TILE_HEIGHT {
            for tx in x0 / TILE_WIDTH..=(x1 - 1) / TILE_WIDTH {
                self.dirty[(ty * TILE_COLUMNS + tx) as usize] = true;
            }
        }
    }

    #[inline]
    pub fn is_dirty(&self, tx: u32, ty: u32) -> bool {
        tx < TILE_COLUMNS && ty < TILE_ROWS && self.dirty[(ty * TILE_COLUMNS + tx) as usize]
    }

    #[inline]
    pub fn clear(&mut self, tx: u32, ty: u32) {
        if tx < TILE_COLUMNS && ty < TILE_ROWS {
            self.dirty[(ty * TILE_COLUMNS + tx) as usize] = false;
        }
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.iter().filter(|d| **d).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_marks_overlapping_tiles() {
        let mut grid = TileGrid::default();
        grid.set_surface(640, 480);
        let (cols, rows) = grid.extent();
        for ty in 0..rows {
            for tx in 0..cols {
                grid.clear(tx, ty);
            }
        }
        assert_eq!(grid.dirty_count(), 0);

        // Straddles a tile row boundary
        grid.mark_region(16, 23, 24, 25);
        assert!(grid.is_dirty(1, 0));
        assert!(grid.is_dirty(1, 1));
        assert_eq!(grid.dirty_count(), 2);

        // Clipped to the surface
        grid.mark_region(700, 0, 716, 1);
        assert_eq!(grid.dirty_count(), 2);
    }

    #[test]
    fn test_set_surface_marks_only_inside() {
        let mut grid = TileGrid::default();
        grid.set_surface(320, 200);
        // 20 columns by 9 rows, the last row partly covered
        assert_eq!(grid.extent(), (20, 9));
        assert_eq!(grid.dirty_count(), 180);
    }
}
