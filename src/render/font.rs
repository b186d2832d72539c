//! 8x8 bitmap glyphs from `font8x8`. Each glyph is eight rows, bit 0 is the leftmost column.

use font8x8::{UnicodeFonts, BASIC_FONTS};

pub const GLYPH_WIDTH: usize = 8;
pub const GLYPH_HEIGHT: usize = 8;

/// 1文字の送り幅（グリフ右端の空白列が字間になる）
pub fn advance(scale: i32) -> i32 {
    GLYPH_WIDTH as i32 * scale
}

/// 表にない文字は '?' で代用
pub fn glyph(c: char) -> Option<[u8; GLYPH_HEIGHT]> {
    BASIC_FONTS.get(c).or_else(|| BASIC_FONTS.get('?'))
}
