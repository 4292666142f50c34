//! Morse codec: ASCII to binary Morse code and paddle-collected code to ASCII
//!
//! A binary code is read MSB first, `0` = Dit, `1` = Dah, and ends with a
//! `1` stop bit. Eight bits therefore carry at most seven elements.
//! `0x00` means "nothing to send".

use crate::types::Element;

/// Explicit word space (4T on top of the 3T character space)
pub const WORD_SPACE_CODE: u8 = 0xFF;
/// Explicit character space: stop bit alone, no elements
pub const CHAR_SPACE_CODE: u8 = 0x80;

/// Longest element sequence a binary code can carry
pub const MAX_ELEMENTS: u8 = 7;

const TABLE_OFFSET: u8 = 0x20;

// ITU-R M.1677-1 plus the usual keyer punctuation. Prosigns sit on
// punctuation characters: + AR, & AS, * BK, ( KN, = BT, > SK.
const CODE: [u8; 64] = [
    WORD_SPACE_CODE, // space
    0b1010_1110,     // !
    0b0100_1010,     // "
    0,               // #
    0b0001_0011,     // $
    0,               // %
    0b0100_0100,     // & AS
    0b0111_1010,     // '
    0b1011_0100,     // ( KN
    0b1011_0110,     // )
    0b1000_1011,     // * BK
    0b0101_0100,     // + AR
    0b1100_1110,     // ,
    0b1000_0110,     // -
    0b0101_0110,     // .
    0b1001_0100,     // /
    0b1111_1100,     // 0
    0b0111_1100,     // 1
    0b0011_1100,     // 2
    0b0001_1100,     // 3
    0b0000_1100,     // 4
    0b0000_0100,     // 5
    0b1000_0100,     // 6
    0b1100_0100,     // 7
    0b1110_0100,     // 8
    0b1111_0100,     // 9
    0b1110_0010,     // :
    0b1010_1010,     // ;
    0b0101_0100,     // < same as AR
    0b1000_1100,     // = BT
    0b0001_0110,     // > SK
    0b0011_0010,     // ?
    0b0110_1010,     // @
    0b0110_0000,     // A
    0b1000_1000,     // B
    0b1010_1000,     // C
    0b1001_0000,     // D
    0b0100_0000,     // E
    0b0010_1000,     // F
    0b1101_0000,     // G
    0b0000_1000,     // H
    0b0010_0000,     // I
    0b0111_1000,     // J
    0b1011_0000,     // K
    0b0100_1000,     // L
    0b1110_0000,     // M
    0b1010_0000,     // N
    0b1111_0000,     // O
    0b0110_1000,     // P
    0b1101_1000,     // Q
    0b0101_0000,     // R
    0b0001_0000,     // S
    0b1100_0000,     // T
    0b0011_0000,     // U
    0b0001_1000,     // V
    0b0111_0000,     // W
    0b1001_1000,     // X
    0b1011_1000,     // Y
    0b1100_1000,     // Z
    0,               // [
    0,               // backslash
    0,               // ]
    0,               // ^
    0b0011_0110,     // _
];

/// Table-driven Morse conversion
pub struct MorseCodec;

impl MorseCodec {
    /// Convert a printable ASCII character to its binary code, `0` if unsupported
    pub fn encode(ascii: u8) -> u8 {
        let ascii = match ascii {
            b'|' => return CHAR_SPACE_CODE,
            b'a'..=b'z' => ascii.to_ascii_uppercase(),
            0x20..=0x5F => ascii,
            _ => return 0,
        };
        CODE[(ascii - TABLE_OFFSET) as usize]
    }

    /// Convert a two-byte UTF-8 letter (Ä Ö Ü, Ч Ш Ю Я in either case).
    ///
    /// Returns `0` for anything else.
    pub fn utf8_to_code(prefix: u8, utf8_char: u8) -> u8 {
        match (prefix, utf8_char) {
            // Ä ä, Я я
            (0xC3, 0x84) | (0xC3, 0xA4) | (0xD0, 0xAF) | (0xD1, 0x8F) => 0x58,
            // Ö ö, Ч ч
            (0xC3, 0x96) | (0xC3, 0xB6) | (0xD0, 0xA7) | (0xD1, 0x87) => 0xE8,
            // Ü ü, Ю ю
            (0xC3, 0x9C) | (0xC3, 0xBC) | (0xD0, 0xAE) | (0xD1, 0x8E) => 0x38,
            // Ш ш
            (0xD0, 0xA8) | (0xD1, 0x88) => 0xF8,
            _ => 0,
        }
    }

    /// True for bytes that open a two-byte sequence `utf8_to_code` understands
    pub fn is_utf8_prefix(byte: u8) -> bool {
        matches!(byte, 0xC3 | 0xD0 | 0xD1)
    }

    /// Decode a code collected from the paddles.
    ///
    /// The collected code carries a leading start bit followed by the elements,
    /// the last element in the LSB. It is left-aligned so the start bit lands
    /// on bit 8, a stop bit is appended, and the low byte is looked up.
    /// An empty collection decodes as a space, an unknown pattern as `None`.
    pub fn decode(collected: u16) -> Option<u8> {
        if collected > 0xFF {
            return None;
        }
        let mut aligned = (collected << 8) | CHAR_SPACE_CODE as u16;
        while aligned & 0xFE00 != 0 {
            aligned >>= 1;
        }
        let code = aligned as u8;
        if code == CHAR_SPACE_CODE {
            return Some(b' ');
        }
        // index 0 is the word space marker, not an element pattern
        CODE.iter()
            .skip(1)
            .position(|&entry| entry == code)
            .map(|index| index as u8 + TABLE_OFFSET + 1)
    }
}

/// Collects Dit/Dah elements sent from the paddles into a decodable code
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodeCollector {
    code: u16,
    elements: u8,
}

impl Default for CodeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeCollector {
    pub const fn new() -> Self {
        Self { code: 1, elements: 0 }
    }

    /// Shift in one element; spaces are ignored
    pub fn push(&mut self, element: Element) {
        let bit = match element {
            Element::Dit => 0,
            Element::Dah => 1,
            _ => return,
        };
        if self.elements == 0 {
            self.code = 1;
        }
        if self.elements <= MAX_ELEMENTS {
            self.code = (self.code << 1) | bit;
        }
        self.elements = self.elements.saturating_add(1);
    }

    pub fn is_empty(&self) -> bool {
        self.elements == 0
    }

    /// Take the collected code and start over.
    ///
    /// Sequences longer than seven elements yield a code no table entry matches.
    pub fn finish(&mut self) -> Option<u16> {
        if self.elements == 0 {
            return None;
        }
        let code = if self.elements > MAX_ELEMENTS { u16::MAX } else { self.code };
        *self = Self::new();
        Some(code)
    }
}

/// Elements of a binary code in sending order
pub fn elements_of(code: u8) -> impl Iterator<Item = Element> {
    let mut remaining = code;
    core::iter::from_fn(move || {
        if remaining == 0 || remaining == CHAR_SPACE_CODE || remaining == WORD_SPACE_CODE {
            return None;
        }
        let element = if remaining & 0x80 != 0 { Element::Dah } else { Element::Dit };
        remaining <<= 1;
        Some(element)
    })
}
