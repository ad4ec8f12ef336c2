// sidcan/src/encoder.rs
//
// Encoding of display text into SID CAN frames.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Encoding of the two text rows into a burst of CAN frames.
//!
//! The display takes at most five characters per frame, so each twelve
//! character row is split into chunks of 5, 5 and 2 characters. The six
//! chunks go out as text frames on [`TEXT_ID`], top row first, with an
//! `order` field counting down from 5 to 0. Only the first frame is flagged
//! as the start of a new message. A fixed frame on [`TERMINATOR_ID`] ends
//! the burst.
//!
//! The layout of a text frame's payload:
//!
//! ```text
//! byte 0   bits 0-2: order, bit 6: new message, others zero
//! byte 1   0x96
//! byte 2   bit 0: top row, bit 1: bottom row, bit 7: changed (always set)
//! byte 3-7 letters, unused bytes zero
//! ```

use crate::{
    frame::CAN_MAX_DLEN, text::LINE_LEN, CanFrame, DecodeError, DisplayLine, Error, Result,
};
use bitflags::bitflags;
use embedded_can::StandardId;
use std::{array, iter};

/// The CAN ID of the frames carrying text.
pub const TEXT_ID: StandardId = match StandardId::new(0x337) {
    Some(id) => id,
    None => panic!("text frame ID out of range"),
};

/// The CAN ID of the frame that ends a burst.
pub const TERMINATOR_ID: StandardId = match StandardId::new(0x357) {
    Some(id) => id,
    None => panic!("terminator frame ID out of range"),
};

/// The fixed payload of the frame that ends a burst.
pub const TERMINATOR_PAYLOAD: [u8; CAN_MAX_DLEN] = [0x1F, 0x01, 0x05, 0x12, 0x00, 0x00, 0x00, 0x00];

/// The most characters a single text frame can carry.
pub const LETTERS_PER_FRAME: usize = 5;

/// The number of text frames in a burst.
pub const TEXT_FRAMES: usize = 6;

/// The number of frames in a burst, including the terminator.
pub const BURST_LEN: usize = TEXT_FRAMES + 1;

// The fixed value of the second byte in a text frame.
const MARKER: u8 = 0x96;

// The order countdown in the low bits of the first byte.
const ORDER_MASK: u8 = 0x07;

// Where the letters start in the payload.
const LETTERS_OFFSET: usize = 3;

// How each row is cut into frames.
const CHUNKS: [(usize, usize); 3] = [(0, 5), (5, 10), (10, LINE_LEN)];

bitflags! {
    /// Flags in the first (order) byte of a text frame.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OrderFlags: u8 {
        /// The frame starts a new message.
        const NEW_MESSAGE = 0x40;
    }

    /// Flags in the third (row) byte of a text frame.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RowFlags: u8 {
        /// The letters belong to the top row.
        const TOP = 0x01;
        /// The letters belong to the bottom row.
        const BOTTOM = 0x02;
        /// The row content changed.
        const CHANGED = 0x80;
    }
}

// ===== Row =====

/// The two rows of text on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Row {
    /// The upper row
    Top,
    /// The lower row
    Bottom,
}

impl Row {
    fn flag(self) -> RowFlags {
        match self {
            Row::Top => RowFlags::TOP,
            Row::Bottom => RowFlags::BOTTOM,
        }
    }
}

// ===== TextFrame =====

/// The payload of one text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextFrame {
    new_message: bool,
    order: u8,
    row: Row,
    letters: [u8; LETTERS_PER_FRAME],
}

impl TextFrame {
    // The chunk must be at most LETTERS_PER_FRAME long; CHUNKS guarantees it.
    fn with_letters(new_message: bool, order: u8, row: Row, chunk: &[u8]) -> Self {
        let mut letters = [0u8; LETTERS_PER_FRAME];
        letters[..chunk.len()].copy_from_slice(chunk);
        Self {
            new_message,
            order: order & ORDER_MASK,
            row,
            letters,
        }
    }

    /// Whether this frame starts a new message.
    pub fn is_new_message(&self) -> bool {
        self.new_message
    }

    /// The position of the frame in the burst, counting down to zero.
    pub fn order(&self) -> u8 {
        self.order
    }

    /// The row the letters belong to.
    pub fn row(&self) -> Row {
        self.row
    }

    /// The letters carried by the frame, without the zero fill.
    pub fn letters(&self) -> &[u8] {
        let n = self
            .letters
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(LETTERS_PER_FRAME);
        &self.letters[..n]
    }

    /// The letters carried by the frame, as a string.
    pub fn text(&self) -> &str {
        // Letters are validated as ASCII on every way in.
        std::str::from_utf8(self.letters()).unwrap_or_default()
    }

    /// Packs the frame into its 8-byte payload.
    pub fn encode(&self) -> [u8; CAN_MAX_DLEN] {
        let mut flags = OrderFlags::empty();
        flags.set(OrderFlags::NEW_MESSAGE, self.new_message);

        let mut data = [0u8; CAN_MAX_DLEN];
        data[0] = flags.bits() | (self.order & ORDER_MASK);
        data[1] = MARKER;
        data[2] = (RowFlags::CHANGED | self.row.flag()).bits();
        data[LETTERS_OFFSET..].copy_from_slice(&self.letters);
        data
    }

    /// Unpacks a text frame payload.
    pub fn decode(data: &[u8]) -> std::result::Result<Self, DecodeError> {
        let data: &[u8; CAN_MAX_DLEN] = data
            .try_into()
            .map_err(|_| DecodeError::WrongLength(data.len()))?;

        let flags = OrderFlags::from_bits(data[0] & !ORDER_MASK)
            .ok_or(DecodeError::ReservedBits(data[0]))?;

        if data[1] != MARKER {
            return Err(DecodeError::WrongMarker(data[1]));
        }

        let row = match RowFlags::from_bits(data[2]) {
            Some(f) if f == RowFlags::CHANGED | RowFlags::TOP => Row::Top,
            Some(f) if f == RowFlags::CHANGED | RowFlags::BOTTOM => Row::Bottom,
            _ => return Err(DecodeError::InvalidRow(data[2])),
        };

        let mut letters = [0u8; LETTERS_PER_FRAME];
        letters.copy_from_slice(&data[LETTERS_OFFSET..]);
        if !letters.is_ascii() {
            return Err(DecodeError::InvalidLetters);
        }

        Ok(Self {
            new_message: flags.contains(OrderFlags::NEW_MESSAGE),
            order: data[0] & ORDER_MASK,
            row,
            letters,
        })
    }

    /// Creates the CAN frame to send this payload.
    pub fn to_can_frame(&self) -> CanFrame {
        CanFrame::with_payload(TEXT_ID, self.encode())
    }
}

// ===== Burst =====

/// The full set of frames that puts two rows of text on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Burst {
    text: [TextFrame; TEXT_FRAMES],
}

impl Burst {
    /// Creates the burst for two display lines.
    pub fn from_lines(upper: &DisplayLine, lower: &DisplayLine) -> Self {
        Self::build(upper.as_bytes(), lower.as_bytes())
    }

    /// A burst that clears both rows.
    pub fn blank() -> Self {
        Self::from_lines(&DisplayLine::BLANK, &DisplayLine::BLANK)
    }

    fn build(upper: &[u8; LINE_LEN], lower: &[u8; LINE_LEN]) -> Self {
        let text = array::from_fn(|idx| {
            let (row, line) = if idx < CHUNKS.len() {
                (Row::Top, upper)
            } else {
                (Row::Bottom, lower)
            };
            let (start, end) = CHUNKS[idx % CHUNKS.len()];
            let order = (TEXT_FRAMES - 1 - idx) as u8;
            TextFrame::with_letters(idx == 0, order, row, &line[start..end])
        });
        Self { text }
    }

    /// The text frames, in transmission order.
    pub fn text_frames(&self) -> &[TextFrame; TEXT_FRAMES] {
        &self.text
    }

    /// The frame that ends every burst.
    pub fn terminator() -> CanFrame {
        CanFrame::with_payload(TERMINATOR_ID, TERMINATOR_PAYLOAD)
    }

    /// All the CAN frames of the burst, in transmission order.
    pub fn frames(&self) -> impl Iterator<Item = CanFrame> + '_ {
        self.text
            .iter()
            .map(TextFrame::to_can_frame)
            .chain(iter::once(Self::terminator()))
    }

    /// Gets the text the burst shows on one row.
    pub fn row_text(&self, row: Row) -> String {
        self.text
            .iter()
            .filter(|frame| frame.row() == row)
            .map(TextFrame::text)
            .collect()
    }
}

/// Encodes two rows of text into a burst.
///
/// Both lines must already be exactly [`LINE_LEN`] ASCII characters; use
/// [`DisplayLine`] to get there from arbitrary text.
///
/// The length is counted in bytes, so a 12-byte line holding multi-byte
/// characters fails with [`Error::InvalidCharacter`], while any other length
/// fails with [`Error::InvalidLineLength`].
pub fn encode_burst(upper: &str, lower: &str) -> Result<Burst> {
    Ok(Burst::build(check_line(upper)?, check_line(lower)?))
}

fn check_line(line: &str) -> Result<&[u8; LINE_LEN]> {
    let bytes: &[u8; LINE_LEN] = line
        .as_bytes()
        .try_into()
        .map_err(|_| Error::InvalidLineLength { len: line.len() })?;

    if !bytes.is_ascii() {
        return Err(Error::InvalidCharacter);
    }
    Ok(bytes)
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::{Frame as EmbeddedFrame, Id};

    const UPPER: &str = "HELLO WORLD!";
    const LOWER: &str = "GOODBYE NOW!";

    #[test]
    fn test_order_countdown() {
        let burst = encode_burst(UPPER, LOWER).unwrap();

        let orders: Vec<u8> = burst.text_frames().iter().map(TextFrame::order).collect();
        assert_eq!(vec![5, 4, 3, 2, 1, 0], orders);

        let new_msgs: Vec<bool> = burst
            .text_frames()
            .iter()
            .map(TextFrame::is_new_message)
            .collect();
        assert_eq!(vec![true, false, false, false, false, false], new_msgs);
    }

    #[test]
    fn test_chunks() {
        let burst = encode_burst("ABCDEFGHIJKL", "MNOPQRSTUVWX").unwrap();
        let text: Vec<&str> = burst.text_frames().iter().map(TextFrame::text).collect();

        assert_eq!(vec!["ABCDE", "FGHIJ", "KL", "MNOPQ", "RSTUV", "WX"], text);

        let rows: Vec<Row> = burst.text_frames().iter().map(TextFrame::row).collect();
        assert_eq!(
            vec![Row::Top, Row::Top, Row::Top, Row::Bottom, Row::Bottom, Row::Bottom],
            rows
        );
    }

    #[test]
    fn test_wire_format() {
        let burst = encode_burst("ABCDEFGHIJKL", "MNOPQRSTUVWX").unwrap();
        let frames: Vec<CanFrame> = burst.frames().collect();

        assert_eq!(BURST_LEN, frames.len());
        assert_eq!(
            &[0x45, 0x96, 0x81, b'A', b'B', b'C', b'D', b'E'],
            frames[0].data()
        );
        assert_eq!(
            &[0x03, 0x96, 0x81, b'K', b'L', 0, 0, 0],
            frames[2].data()
        );
        assert_eq!(
            &[0x02, 0x96, 0x82, b'M', b'N', b'O', b'P', b'Q'],
            frames[3].data()
        );
        assert_eq!(&[0x00, 0x96, 0x82, b'W', b'X', 0, 0, 0], frames[5].data());

        for frame in &frames[..TEXT_FRAMES] {
            assert_eq!(Id::Standard(TEXT_ID), frame.id());
            assert_eq!(0x337, frame.raw_id());
            assert_eq!(8, frame.dlc());
        }
    }

    #[test]
    fn test_terminator() {
        for (upper, lower) in [(UPPER, LOWER), ("            ", "            ")] {
            let burst = encode_burst(upper, lower).unwrap();
            let term = burst.frames().last().unwrap();

            assert_eq!(0x357, term.raw_id());
            assert_eq!(&[0x1f, 0x01, 0x05, 0x12, 0x00, 0x00, 0x00, 0x00], term.data());
        }
    }

    #[test]
    fn test_deterministic() {
        let a: Vec<CanFrame> = encode_burst(UPPER, LOWER).unwrap().frames().collect();
        let b: Vec<CanFrame> = encode_burst(UPPER, LOWER).unwrap().frames().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_length() {
        assert!(matches!(
            encode_burst("HELLO", LOWER),
            Err(Error::InvalidLineLength { len: 5 })
        ));
        assert!(matches!(
            encode_burst(UPPER, "GOODBYE FOR NOW"),
            Err(Error::InvalidLineLength { len: 15 })
        ));
    }

    #[test]
    fn test_invalid_character() {
        // 12 bytes, but only 11 characters
        assert!(matches!(
            encode_burst("HELLO WÖRLD", LOWER),
            Err(Error::InvalidCharacter)
        ));
        // 12 characters, but 13 bytes
        assert!(matches!(
            encode_burst(UPPER, "GOODBYE NÖW!"),
            Err(Error::InvalidLineLength { len: 13 })
        ));
    }

    #[test]
    fn test_from_lines_matches_encode() {
        let upper = DisplayLine::new("HELLO");
        let lower = DisplayLine::new("WORLD");

        let burst = Burst::from_lines(&upper, &lower);
        assert_eq!(encode_burst("HELLO       ", "WORLD       ").unwrap(), burst);
        assert_eq!("HELLO       ", burst.row_text(Row::Top));
        assert_eq!("WORLD       ", burst.row_text(Row::Bottom));
    }

    #[test]
    fn test_blank() {
        let burst = Burst::blank();
        assert_eq!(" ".repeat(LINE_LEN), burst.row_text(Row::Top));
        assert_eq!(" ".repeat(LINE_LEN), burst.row_text(Row::Bottom));
    }

    #[test]
    fn test_decode() {
        let burst = encode_burst(UPPER, LOWER).unwrap();

        for (frame, text) in burst.frames().zip(burst.text_frames()) {
            assert_eq!(*text, TextFrame::decode(frame.data()).unwrap());
        }
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Err(DecodeError::WrongLength(3)),
            TextFrame::decode(&[0x05, 0x96, 0x81])
        );
        assert_eq!(
            Err(DecodeError::ReservedBits(0x85)),
            TextFrame::decode(&[0x85, 0x96, 0x81, 0, 0, 0, 0, 0])
        );
        assert_eq!(
            Err(DecodeError::WrongMarker(0x42)),
            TextFrame::decode(&[0x05, 0x42, 0x81, 0, 0, 0, 0, 0])
        );
        // both rows
        assert_eq!(
            Err(DecodeError::InvalidRow(0x83)),
            TextFrame::decode(&[0x05, 0x96, 0x83, 0, 0, 0, 0, 0])
        );
        // not marked as changed
        assert_eq!(
            Err(DecodeError::InvalidRow(0x01)),
            TextFrame::decode(&[0x05, 0x96, 0x01, 0, 0, 0, 0, 0])
        );
        assert_eq!(
            Err(DecodeError::InvalidLetters),
            TextFrame::decode(&[0x05, 0x96, 0x81, 0xC3, 0, 0, 0, 0])
        );
    }
}
