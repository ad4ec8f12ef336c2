// sidcan/src/text.rs
//
// Fixed-width text rows for the 'sidcan' SID display driver.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! A single row of display text.

use std::fmt;

/// The number of characters in a row of the display.
pub const LINE_LEN: usize = 12;

/// Stand-in for characters the display can't show.
const REPLACEMENT: u8 = b'?';

/// One row of display text: exactly [`LINE_LEN`] printable ASCII characters.
///
/// Any string can be turned into a line. Shorter text is padded with
/// spaces on the right, longer text is cut off after the twelfth
/// character, and characters outside of printable ASCII are shown as `?`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayLine([u8; LINE_LEN]);

impl DisplayLine {
    /// A line of all spaces.
    pub const BLANK: DisplayLine = DisplayLine([b' '; LINE_LEN]);

    /// Creates a line from arbitrary text.
    pub fn new(text: &str) -> Self {
        let mut line = Self::BLANK;
        for (dst, c) in line.0.iter_mut().zip(text.chars()) {
            *dst = match c {
                ' '..='~' => c as u8,
                _ => REPLACEMENT,
            };
        }
        line
    }

    /// Gets the characters of the line.
    pub fn as_bytes(&self) -> &[u8; LINE_LEN] {
        &self.0
    }

    /// Gets the line as a string slice.
    pub fn as_str(&self) -> &str {
        // Only printable ASCII ever gets in.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Determines if the line is all spaces.
    pub fn is_blank(&self) -> bool {
        *self == Self::BLANK
    }
}

impl Default for DisplayLine {
    fn default() -> Self {
        Self::BLANK
    }
}

impl From<&str> for DisplayLine {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl AsRef<str> for DisplayLine {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DisplayLine({:?})", self.as_str())
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_length_becomes_a_full_line() {
        let text = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123";

        for n in 0..=text.len() {
            let line = DisplayLine::new(&text[..n]);
            let s = line.as_str();

            assert_eq!(LINE_LEN, s.len());
            if n <= LINE_LEN {
                assert_eq!(&text[..n], &s[..n]);
                assert!(s[n..].chars().all(|c| c == ' '));
            } else {
                assert_eq!(&text[..LINE_LEN], s);
            }
        }
    }

    #[test]
    fn test_padding() {
        assert_eq!("HELLO       ", DisplayLine::new("HELLO").as_str());
        assert_eq!("            ", DisplayLine::new("").as_str());
        assert!(DisplayLine::new("").is_blank());
        assert!(!DisplayLine::new("X").is_blank());
    }

    #[test]
    fn test_truncation() {
        let line = DisplayLine::new("Temperature outside: 21C");
        assert_eq!("Temperature ", line.as_str());
    }

    #[test]
    fn test_unprintable_replaced() {
        let line = DisplayLine::new("Grüße\tA");
        assert_eq!("Gr??e?A     ", line.as_str());
    }

    #[test]
    fn test_default_is_blank() {
        assert_eq!(DisplayLine::BLANK, DisplayLine::default());
        assert_eq!("DisplayLine(\"AB          \")", format!("{:?}", DisplayLine::from("AB")));
    }
}
