use tracing::warn;
use unicode_normalization::UnicodeNormalization;

/// ESC @ - initialize printer
pub const INIT: [u8; 2] = [0x1B, 0x40];
/// ESC a n - select justification
pub const ALIGN: [u8; 2] = [0x1B, 0x61];
/// ESC E n - emphasized mode on/off
pub const EMPHASIS: [u8; 2] = [0x1B, 0x45];
/// GS V A n - feed n lines and cut
pub const CUT_FEED: [u8; 4] = [0x1D, 0x56, 0x41, 0x03];
pub const LF: u8 = 0x0A;

/// Logical columns of a separator line. Fixed, not derived from paper width.
pub const SEPARATOR_COLUMNS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    fn code(self) -> u8 {
        match self {
            Align::Left => 0,
            Align::Center => 1,
            Align::Right => 2,
        }
    }
}

/// One formatting intent. A ticket is a sequence of these reduced left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Reset,
    Align(Align),
    Emphasis(bool),
    Text(String),
    Newline(usize),
    Separator(char),
    Cut,
}

impl Instruction {
    /// Appends the bytes for this instruction to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Instruction::Reset => {
                buf.clear();
                buf.extend_from_slice(&INIT);
            }
            Instruction::Align(align) => {
                buf.extend_from_slice(&ALIGN);
                buf.push(align.code());
            }
            Instruction::Emphasis(active) => {
                buf.extend_from_slice(&EMPHASIS);
                buf.push(u8::from(*active));
            }
            Instruction::Text(content) => push_text(buf, content),
            Instruction::Newline(count) => buf.extend(std::iter::repeat_n(LF, *count)),
            Instruction::Separator(ch) => {
                push_text(buf, &ch.to_string().repeat(SEPARATOR_COLUMNS));
                buf.push(LF);
            }
            Instruction::Cut => buf.extend_from_slice(&CUT_FEED),
        }
    }
}

/// Decomposes accented characters and drops the combining diacritics
/// (U+0300..=U+036F), leaving the base letters.
///
/// - `content`: text to normalize
///
/// Returns the normalized text
pub fn normalize_text(content: &str) -> String {
    content
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036F}').contains(c))
        .collect()
}

// One byte per char. Code points above 0xFF keep their low byte; the
// printer renders whatever glyph that maps to.
fn push_text(buf: &mut Vec<u8>, content: &str) {
    buf.extend(normalize_text(content).chars().map(|c| (c as u32 & 0xFF) as u8));
}

/// Reduces a sequence of instructions into ESC/POS bytes.
///
/// Later alignment or emphasis instructions only affect text appended after
/// them, exactly as the printer interprets the stream.
pub fn encode_instructions(instructions: &[Instruction]) -> Vec<u8> {
    instructions.iter().fold(Vec::with_capacity(512), |mut buf, ins| {
        ins.encode_into(&mut buf);
        buf
    })
}

/// A complete print job: initialize, content, cut. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTicket {
    bytes: Box<[u8]>,
}

impl EncodedTicket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for EncodedTicket {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// ESC/POS ticket builder.
///
/// Records formatting instructions in call order; `encode` reduces them into
/// the final byte stream. Every ticket must start with `reset`.
///
/// ```ignore
/// let ticket = EscPosEncoder::new()
///     .reset()
///     .align(Align::Center)
///     .emphasis(true)
///     .text("LOJA")
///     .newline(1)
///     .cut()
///     .encode();
/// ```
#[derive(Debug, Clone, Default)]
pub struct EscPosEncoder {
    instructions: Vec<Instruction>,
}

impl EscPosEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything recorded so far and starts from printer initialization.
    pub fn reset(mut self) -> Self {
        self.instructions.clear();
        self.instructions.push(Instruction::Reset);
        self
    }

    pub fn align(self, align: Align) -> Self {
        self.push(Instruction::Align(align))
    }

    /// Bold on/off for subsequently appended text.
    pub fn emphasis(self, active: bool) -> Self {
        self.push(Instruction::Emphasis(active))
    }

    /// Appends text with diacritics stripped.
    pub fn text(self, content: impl Into<String>) -> Self {
        self.push(Instruction::Text(content.into()))
    }

    pub fn newline(self, count: usize) -> Self {
        self.push(Instruction::Newline(count))
    }

    /// 32 repetitions of `ch` followed by a line feed.
    pub fn separator_line(self, ch: char) -> Self {
        self.push(Instruction::Separator(ch))
    }

    pub fn cut(self) -> Self {
        self.push(Instruction::Cut)
    }

    /// Recorded instructions, in call order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Produces the finished ticket.
    ///
    /// A builder that was never reset produces an empty ticket.
    pub fn encode(&self) -> EncodedTicket {
        if self.instructions.first() != Some(&Instruction::Reset) {
            warn!(
                instructions = self.instructions.len(),
                "encode called before reset, producing empty ticket"
            );
            return EncodedTicket {
                bytes: Box::default(),
            };
        }
        EncodedTicket {
            bytes: encode_instructions(&self.instructions).into_boxed_slice(),
        }
    }

    fn push(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_emits_init() {
        let ticket = EscPosEncoder::new().reset().encode();
        assert_eq!(ticket.as_bytes(), &[0x1B, 0x40]);
    }

    #[test]
    fn test_reset_discards_previous_content() {
        let ticket = EscPosEncoder::new()
            .reset()
            .text("abc")
            .reset()
            .text("d")
            .encode();
        assert_eq!(ticket.as_bytes(), &[0x1B, 0x40, b'd']);
    }

    #[test]
    fn test_align_and_emphasis_commands() {
        let ticket = EscPosEncoder::new()
            .reset()
            .align(Align::Left)
            .align(Align::Center)
            .align(Align::Right)
            .emphasis(true)
            .emphasis(false)
            .encode();
        assert_eq!(
            ticket.as_bytes(),
            &[
                0x1B, 0x40, 0x1B, 0x61, 0, 0x1B, 0x61, 1, 0x1B, 0x61, 2, 0x1B, 0x45, 1, 0x1B,
                0x45, 0,
            ]
        );
    }

    #[test]
    fn test_emphasis_applies_in_call_order() {
        let ticket = EscPosEncoder::new()
            .reset()
            .text("a")
            .emphasis(true)
            .text("b")
            .emphasis(false)
            .text("c")
            .encode();
        assert_eq!(
            ticket.as_bytes(),
            &[0x1B, 0x40, b'a', 0x1B, 0x45, 1, b'b', 0x1B, 0x45, 0, b'c']
        );
    }

    #[test]
    fn test_text_strips_accents() {
        assert_eq!(normalize_text("João preferência Ção"), "Joao preferencia Cao");
        let ticket = EscPosEncoder::new().reset().text("é").encode();
        assert_eq!(ticket.as_bytes(), &[0x1B, 0x40, b'e']);
    }

    #[test]
    fn test_unrepresentable_chars_pass_through() {
        // U+20AC keeps its low byte, no error
        let ticket = EscPosEncoder::new().reset().text("€").encode();
        assert_eq!(ticket.as_bytes(), &[0x1B, 0x40, 0xAC]);
    }

    #[test]
    fn test_newline_count() {
        let ticket = EscPosEncoder::new().reset().newline(3).newline(0).encode();
        assert_eq!(ticket.as_bytes(), &[0x1B, 0x40, LF, LF, LF]);
    }

    #[test]
    fn test_separator_is_32_columns() {
        for ch in ['-', '='] {
            let ticket = EscPosEncoder::new().reset().separator_line(ch).encode();
            let body = &ticket.as_bytes()[2..];
            assert_eq!(body.len(), 33);
            assert!(body[..32].iter().all(|&b| b == ch as u8));
            assert_eq!(body[32], LF);
        }
    }

    #[test]
    fn test_cut_with_feed() {
        let ticket = EscPosEncoder::new().reset().cut().encode();
        assert_eq!(ticket.as_bytes(), &[0x1B, 0x40, 0x1D, 0x56, 0x41, 0x03]);
    }

    #[test]
    fn test_encode_without_reset_is_empty() {
        let ticket = EscPosEncoder::new().text("orphan").cut().encode();
        assert!(ticket.is_empty());
    }
}
