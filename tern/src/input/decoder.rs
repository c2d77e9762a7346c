//! Raw terminal bytes to key events.
//!
//! The decoder is fed whatever chunk the terminal delivered and returns the
//! keys it could complete. An escape sequence cut off at the end of a chunk
//! stays pending until the next chunk arrives or [`KeyDecoder::flush`] is
//! called after [`ESCAPE_TIMEOUT`].

use std::time::Duration;

pub const ESCAPE_TIMEOUT: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyName {
    /// A run of printable characters; the characters are in `sequence`.
    Text,
    /// A key pressed together with a modifier, e.g. `ctrl` + `a`.
    Char(char),
    Return,
    Enter,
    Tab,
    Backspace,
    Delete,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Insert,
    PageUp,
    PageDown,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub name: KeyName,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    /// The raw text of the key, or the literal text to insert for [`KeyName::Text`].
    pub sequence: String,
}

impl KeyEvent {
    pub fn new(name: KeyName, sequence: impl Into<String>) -> Self {
        Self {
            name,
            ctrl: false,
            meta: false,
            shift: false,
            sequence: sequence.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(KeyName::Text, text)
    }

    pub fn ctrl(ch: char) -> Self {
        let code = (ch.to_ascii_lowercase() as u8) & 0x1f;
        Self {
            ctrl: true,
            ..Self::new(KeyName::Char(ch.to_ascii_lowercase()), (code as char).to_string())
        }
    }

    pub fn meta(ch: char) -> Self {
        Self {
            meta: true,
            shift: ch.is_ascii_uppercase(),
            ..Self::new(KeyName::Char(ch), format!("\x1b{ch}"))
        }
    }

    fn with_modifiers(mut self, modifier: u32) -> Self {
        // xterm encodes modifiers as 1 + bitmask
        let bits = modifier.saturating_sub(1);
        self.shift = bits & 1 != 0;
        self.meta = bits & 2 != 0;
        self.ctrl = bits & 4 != 0;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    Csi(String),
    Ss3,
}

#[derive(Debug)]
pub struct KeyDecoder {
    state: State,
    partial_utf8: Vec<u8>,
    text: String,
    last_was_cr: bool,
}

impl Default for KeyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            partial_utf8: Vec::new(),
            text: String::new(),
            last_was_cr: false,
        }
    }

    /// Whether a partial escape sequence is waiting for more bytes.
    pub fn is_pending(&self) -> bool {
        self.state != State::Ground
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<KeyEvent> {
        let mut out = Vec::new();
        for ch in self.decode_utf8(bytes) {
            self.step(ch, &mut out);
        }
        self.flush_text(&mut out);
        out
    }

    /// Give up on a pending escape sequence and emit what was collected so far.
    pub fn flush(&mut self) -> Vec<KeyEvent> {
        let mut out = Vec::new();
        match std::mem::replace(&mut self.state, State::Ground) {
            State::Ground => {}
            State::Escape => out.push(KeyEvent::new(KeyName::Escape, "\x1b")),
            State::Csi(params) => out.push(KeyEvent::text(format!("[{params}"))),
            State::Ss3 => out.push(KeyEvent::text("O")),
        }
        out
    }

    fn decode_utf8(&mut self, bytes: &[u8]) -> Vec<char> {
        self.partial_utf8.extend_from_slice(bytes);
        let mut chars = Vec::with_capacity(self.partial_utf8.len());
        let mut rest: &[u8] = &self.partial_utf8;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    chars.extend(valid.chars());
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        chars.extend(valid.chars());
                    }
                    match err.error_len() {
                        Some(len) => {
                            chars.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.partial_utf8 = rest.to_vec();
        chars
    }

    fn flush_text(&mut self, out: &mut Vec<KeyEvent>) {
        if !self.text.is_empty() {
            out.push(KeyEvent::text(std::mem::take(&mut self.text)));
        }
    }

    fn step(&mut self, ch: char, out: &mut Vec<KeyEvent>) {
        let swallow_lf = std::mem::take(&mut self.last_was_cr) && ch == '\n';
        match std::mem::replace(&mut self.state, State::Ground) {
            State::Ground => {
                if ch == '\x1b' {
                    self.flush_text(out);
                    self.state = State::Escape;
                } else if let Some(key) = control_key(ch) {
                    self.flush_text(out);
                    if swallow_lf {
                        return;
                    }
                    self.last_was_cr = key.name == KeyName::Return;
                    out.push(key);
                } else {
                    self.text.push(ch);
                }
            }
            State::Escape => match ch {
                '[' => self.state = State::Csi(String::new()),
                'O' => self.state = State::Ss3,
                '\x1b' => {
                    out.push(KeyEvent::new(KeyName::Escape, "\x1b"));
                    self.state = State::Escape;
                }
                _ => {
                    let mut key = control_key(ch).unwrap_or_else(|| KeyEvent::meta(ch));
                    key.meta = true;
                    key.sequence = format!("\x1b{ch}");
                    out.push(key);
                }
            },
            State::Csi(mut params) => {
                if ch.is_ascii_digit() || ch == ';' {
                    params.push(ch);
                    self.state = State::Csi(params);
                } else {
                    out.push(decode_csi(&params, ch));
                }
            }
            State::Ss3 => out.push(decode_final(ch, 1, format!("\x1bO{ch}"))),
        }
    }
}

fn control_key(ch: char) -> Option<KeyEvent> {
    let s = ch.to_string();
    let key = match ch {
        '\r' => KeyEvent::new(KeyName::Return, s),
        '\n' => KeyEvent::new(KeyName::Enter, s),
        '\t' => KeyEvent::new(KeyName::Tab, s),
        '\x08' | '\x7f' => KeyEvent::new(KeyName::Backspace, s),
        '\x01'..='\x1a' => KeyEvent::ctrl((b'a' + (ch as u8) - 1) as char),
        '\0' | '\x1c'..='\x1f' => KeyEvent::new(KeyName::Unknown, s),
        _ => return None,
    };
    Some(key)
}

fn decode_csi(params: &str, final_char: char) -> KeyEvent {
    let sequence = format!("\x1b[{params}{final_char}");
    let mut fields = params.split(';').map(|p| p.parse::<u32>().unwrap_or(1));
    let first = fields.next().unwrap_or(1);
    let modifier = fields.next().unwrap_or(1);
    if final_char == '~' {
        let name = match first {
            1 | 7 => KeyName::Home,
            4 | 8 => KeyName::End,
            2 => KeyName::Insert,
            3 => KeyName::Delete,
            5 => KeyName::PageUp,
            6 => KeyName::PageDown,
            _ => KeyName::Unknown,
        };
        return KeyEvent::new(name, sequence).with_modifiers(modifier);
    }
    decode_final(final_char, modifier, sequence)
}

fn decode_final(final_char: char, modifier: u32, sequence: String) -> KeyEvent {
    let name = match final_char {
        'A' => KeyName::Up,
        'B' => KeyName::Down,
        'C' => KeyName::Right,
        'D' => KeyName::Left,
        'H' => KeyName::Home,
        'F' => KeyName::End,
        _ => KeyName::Unknown,
    };
    KeyEvent::new(name, sequence).with_modifiers(modifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(keys: &[KeyEvent]) -> Vec<KeyName> {
        keys.iter().map(|k| k.name).collect()
    }

    #[test]
    fn test_printable_run_coalesces() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"1 + 1");
        assert_eq!(keys, vec![KeyEvent::text("1 + 1")]);
    }

    #[test]
    fn test_control_bytes() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"\x01\x03\t\r\x7f\x08");
        assert_eq!(
            names(&keys),
            vec![
                KeyName::Char('a'),
                KeyName::Char('c'),
                KeyName::Tab,
                KeyName::Return,
                KeyName::Backspace,
                KeyName::Backspace,
            ]
        );
        assert!(keys[0].ctrl && keys[1].ctrl);
        assert_eq!(keys[1].sequence, "\x03");
    }

    #[test]
    fn test_embedded_newlines_split_text() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"a = 1\nb");
        assert_eq!(
            keys,
            vec![
                KeyEvent::text("a = 1"),
                KeyEvent::new(KeyName::Enter, "\n"),
                KeyEvent::text("b"),
            ]
        );
    }

    #[test]
    fn test_crlf_is_one_submit() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"x\r\ny");
        assert_eq!(names(&keys), vec![KeyName::Text, KeyName::Return, KeyName::Text]);
    }

    #[test]
    fn test_arrow_keys() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"\x1b[A\x1b[B\x1bOC\x1b[D\x1b[H\x1b[F");
        assert_eq!(
            names(&keys),
            vec![
                KeyName::Up,
                KeyName::Down,
                KeyName::Right,
                KeyName::Left,
                KeyName::Home,
                KeyName::End,
            ]
        );
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_tilde_sequences() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"\x1b[3~\x1b[1~\x1b[4~\x1b[5~\x1b[2~");
        assert_eq!(
            names(&keys),
            vec![
                KeyName::Delete,
                KeyName::Home,
                KeyName::End,
                KeyName::PageUp,
                KeyName::Insert,
            ]
        );
    }

    #[test]
    fn test_modified_arrows() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"\x1b[1;5D\x1b[1;3C");
        assert_eq!(keys[0].name, KeyName::Left);
        assert!(keys[0].ctrl && !keys[0].meta);
        assert_eq!(keys[1].name, KeyName::Right);
        assert!(keys[1].meta && !keys[1].ctrl);
    }

    #[test]
    fn test_meta_keys() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"\x1bb\x1b]");
        assert_eq!(keys[0].name, KeyName::Char('b'));
        assert!(keys[0].meta);
        assert_eq!(keys[1].name, KeyName::Char(']'));
        assert!(keys[1].meta);
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let mut decoder = KeyDecoder::new();
        assert!(decoder.feed(b"\x1b").is_empty());
        assert!(decoder.is_pending());
        assert!(decoder.feed(b"[").is_empty());
        let keys = decoder.feed(b"A");
        assert_eq!(names(&keys), vec![KeyName::Up]);
    }

    #[test]
    fn test_lone_escape_flushes() {
        let mut decoder = KeyDecoder::new();
        assert!(decoder.feed(b"abc\x1b").len() == 1);
        let keys = decoder.flush();
        assert_eq!(names(&keys), vec![KeyName::Escape]);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_unfinished_csi_flushes_as_text() {
        let mut decoder = KeyDecoder::new();
        decoder.feed(b"\x1b[12");
        assert_eq!(decoder.flush(), vec![KeyEvent::text("[12")]);
    }

    #[test]
    fn test_double_escape() {
        let mut decoder = KeyDecoder::new();
        let keys = decoder.feed(b"\x1b\x1b[A");
        assert_eq!(names(&keys), vec![KeyName::Escape, KeyName::Up]);
    }

    #[test]
    fn test_utf8_across_chunks() {
        let mut decoder = KeyDecoder::new();
        let bytes = "あ".as_bytes();
        assert!(decoder.feed(&bytes[..1]).is_empty());
        assert_eq!(decoder.feed(&bytes[1..]), vec![KeyEvent::text("あ")]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut decoder = KeyDecoder::new();
        assert_eq!(decoder.feed(b"a\xffb"), vec![KeyEvent::text("a\u{fffd}b")]);
    }
}
