//! Translation of key names, key combinations and text into X11 keysyms.

use nom::{
    bytes::complete::take_while1, character::complete::char, combinator::all_consuming,
    multi::separated_list1, Finish, IResult,
};

/// How a string handed to `key_press` should be sent.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyInput {
    /// Press every keysym in order, then release them in reverse order.
    Chord(Vec<u32>),
    /// Press and release each keysym in turn.
    Text(Vec<u32>),
}

impl KeyInput {
    /// A single character or a `-` separated combination of key names is a
    /// chord.  Anything else is typed out as text.  A combination made only
    /// of plain characters (`a-b`) is text, not a chord.
    pub fn parse(input: &str) -> KeyInput {
        let mut chars = input.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return KeyInput::Chord(vec![char_keysym(c)]);
        }

        if let Ok((_, parts)) = combo(input).finish() {
            let named = parts.iter().any(|part| named_keysym(part).is_some());
            let keysyms: Option<Vec<u32>> = parts.iter().map(|part| part_keysym(part)).collect();
            if let (true, Some(keysyms)) = (named, keysyms) {
                return KeyInput::Chord(keysyms);
            }
        }

        KeyInput::Text(input.chars().map(char_keysym).collect())
    }
}

fn combo(data: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(separated_list1(char('-'), take_while1(|c| c != '-')))(data)
}

fn part_keysym(part: &str) -> Option<u32> {
    let mut chars = part.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(char_keysym(c)),
        _ => named_keysym(part),
    }
}

/// Latin-1 characters are their own keysym, everything else uses the
/// unicode keysym range.
pub fn char_keysym(c: char) -> u32 {
    match c {
        '\n' | '\r' => 0xff0d,
        '\t' => 0xff09,
        '\u{8}' => 0xff08,
        '\u{1b}' => 0xff1b,
        c if (c as u32) < 0x100 => c as u32,
        c => 0x0100_0000 | c as u32,
    }
}

/// Look up a key by name, ignoring case.
pub fn named_keysym(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    let keysym = match name.as_str() {
        "bsp" | "backspace" => 0xff08,
        "tab" => 0xff09,
        "return" | "enter" => 0xff0d,
        "esc" | "escape" => 0xff1b,
        "ins" | "insert" => 0xff63,
        "del" | "delete" => 0xffff,
        "home" => 0xff50,
        "end" => 0xff57,
        "pgup" | "pageup" => 0xff55,
        "pgdn" | "pagedown" => 0xff56,
        "left" => 0xff51,
        "up" => 0xff52,
        "right" => 0xff53,
        "down" => 0xff54,
        "slash" | "fslash" => 0x002f,
        "bslash" => 0x005c,
        "space" | "spacebar" | "sb" => 0x0020,
        "shift" | "lshift" => 0xffe1,
        "rshift" => 0xffe2,
        "ctrl" | "lctrl" => 0xffe3,
        "rctrl" => 0xffe4,
        "meta" | "lmeta" => 0xffe7,
        "rmeta" => 0xffe8,
        "alt" | "lalt" => 0xffe9,
        "ralt" => 0xffea,
        "super" | "lsuper" | "win" => 0xffeb,
        "rsuper" => 0xffec,
        "hyper" | "lhyper" => 0xffed,
        "rhyper" => 0xffee,
        "menu" => 0xff67,
        "scrlk" => 0xff14,
        "sysrq" => 0xff15,
        "numlk" => 0xff7f,
        "caplk" => 0xffe5,
        "pause" => 0xff13,
        "kpenter" => 0xff8d,
        name => return function_key(name).or_else(|| keypad_digit(name)),
    };
    Some(keysym)
}

// f1 is 0xffbe and the function keys are contiguous up to f35
fn function_key(name: &str) -> Option<u32> {
    let n: u32 = name.strip_prefix('f')?.parse().ok()?;
    (1..=35).contains(&n).then(|| 0xffbe + n - 1)
}

fn keypad_digit(name: &str) -> Option<u32> {
    let n: u32 = name.strip_prefix("kp")?.parse().ok()?;
    (n <= 9).then(|| 0xffb0 + n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_key() {
        assert_eq!(KeyInput::parse("enter"), KeyInput::Chord(vec![0xff0d]));
        assert_eq!(KeyInput::parse("Enter"), KeyInput::Chord(vec![0xff0d]));
        assert_eq!(KeyInput::parse("f12"), KeyInput::Chord(vec![0xffc9]));
        assert_eq!(KeyInput::parse("kp7"), KeyInput::Chord(vec![0xffb7]));
    }

    #[test]
    fn test_single_characters() {
        assert_eq!(KeyInput::parse("a"), KeyInput::Chord(vec![0x61]));
        assert_eq!(KeyInput::parse("-"), KeyInput::Chord(vec![0x2d]));
        assert_eq!(KeyInput::parse("é"), KeyInput::Chord(vec![0xe9]));
    }

    #[test]
    fn test_combination() {
        assert_eq!(
            KeyInput::parse("ctrl-alt-del"),
            KeyInput::Chord(vec![0xffe3, 0xffe9, 0xffff])
        );
        assert_eq!(KeyInput::parse("shift-a"), KeyInput::Chord(vec![0xffe1, 0x61]));
    }

    #[test]
    fn test_text() {
        assert_eq!(
            KeyInput::parse("Hello"),
            KeyInput::Text(vec![0x48, 0x65, 0x6c, 0x6c, 0x6f])
        );
        // plain characters joined by dashes are text
        assert_eq!(KeyInput::parse("a-b"), KeyInput::Text(vec![0x61, 0x2d, 0x62]));
        // a dangling dash can't be a combination
        assert_eq!(KeyInput::parse("ctrl-"), KeyInput::Text("ctrl-".chars().map(char_keysym).collect()));
    }

    #[test]
    fn test_char_keysyms() {
        assert_eq!(char_keysym('\n'), 0xff0d);
        assert_eq!(char_keysym('\t'), 0xff09);
        assert_eq!(char_keysym('€'), 0x0100_20ac);
    }

    #[test]
    fn test_function_key_range() {
        assert_eq!(named_keysym("f1"), Some(0xffbe));
        assert_eq!(named_keysym("f35"), Some(0xffe0));
        assert_eq!(named_keysym("f36"), None);
        assert_eq!(named_keysym("f0"), None);
        assert_eq!(named_keysym("kp10"), None);
    }
}
