//! Character sets for generated passwords

use crate::codec::RecordParams;

/// Built-in character classes, in the order they are concatenated
pub struct CharacterSets {
    pub digits: &'static str,
    pub uppercase: &'static str,
    pub lowercase: &'static str,
}

impl CharacterSets {
    const DIGITS: &'static str = "0123456789";
    const UPPERCASE: &'static str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWERCASE: &'static str = "abcdefghijklmnopqrstuvwxyz";

    pub const fn get() -> &'static CharacterSets {
        &CharacterSets {
            digits: Self::DIGITS,
            uppercase: Self::UPPERCASE,
            lowercase: Self::LOWERCASE,
        }
    }
}

/// The alphabet a password is drawn from.
///
/// `Tokens` lets a "character" be an arbitrary string, e.g. a word list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Charset {
    Chars(Vec<char>),
    Tokens(Vec<String>),
}

impl Charset {
    /// Assemble digits, then uppercase, then lowercase, then the user symbols
    pub fn from_flags(
        numbers: bool,
        uppercase: bool,
        lowercase: bool,
        symbols: Option<&str>,
    ) -> Self {
        let sets = CharacterSets::get();
        let mut pool = String::new();

        if numbers {
            pool.push_str(sets.digits);
        }
        if uppercase {
            pool.push_str(sets.uppercase);
        }
        if lowercase {
            pool.push_str(sets.lowercase);
        }
        if let Some(symbols) = symbols {
            pool.push_str(symbols);
        }

        Charset::Chars(pool.chars().collect())
    }

    /// Charset selected by a parameter record
    pub fn from_params(params: &RecordParams) -> Self {
        Self::from_flags(
            params.numbers_checked,
            params.uppercase_checked,
            params.lowercase_checked,
            params.symbols_checked.then_some(params.symbols.as_str()),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Charset::Chars(chars) => chars.len(),
            Charset::Tokens(tokens) => tokens.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the element at `index` to `out`
    pub(crate) fn push_to(&self, index: usize, out: &mut String) {
        match self {
            Charset::Chars(chars) => {
                if let Some(c) = chars.get(index) {
                    out.push(*c);
                }
            }
            Charset::Tokens(tokens) => {
                if let Some(token) = tokens.get(index) {
                    out.push_str(token);
                }
            }
        }
    }
}

impl From<&str> for Charset {
    fn from(chars: &str) -> Self {
        Charset::Chars(chars.chars().collect())
    }
}

impl From<Vec<String>> for Charset {
    fn from(tokens: Vec<String>) -> Self {
        Charset::Tokens(tokens)
    }
}
