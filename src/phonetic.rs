//! Phonetic hashing for the fuzzy match strategy.
//!
//! Misspelled toponyms usually keep their sound ("Andora" for "Andorra"),
//! so the name index stores a Soundex-style code per token and the fuzzy
//! strategy probes those codes before the edit-distance check narrows the
//! candidates down.

/// Soundex code length, including the leading letter.
const CODE_LEN: usize = 4;

fn digit(c: char) -> Option<char> {
    match c {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        // a, e, i, o, u, h, w, y and anything non-alphabetic
        _ => None,
    }
}

/// Compute the phonetic code of a single token.
///
/// Non-ASCII letters are kept as-is in the leading position but do not
/// contribute digits; an empty or fully non-alphabetic token yields an
/// empty code.
pub fn encode(token: &str) -> String {
    let lower = token.to_lowercase();
    let mut chars = lower.chars().filter(|c| c.is_alphabetic());

    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut code = String::with_capacity(CODE_LEN);
    code.push(first.to_ascii_uppercase());

    let mut previous = digit(first);
    for c in chars {
        let d = digit(c);
        // 'h' and 'w' do not separate identical codes; vowels do.
        if let Some(d) = d {
            if Some(d) != previous {
                code.push(d);
                if code.len() == CODE_LEN {
                    break;
                }
            }
        }
        if !matches!(c, 'h' | 'w') {
            previous = d;
        }
    }

    while code.len() < CODE_LEN {
        code.push('0');
    }
    code
}

/// Phonetic codes for every token of a name, space-joined for indexing.
pub fn encode_name(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| encode(t))
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
