use std::cmp::Ordering;

/// Compares two names so that embedded numbers are ordered numerically ("Vol 2" < "Vol 10").
/// Text chunks compare case-insensitively; exact ties fall back to a plain comparison.
#[must_use]
pub fn alphanum(a: &str, b: &str) -> Ordering {
    let mut ca = Chunks(a);
    let mut cb = Chunks(b);
    loop {
        let ord = match (ca.next(), cb.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => cmp_chunk(x, y),
        };
        if ord != Ordering::Equal {
            return ord
        }
    }
}

fn cmp_chunk(x: &str, y: &str) -> Ordering {
    let xd = x.as_bytes()[0].is_ascii_digit();
    let yd = y.as_bytes()[0].is_ascii_digit();
    if xd && yd {
        let xt = x.trim_start_matches('0');
        let yt = y.trim_start_matches('0');
        xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt))
    } else {
        x.chars().flat_map(char::to_lowercase).cmp(y.chars().flat_map(char::to_lowercase))
    }
}

/// Splits a string into runs of ASCII digits and runs of everything else.
struct Chunks<'a>(&'a str);
impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        let s = self.0;
        let first = s.as_bytes().first()?.is_ascii_digit();
        let end = s.bytes().position(|b| b.is_ascii_digit() != first).unwrap_or(s.len());
        let (chunk, rest) = s.split_at(end);
        self.0 = rest;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_compared_numerically() {
        let mut v = vec!["Chapter 10", "Chapter 2", "chapter 1", "Chapter 02b", "Chapter"];
        v.sort_by(|a, b| alphanum(a, b));
        assert_eq!(v, ["Chapter", "chapter 1", "Chapter 2", "Chapter 02b", "Chapter 10"]);
    }

    #[test]
    fn ties_are_total() {
        assert_eq!(alphanum("a01", "a1"), "a01".cmp("a1"));
        assert_eq!(alphanum("x", "x"), Ordering::Equal);
    }
}
