use std::mem;

use crate::operand::Operand;

/// Raw SQL fragment whose `$1`, `$2`, ... placeholders reference `args` by
/// 1-based position.
///
/// A backslash directly before a placeholder (`\$1`) keeps it as literal text.
/// Placeholders that point past the end of `args` are left untouched.
///
/// ```
/// use quarry_sql::Expr;
///
/// let expr = Expr::new("price > $1 AND note <> '\\$2'", [10]);
/// assert_eq!(expr.args().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    sql: String,
    args: Vec<Operand>,
}

/// A piece of a parsed [`Expr`].
#[derive(Debug, PartialEq)]
pub(crate) enum Segment<'a> {
    Text(String),
    Arg(&'a Operand),
}

impl Expr {
    /// Creates an expression with positional arguments.
    #[must_use]
    pub fn new<I, V>(sql: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        Self {
            sql: sql.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an expression without arguments.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// The SQL text as written.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The positional arguments.
    #[must_use]
    pub fn args(&self) -> &[Operand] {
        &self.args
    }

    /// Splits the fragment into literal text and argument references.
    pub(crate) fn segments(&self) -> Vec<Segment<'_>> {
        let sql = self.sql.as_str();
        let bytes = sql.as_bytes();
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut cursor = 0;
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'\\' {
                if let Some((_, end)) = placeholder_at(bytes, i + 1) {
                    text.push_str(&sql[cursor..i]);
                    text.push_str(&sql[i + 1..end]);
                    cursor = end;
                    i = end;
                    continue;
                }
            } else if let Some((position, end)) = placeholder_at(bytes, i) {
                let arg = position.checked_sub(1).and_then(|index| self.args.get(index));
                if let Some(arg) = arg {
                    text.push_str(&sql[cursor..i]);
                    if !text.is_empty() {
                        segments.push(Segment::Text(mem::take(&mut text)));
                    }
                    segments.push(Segment::Arg(arg));
                    cursor = end;
                }
                i = end;
                continue;
            }
            i += 1;
        }

        text.push_str(&sql[cursor..]);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        segments
    }
}

/// Matches `$<digits>` at `start`, returning the parsed position and the end
/// offset.
fn placeholder_at(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    if bytes.get(start) != Some(&b'$') {
        return None;
    }
    let digits = bytes[start + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let end = start + 1 + digits;
    let position = std::str::from_utf8(&bytes[start + 1..end]).ok()?.parse().unwrap_or(usize::MAX);
    Some((position, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_reference_args() {
        let expr = Expr::new("a = $1 OR b = $2", [1, 2]);
        let segments = expr.segments();

        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], Segment::Text("a = ".into()));
        assert_eq!(segments[1], Segment::Arg(&expr.args()[0]));
        assert_eq!(segments[2], Segment::Text(" OR b = ".into()));
        assert_eq!(segments[3], Segment::Arg(&expr.args()[1]));
    }

    #[test]
    fn escaped_placeholder_is_literal() {
        let expr = Expr::new(r"price = '\$1' AND qty = $1", [5]);
        let segments = expr.segments();

        assert_eq!(segments[0], Segment::Text("price = '$1' AND qty = ".into()));
        assert_eq!(segments[1], Segment::Arg(&expr.args()[0]));
    }

    #[test]
    fn out_of_range_is_untouched() {
        let expr = Expr::new("x = $3 AND y = $0", [1]);
        assert_eq!(expr.segments(), vec![Segment::Text("x = $3 AND y = $0".into())]);
    }

    #[test]
    fn repeated_reference_binds_each_time() {
        let expr = Expr::new("$1 + $1", ["v"]);
        let args = expr.segments().iter().filter(|s| matches!(s, Segment::Arg(_))).count();
        assert_eq!(args, 2);
    }
}
