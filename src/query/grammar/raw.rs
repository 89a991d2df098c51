//! Quote-aware scanning of compiled SQL
//!
//! Both raw SQL rendering and the PostgreSQL placeholder rewrite need to find
//! the `?` placeholders that sit outside string literals. The scanner copies
//! the escape pairs `\'`, `''` and `??` through untouched, toggles literal
//! state on a lone `'`, and reports every other `?` found outside a literal.

/// A token produced while walking SQL text
enum Token<'a> {
    Text(&'a str),
    EscapedPair(&'a str),
    Placeholder,
}

fn scan(sql: &str, mut emit: impl FnMut(Token<'_>)) {
    let mut in_literal = false;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|(_, n)| *n);
        let pair = matches!((c, next), ('\\', Some('\'')) | ('\'', Some('\'')) | ('?', Some('?')));

        if pair {
            chars.next();
            emit(Token::EscapedPair(&sql[i..i + 2]));
        } else if c == '\'' {
            in_literal = !in_literal;
            emit(Token::Text(&sql[i..i + 1]));
        } else if c == '?' && !in_literal {
            emit(Token::Placeholder);
        } else {
            emit(Token::Text(&sql[i..i + c.len_utf8()]));
        }
    }
}

/// Replace placeholders left to right with pre-rendered literals
///
/// Placeholders beyond the end of `literals` are left as `?`.
pub fn substitute(sql: &str, literals: impl IntoIterator<Item = String>) -> String {
    let mut literals = literals.into_iter();
    let mut out = String::with_capacity(sql.len());

    scan(sql, |token| match token {
        Token::Text(text) | Token::EscapedPair(text) => out.push_str(text),
        Token::Placeholder => match literals.next() {
            Some(literal) => out.push_str(&literal),
            None => out.push('?'),
        },
    });

    out
}

/// Rewrite `?` placeholders to numbered `$n` parameters
///
/// A doubled `??` outside a literal stands for the single `?` operator.
pub fn number_placeholders(sql: &str) -> String {
    let mut position = 0;
    let mut out = String::with_capacity(sql.len() + 8);

    scan(sql, |token| match token {
        Token::Text(text) => out.push_str(text),
        Token::EscapedPair("??") => out.push('?'),
        Token::EscapedPair(text) => out.push_str(text),
        Token::Placeholder => {
            position += 1;
            out.push('$');
            out.push_str(&position.to_string());
        }
    });

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lits(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_substitute_leaves_unmatched_placeholders() {
        let sql = "select * from \"users\" where \"email\" = ? and \"buffer\" = ? and \"not\" = ?";
        assert_eq!(
            substitute(sql, lits(&["'foo'", "x'74657874'"])),
            "select * from \"users\" where \"email\" = 'foo' and \"buffer\" = x'74657874' and \"not\" = ?"
        );
    }

    #[test]
    fn test_substitute_skips_literals() {
        let sql = "select '?' as q, 'it''s ?' as r, \"a\" = ?";
        assert_eq!(
            substitute(sql, lits(&["1"])),
            "select '?' as q, 'it''s ?' as r, \"a\" = 1"
        );

        let sql = "select 'don\\'t ?' , ?";
        assert_eq!(substitute(sql, lits(&["2"])), "select 'don\\'t ?' , 2");
    }

    #[test]
    fn test_substitute_keeps_escaped_operator() {
        let sql = "select * from \"t\" where \"tags\"::jsonb ?? 'a' and \"id\" = ?";
        assert_eq!(
            substitute(sql, lits(&["5"])),
            "select * from \"t\" where \"tags\"::jsonb ?? 'a' and \"id\" = 5"
        );
    }

    #[test]
    fn test_number_placeholders() {
        assert_eq!(
            number_placeholders("select * from \"t\" where \"a\" = ? and \"b\" in (?, ?)"),
            "select * from \"t\" where \"a\" = $1 and \"b\" in ($2, $3)"
        );
        assert_eq!(
            number_placeholders("select coalesce((\"o\")::jsonb ?? 'k', false) from \"t\" where 'x?' = ?"),
            "select coalesce((\"o\")::jsonb ? 'k', false) from \"t\" where 'x?' = $1"
        );
    }

    #[test]
    fn test_multibyte_text_survives() {
        assert_eq!(substitute("select 'é' , ?", lits(&["'ü'"])), "select 'é' , 'ü'");
    }
}
