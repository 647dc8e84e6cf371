//! Literal redaction
//!
//! Single pass over the SQL text that replaces string and numeric literals
//! with `?`, normalizes existing placeholders, strips comments and
//! collapses whitespace. Two outputs come out of the same pass:
//!
//! - `text`: lowercased canonical form, the fingerprint input
//! - `sql`: same tokens with original casing, used to execute the template

/// Value observed at one placeholder position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// A literal that was inlined in the query text
    Literal(String),
    /// A placeholder already present in the source (`?`, `:name`, `$n`);
    /// its value, if any, lives in the trace bindings
    Bound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redacted {
    pub text: String,
    pub sql: String,
    pub placeholders: Vec<String>,
    pub slots: Vec<Slot>,
}

/// Redact literals from `sql`
pub fn redact(sql: &str) -> Redacted {
    let mut out = Redactor::default();
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        // Comments collapse to whitespace
        if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            out.space();
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            out.space();
            continue;
        }
        if c == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            out.space();
            continue;
        }

        if c.is_whitespace() {
            out.space();
            i += 1;
            continue;
        }

        // String literal with '' and backslash escapes
        if c == '\'' {
            let mut value = String::new();
            i += 1;
            while i < chars.len() {
                match chars[i] {
                    '\\' if i + 1 < chars.len() => {
                        value.push(chars[i + 1]);
                        i += 2;
                    }
                    '\'' if chars.get(i + 1) == Some(&'\'') => {
                        value.push('\'');
                        i += 2;
                    }
                    '\'' => {
                        i += 1;
                        break;
                    }
                    ch => {
                        value.push(ch);
                        i += 1;
                    }
                }
            }
            out.literal(value);
            continue;
        }

        // Quoted identifiers are copied verbatim
        if c == '`' || c == '"' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            i = (i + 1).min(chars.len());
            let ident: String = chars[start..i].iter().collect();
            out.verbatim(&ident);
            continue;
        }

        // Existing placeholders
        if c == '?' {
            out.bound(None);
            i += 1;
            continue;
        }
        if c == ':'
            && next.is_some_and(|n| n.is_ascii_alphabetic() || n == '_')
            && out.last_char() != Some(':')
        {
            let start = i + 1;
            i = start;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            out.bound(Some(name.to_lowercase()));
            continue;
        }
        if c == '$' && next.is_some_and(|n| n.is_ascii_digit()) && !out.after_ident() {
            let start = i + 1;
            i = start;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let n: String = chars[start..i].iter().collect();
            out.bound(Some(format!("arg{}", n)));
            continue;
        }

        // Numeric literal, optionally with a unary minus
        let starts_number = c.is_ascii_digit()
            || (c == '.' && next.is_some_and(|n| n.is_ascii_digit()));
        let negative = c == '-'
            && next.is_some_and(|n| n.is_ascii_digit() || n == '.')
            && out.expects_operand();
        if (starts_number || negative) && !out.after_ident() {
            let start = i;
            if negative {
                i += 1;
            }
            while i < chars.len() {
                let ch = chars[i];
                let exponent_sign = (ch == '+' || ch == '-')
                    && i > start
                    && matches!(chars[i - 1], 'e' | 'E')
                    && !chars[start..i].iter().any(|x| matches!(x, 'x' | 'X'));
                if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            let value: String = chars[start..i].iter().collect();
            out.literal(value);
            continue;
        }

        out.push(c);
        i += 1;
    }

    out.finish()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[derive(Default)]
struct Redactor {
    text: String,
    sql: String,
    placeholders: Vec<String>,
    slots: Vec<Slot>,
    pending_space: bool,
}

impl Redactor {
    fn space(&mut self) {
        if !self.sql.is_empty() {
            self.pending_space = true;
        }
    }

    fn flush_space(&mut self) {
        if self.pending_space {
            self.text.push(' ');
            self.sql.push(' ');
            self.pending_space = false;
        }
    }

    fn push(&mut self, c: char) {
        self.flush_space();
        self.sql.push(c);
        self.text.extend(c.to_lowercase());
    }

    fn verbatim(&mut self, s: &str) {
        self.flush_space();
        self.sql.push_str(s);
        self.text.push_str(s);
    }

    fn placeholder(&mut self, name: Option<String>, slot: Slot) {
        self.flush_space();
        self.sql.push('?');
        self.text.push('?');
        let name = name.unwrap_or_else(|| format!("p{}", self.placeholders.len() + 1));
        self.placeholders.push(name);
        self.slots.push(slot);
    }

    fn literal(&mut self, value: String) {
        self.placeholder(None, Slot::Literal(value));
    }

    fn bound(&mut self, name: Option<String>) {
        self.placeholder(name, Slot::Bound);
    }

    fn last_char(&self) -> Option<char> {
        if self.pending_space {
            return Some(' ');
        }
        self.sql.chars().last()
    }

    /// Directly after an identifier character (so `t1` or `col_2` stay intact)
    fn after_ident(&self) -> bool {
        !self.pending_space && self.sql.chars().last().is_some_and(is_ident_char)
    }

    /// Whether a `-` here is unary: after an operator, open paren or comma
    fn expects_operand(&self) -> bool {
        match self.sql.trim_end().chars().last() {
            None => true,
            Some(c) => matches!(c, '=' | '<' | '>' | '(' | ',' | '+' | '-' | '*' | '/'),
        }
    }

    fn finish(self) -> Redacted {
        Redacted {
            text: self.text.trim_end().to_string(),
            sql: self.sql.trim_end().to_string(),
            placeholders: self.placeholders,
            slots: self.slots,
        }
    }
}
