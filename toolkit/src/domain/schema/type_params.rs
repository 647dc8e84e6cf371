//! Column type text parsing
//!
//! Every component that needs the base name or parenthesized parameters of
//! a source type goes through [`parse_type_with_params`].

/// Parsed column type text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSpec {
    /// Upper-cased base name with parameters and modifiers removed,
    /// e.g. `DECIMAL`, `DOUBLE PRECISION`, `TIMESTAMP WITH TIME ZONE`
    pub base: String,
    /// Parenthesized parameters in order, trimmed (`VARCHAR(100)` -> `["100"]`)
    pub params: Vec<String>,
    pub unsigned: bool,
    pub zerofill: bool,
    /// Postgres `T[]` array suffix
    pub array: bool,
}

impl TypeSpec {
    /// First parameter as an integer (length or precision)
    pub fn length(&self) -> Option<u32> {
        self.param(0)
    }

    pub fn precision(&self) -> Option<u32> {
        self.param(0)
    }

    pub fn scale(&self) -> Option<u32> {
        self.param(1)
    }

    pub fn param(&self, index: usize) -> Option<u32> {
        self.params.get(index).and_then(|p| p.parse().ok())
    }

    /// Rule lookup keys, most specific first: `BIGINT UNSIGNED`, then `BIGINT`
    pub fn lookup_keys(&self) -> Vec<String> {
        if self.unsigned {
            vec![format!("{} UNSIGNED", self.base), self.base.clone()]
        } else {
            vec![self.base.clone()]
        }
    }

    /// `BASE(p1,p2)` with modifiers, as shown in messages
    pub fn display(&self) -> String {
        let mut out = self.base.clone();
        if !self.params.is_empty() {
            out.push('(');
            out.push_str(&self.params.join(","));
            out.push(')');
        }
        if self.unsigned {
            out.push_str(" UNSIGNED");
        }
        if self.array {
            out.push_str("[]");
        }
        out
    }
}

/// Split type text into base name, parameters and modifiers.
///
/// Parameters come from the first parenthesized group wherever it appears,
/// so `TIMESTAMP(3) WITH TIME ZONE` yields base `TIMESTAMP WITH TIME ZONE`
/// and params `["3"]`. Quoted parameters (`ENUM('a','b')`) keep their quotes.
pub fn parse_type_with_params(text: &str) -> TypeSpec {
    let mut spec = TypeSpec::default();
    let mut rest = text.trim().to_string();

    while rest.ends_with("[]") {
        spec.array = true;
        rest.truncate(rest.len() - 2);
        rest = rest.trim_end().to_string();
    }

    let mut base = String::with_capacity(rest.len());
    let mut chars = rest.chars();
    let mut seen_group = false;
    while let Some(c) = chars.next() {
        if c == '(' && !seen_group {
            seen_group = true;
            spec.params = split_params(&mut chars);
            base.push(' ');
        } else if c == '(' {
            // Later groups are not parameters of the base type
            skip_group(&mut chars);
            base.push(' ');
        } else {
            base.push(c);
        }
    }

    let mut words = Vec::new();
    for word in base.split_whitespace() {
        match word.to_ascii_uppercase().as_str() {
            "UNSIGNED" => spec.unsigned = true,
            "SIGNED" => {}
            "ZEROFILL" => spec.zerofill = true,
            w => words.push(w.to_string()),
        }
    }
    spec.base = words.join(" ");
    spec
}

fn split_params(chars: &mut std::str::Chars<'_>) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in chars.by_ref() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' if depth == 0 => break,
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    params.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    let last = current.trim();
    if !last.is_empty() || !params.is_empty() {
        params.push(last.to_string());
    }
    params
}

fn skip_group(chars: &mut std::str::Chars<'_>) {
    let mut depth = 0usize;
    for c in chars.by_ref() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return,
            ')' => depth -= 1,
            _ => {}
        }
    }
}
