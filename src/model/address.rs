//! Email address parsing (RFC 5322 §3.4).
//!
//! Parsing is strict: a value that is not a valid mailbox or address list is
//! an error, never a best-effort guess. Comments and folding whitespace are
//! skipped, obsolete empty list elements are tolerated, and group syntax is
//! flattened into its member mailboxes.

use thiserror::Error;

use crate::parser::header::decode_sentence;

/// A parsed email address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `name = Some("Juan García")`, `mailbox = "juan@ejemplo.com"`
/// - `"user@example.com"` → `name = None`, `mailbox = "user@example.com"`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Address {
    /// Display name with RFC 2047 encoded-words decoded.
    pub name: Option<String>,
    /// The bare mailbox (`local-part@domain`).
    pub mailbox: String,
}

/// Why an address header could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} at offset {offset}")]
pub struct AddressParseError {
    /// Byte offset in the raw value where parsing gave up.
    pub offset: usize,
    pub reason: &'static str,
}

type ParseResult<T> = std::result::Result<T, AddressParseError>;

impl Address {
    /// Parse exactly one mailbox from a header value.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    pub fn parse(raw: &str) -> ParseResult<Self> {
        let mut p = Cursor::new(raw);
        let mut found = p.parse_address(true)?;
        p.skip_cfws()?;
        if !p.at_end() || found.len() != 1 {
            return Err(p.fail("expected single address"));
        }
        Ok(found.remove(0))
    }

    /// Parse a comma-separated list of addresses.
    ///
    /// Handles quoted commas (`"Last, First" <a@b.com>, other@c.com`) and
    /// groups (`team: a@b.com, c@d.com;`).
    pub fn parse_list(raw: &str) -> ParseResult<Vec<Self>> {
        let mut p = Cursor::new(raw);
        let mut results = Vec::new();

        loop {
            p.skip_cfws()?;
            if p.at_end() {
                break;
            }
            if p.eat(',') {
                continue;
            }
            results.extend(p.parse_address(true)?);
            p.skip_cfws()?;
            if p.at_end() {
                break;
            }
            if !p.eat(',') {
                return Err(p.fail("expected ',' between addresses"));
            }
        }

        Ok(results)
    }

    /// Format for display: `"Display Name <mailbox>"` or just `"mailbox"`.
    pub fn display(&self) -> String {
        match self.name.as_deref() {
            None | Some("") => self.mailbox.clone(),
            Some(name) if name.contains(|c: char| SPECIALS.contains(c)) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\" <{}>", self.mailbox)
            }
            Some(name) => format!("{name} <{}>", self.mailbox),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

const SPECIALS: &str = "()<>[]:;@\\,.\"";

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(c) || !c.is_ascii()
}

/// Byte cursor over a header value.
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn fail(&self, reason: &'static str) -> AddressParseError {
        AddressParseError {
            offset: self.pos,
            reason,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// Skip folding whitespace and (nested) comments.
    fn skip_cfws(&mut self) -> ParseResult<()> {
        loop {
            while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
                self.pos += 1;
            }
            if self.peek() != Some('(') {
                return Ok(());
            }
            let mut depth = 0usize;
            loop {
                match self.bump() {
                    Some('(') => depth += 1,
                    Some(')') => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    Some('\\') => {
                        self.bump();
                    }
                    Some(_) => {}
                    None => return Err(self.fail("unterminated comment")),
                }
            }
        }
    }

    fn atom(&mut self) -> ParseResult<Option<&'a str>> {
        self.skip_cfws()?;
        let start = self.pos;
        while self.peek().is_some_and(is_atext) {
            self.bump();
        }
        let atom = &self.input[start..self.pos];
        self.skip_cfws()?;
        Ok((!atom.is_empty()).then_some(atom))
    }

    fn quoted_string(&mut self) -> ParseResult<String> {
        self.skip_cfws()?;
        if !self.eat('"') {
            return Err(self.fail("expected quoted string"));
        }
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.fail("unterminated quoted string")),
                },
                Some(c) => out.push(c),
                None => return Err(self.fail("unterminated quoted string")),
            }
        }
        self.skip_cfws()?;
        Ok(out)
    }

    fn word(&mut self) -> ParseResult<Option<String>> {
        self.skip_cfws()?;
        if self.peek() == Some('"') {
            return self.quoted_string().map(Some);
        }
        Ok(self.atom()?.map(str::to_string))
    }

    /// `dot-atom / quoted-string`, as used for the local part.
    fn local_part(&mut self) -> ParseResult<String> {
        self.skip_cfws()?;
        if self.peek() == Some('"') {
            return self.quoted_string();
        }
        self.dot_atom("expected local part")
    }

    fn dot_atom(&mut self, reason: &'static str) -> ParseResult<String> {
        let mut out = match self.atom()? {
            Some(atom) => atom.to_string(),
            None => return Err(self.fail(reason)),
        };
        while self.eat('.') {
            match self.atom()? {
                Some(atom) => {
                    out.push('.');
                    out.push_str(atom);
                }
                None => return Err(self.fail("empty label after '.'")),
            }
        }
        Ok(out)
    }

    fn domain(&mut self) -> ParseResult<String> {
        self.skip_cfws()?;
        if self.eat('[') {
            let start = self.pos;
            loop {
                match self.bump() {
                    Some(']') => break,
                    Some('[' | '\\') | None => return Err(self.fail("malformed domain literal")),
                    Some(_) => {}
                }
            }
            let literal = format!("[{}", &self.input[start..self.pos]);
            self.skip_cfws()?;
            return Ok(literal);
        }
        self.dot_atom("expected domain")
    }

    fn addr_spec(&mut self) -> ParseResult<String> {
        let local = self.local_part()?;
        self.skip_cfws()?;
        if !self.eat('@') {
            return Err(self.fail("missing '@' in address"));
        }
        let domain = self.domain()?;
        Ok(format!("{local}@{domain}"))
    }

    fn angle_addr(&mut self) -> ParseResult<String> {
        self.skip_cfws()?;
        if !self.eat('<') {
            return Err(self.fail("expected '<'"));
        }
        let spec = self.addr_spec()?;
        self.skip_cfws()?;
        if !self.eat('>') {
            return Err(self.fail("expected '>'"));
        }
        Ok(spec)
    }

    /// `word *("." / word)`, the obsolete phrase form real mailers emit.
    fn phrase(&mut self) -> ParseResult<String> {
        let mut words: Vec<String> = Vec::new();
        loop {
            if !words.is_empty() && self.eat('.') {
                if let Some(last) = words.last_mut() {
                    last.push('.');
                }
                continue;
            }
            match self.word()? {
                Some(word) => words.push(word),
                None => break,
            }
        }
        if words.is_empty() {
            return Err(self.fail("expected display name"));
        }
        Ok(decode_sentence(&words.join(" ")))
    }

    /// One `address` production; a group yields its members.
    fn parse_address(&mut self, allow_group: bool) -> ParseResult<Vec<Address>> {
        self.skip_cfws()?;
        let start = self.pos;

        if let Ok(mailbox) = self.addr_spec() {
            return Ok(vec![Address {
                name: None,
                mailbox,
            }]);
        }
        self.pos = start;

        let name = if self.peek() == Some('<') {
            None
        } else {
            Some(self.phrase()?)
        };

        self.skip_cfws()?;
        if allow_group && self.eat(':') {
            let mut members = Vec::new();
            loop {
                self.skip_cfws()?;
                if self.eat(';') {
                    break;
                }
                if self.eat(',') {
                    continue;
                }
                if self.at_end() {
                    return Err(self.fail("unterminated group"));
                }
                members.extend(self.parse_address(false)?);
                self.skip_cfws()?;
                if !matches!(self.peek(), Some(',' | ';')) {
                    return Err(self.fail("expected ',' or ';' in group"));
                }
            }
            return Ok(members);
        }

        let mailbox = self.angle_addr()?;
        Ok(vec![Address {
            name: name.filter(|n| !n.is_empty()),
            mailbox,
        }])
    }
}
