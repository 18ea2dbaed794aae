//! SCPI text command tokenizer and mnemonic matching

use cunit_core::Address;

/// A tokenized SCPI command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpiCommand {
    /// `:`-separated header mnemonics as received
    pub headers: Vec<String>,
    /// Header ended with `?`
    pub query: bool,
    /// Comma-separated arguments, trimmed
    pub args: Vec<String>,
}

impl ScpiCommand {
    /// Tokenize a payload. Returns `None` for anything that is not a
    /// well-formed SCPI line, including binary frames.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?.trim();
        if text.is_empty() {
            return None;
        }

        let (header, rest) = match text.find(char::is_whitespace) {
            Some(split) => (&text[..split], text[split..].trim()),
            None => (text, ""),
        };
        let (header, query) = match header.strip_suffix('?') {
            Some(header) => (header, true),
            None => (header, false),
        };
        let header = header.strip_prefix(':').unwrap_or(header);

        let headers: Vec<String> = header.split(':').map(str::to_string).collect();
        if headers.iter().any(|h| !is_mnemonic(h)) {
            return None;
        }

        let args = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(|a| a.trim().to_string()).collect()
        };

        Some(Self {
            headers,
            query,
            args,
        })
    }

    /// Whether the headers match `pattern` mnemonic by mnemonic
    pub fn matches(&self, pattern: &[&str]) -> bool {
        self.headers.len() == pattern.len()
            && self
                .headers
                .iter()
                .zip(pattern)
                .all(|(token, canonical)| mnemonic_matches(canonical, token))
    }

    /// Whether the first header matches the subsystem root `canonical`
    pub fn is_under(&self, canonical: &str) -> bool {
        self.headers
            .first()
            .is_some_and(|root| mnemonic_matches(canonical, root))
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Argument at `index` as a device address
    pub fn address_arg(&self, index: usize) -> Result<Address, String> {
        let arg = self
            .arg(index)
            .ok_or_else(|| "missing device address".to_string())?;
        arg.parse::<Address>()
            .map_err(|_| format!("invalid device address '{}'", arg))
    }
}

/// Short form of a canonical mnemonic: its uppercase letters, digits and `*`
pub fn short_form(canonical: &str) -> String {
    canonical
        .chars()
        .filter(|c| !c.is_ascii_lowercase())
        .collect()
}

/// Case-insensitive match of `token` against the short or long form
pub fn mnemonic_matches(canonical: &str, token: &str) -> bool {
    token.eq_ignore_ascii_case(canonical) || token.eq_ignore_ascii_case(&short_form(canonical))
}

fn is_mnemonic(token: &str) -> bool {
    let body = token.strip_prefix('*').unwrap_or(token);
    !body.is_empty() && body.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a boolean argument (`1`/`0`/`ON`/`OFF`)
pub fn parse_flag(arg: &str) -> Option<bool> {
    match arg.to_ascii_uppercase().as_str() {
        "1" | "ON" | "TRUE" => Some(true),
        "0" | "OFF" | "FALSE" => Some(false),
        _ => None,
    }
}
