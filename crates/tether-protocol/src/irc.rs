//! IRC line codec for the chat protocol.
//!
//! A line has the shape
//!
//! ```text
//! [@tag=value;tag2 ][:prefix ]COMMAND[ param ...][ :trailing param]
//! ```
//!
//! Tag values use the IRCv3 escaping rules (`\:` `\s` `\\` `\r` `\n`).
//! Serialization writes no line terminator: over WebSocket every outbound
//! message is its own frame.

use std::fmt;

use crate::{Codec, ProtocolError};

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// An IRC command verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Ping,
    Pong,
    /// Server asks the client to reconnect (maintenance, rebalancing).
    Reconnect,
    Privmsg,
    Notice,
    Join,
    Part,
    Cap,
    Pass,
    Nick,
    /// A three-digit numeric reply such as `001`.
    Numeric(u16),
    /// Any other verb, kept verbatim (upper-cased).
    Other(String),
}

impl Command {
    /// Maps a verb to a command. Never fails: unknown verbs become
    /// [`Command::Other`].
    pub fn parse(verb: &str) -> Self {
        if verb.len() == 3 && verb.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = verb.parse() {
                return Self::Numeric(n);
            }
        }
        match verb.to_ascii_uppercase().as_str() {
            "PING" => Self::Ping,
            "PONG" => Self::Pong,
            "RECONNECT" => Self::Reconnect,
            "PRIVMSG" => Self::Privmsg,
            "NOTICE" => Self::Notice,
            "JOIN" => Self::Join,
            "PART" => Self::Part,
            "CAP" => Self::Cap,
            "PASS" => Self::Pass,
            "NICK" => Self::Nick,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("PING"),
            Self::Pong => f.write_str("PONG"),
            Self::Reconnect => f.write_str("RECONNECT"),
            Self::Privmsg => f.write_str("PRIVMSG"),
            Self::Notice => f.write_str("NOTICE"),
            Self::Join => f.write_str("JOIN"),
            Self::Part => f.write_str("PART"),
            Self::Cap => f.write_str("CAP"),
            Self::Pass => f.write_str("PASS"),
            Self::Nick => f.write_str("NICK"),
            Self::Numeric(n) => write!(f, "{n:03}"),
            Self::Other(verb) => f.write_str(verb),
        }
    }
}

// ---------------------------------------------------------------------------
// IrcMessage
// ---------------------------------------------------------------------------

/// One parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// IRCv3 message tags in wire order, values unescaped.
    pub tags: Vec<(String, String)>,
    /// Source of the message, without the leading `:`.
    pub prefix: Option<String>,
    pub command: Command,
    /// Parameters; the trailing parameter (if any) is the last element.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// A message with no tags, prefix, or parameters.
    pub fn new(command: Command) -> Self {
        Self {
            tags: Vec::new(),
            prefix: None,
            command,
            params: Vec::new(),
        }
    }

    /// Appends a parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// `PRIVMSG <channel> :<text>`
    pub fn privmsg(channel: &str, text: &str) -> Self {
        Self::new(Command::Privmsg).with_param(channel).with_param(text)
    }

    /// `JOIN <channel>`
    pub fn join(channel: &str) -> Self {
        Self::new(Command::Join).with_param(channel)
    }

    /// `PART <channel>`
    pub fn part(channel: &str) -> Self {
        Self::new(Command::Part).with_param(channel)
    }

    /// Looks up a tag value by key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parses one line. A trailing `\r\n` is ignored.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] for empty lines or lines
    /// without a command.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage("empty line".into()));
        }

        let mut tags = Vec::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, after) = stripped.split_once(' ').ok_or_else(|| {
                ProtocolError::InvalidMessage(format!("tags without command: {line}"))
            })?;
            tags = raw_tags
                .split(';')
                .filter(|t| !t.is_empty())
                .map(|t| match t.split_once('=') {
                    Some((k, v)) => (k.to_string(), unescape_tag_value(v)),
                    None => (t.to_string(), String::new()),
                })
                .collect();
            rest = after.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (source, after) = stripped.split_once(' ').ok_or_else(|| {
                ProtocolError::InvalidMessage(format!("prefix without command: {line}"))
            })?;
            prefix = Some(source.to_string());
            rest = after.trim_start_matches(' ');
        }

        let (verb, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if verb.is_empty() {
            return Err(ProtocolError::InvalidMessage(format!(
                "missing command: {line}"
            )));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Self {
            tags,
            prefix,
            command: Command::parse(verb),
            params,
        })
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            f.write_str("@")?;
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                f.write_str(key)?;
                if !value.is_empty() {
                    write!(f, "={}", escape_tag_value(value))?;
                }
            }
            f.write_str(" ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {param}")?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}

fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // A lone trailing backslash is dropped.
            None => {}
        }
    }
    out
}

fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// IrcCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] for IRC lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct IrcCodec;

impl Codec for IrcCodec {
    type Inbound = IrcMessage;
    type Outbound = IrcMessage;

    fn parse(&self, raw: &str) -> Result<IrcMessage, ProtocolError> {
        IrcMessage::parse(raw)
    }

    fn serialize(&self, message: &IrcMessage) -> Result<String, ProtocolError> {
        Ok(message.to_string())
    }
}
