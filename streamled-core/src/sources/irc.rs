//! Chat protocol line parsing (IRC with IRCv3 message tags).
//!
//! ```text
//! [@tag=value;tag2=value2 ][:prefix ]COMMAND[ param...][ :trailing]
//! ```

use std::collections::BTreeMap;

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: BTreeMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    /// Middle params followed by the trailing param, if any.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single line. The line terminator is optional.
    ///
    /// Returns `None` for blank lines or lines without a command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let mut tags = BTreeMap::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw, tail) = stripped.split_once(' ')?;
            for pair in raw.split(';').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                tags.insert(key.to_owned(), unescape_tag(value));
            }
            rest = tail;
        }

        rest = rest.trim_start_matches(' ');
        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, tail) = stripped.split_once(' ')?;
            prefix = Some(p.to_owned());
            rest = tail;
        }

        rest = rest.trim_start_matches(' ');
        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_owned());
                break;
            }
            let (param, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(param.to_owned());
            rest = tail;
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Last parameter, which carries the free text of most commands.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// The `badges` tag as a map, e.g. `subscriber/12,premium/1`.
    pub fn badges(&self) -> BTreeMap<String, String> {
        self.tag("badges")
            .unwrap_or_default()
            .split(',')
            .filter(|b| !b.is_empty())
            .map(|badge| match badge.split_once('/') {
                Some((name, version)) => (name.to_owned(), version.to_owned()),
                None => (badge.to_owned(), String::new()),
            })
            .collect()
    }
}

fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
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
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_privmsg() {
        let line = "@badges=subscriber/12,premium/1;display-name=Cool\\sUser;mod=1 \
                    :cool_user!cool_user@cool_user.tmi.twitch.tv PRIVMSG #racerxdl :hello there\r\n";
        let msg = IrcMessage::parse(line).unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.nick(), Some("cool_user"));
        assert_eq!(msg.param(0), Some("#racerxdl"));
        assert_eq!(msg.trailing(), Some("hello there"));
        assert_eq!(msg.tag("display-name"), Some("Cool User"));
        assert_eq!(msg.tag("mod"), Some("1"));

        let badges = msg.badges();
        assert_eq!(badges.get("subscriber").map(String::as_str), Some("12"));
        assert_eq!(badges.get("premium").map(String::as_str), Some("1"));
    }

    #[test]
    fn parses_numeric_and_ping() {
        let welcome = IrcMessage::parse(":tmi.twitch.tv 001 bot :Welcome, GLHF!").unwrap();
        assert_eq!(welcome.command, "001");
        assert_eq!(welcome.params, vec!["bot", "Welcome, GLHF!"]);

        let ping = IrcMessage::parse("PING :tmi.twitch.tv").unwrap();
        assert_eq!(ping.prefix, None);
        assert_eq!(ping.trailing(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn rejects_blank_lines() {
        assert_eq!(IrcMessage::parse(""), None);
        assert_eq!(IrcMessage::parse("\r\n"), None);
        assert_eq!(IrcMessage::parse(":prefix-only"), None);
    }

    #[test]
    fn tag_unescaping() {
        assert_eq!(unescape_tag("a\\:b\\sc\\\\d"), "a;b c\\d");
    }
}
