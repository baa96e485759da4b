// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Session-socket request framing (spec.md §4.3).
//!
//! Each client request is one ASCII line, space-separated fields, numeric
//! opcode first. The reactor hands this module one drained read buffer per
//! readiness event and gets back zero or more parsed [`Request`]s (a buffer
//! may contain more than one newline-terminated line if the client pipelines
//! writes; spec.md's "one request per readiness event" is a dispatch
//! contract on the *reactor*, not a restriction on how many bytes a single
//! non-blocking read may return).

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login {
        nickname: String,
        password: String,
        udp_port: u16,
    },
    Logout,
    AddFriend {
        friend: String,
    },
    FriendList,
    Score,
    Scoreboard,
    Match {
        friend: String,
    },
}

impl Request {
    pub const fn opcode(&self) -> u8 {
        match self {
            Self::Login { .. } => 0,
            Self::Logout => 1,
            Self::AddFriend { .. } => 2,
            Self::FriendList => 3,
            Self::Score => 4,
            Self::Scoreboard => 5,
            Self::Match { .. } => 6,
        }
    }
}

/// Parse one already-trimmed command line.
pub fn parse_line(line: &str) -> Result<Request, ProtocolError> {
    let mut fields = line.split_whitespace();
    let opcode_str = fields.next().ok_or(ProtocolError::Empty)?;
    let opcode: u8 = opcode_str
        .parse()
        .map_err(|_| ProtocolError::UnknownOpcode(opcode_str.to_string()))?;

    match opcode {
        0 => {
            let nickname = next_arg(&mut fields, 0, 3)?;
            let password = next_arg(&mut fields, 0, 3)?;
            let udp_port_str = next_arg(&mut fields, 0, 3)?;
            let udp_port: u16 = udp_port_str
                .parse()
                .map_err(|_| ProtocolError::MissingArgument { opcode: 0, expected: 3 })?;
            Ok(Request::Login {
                nickname,
                password,
                udp_port,
            })
        }
        1 => Ok(Request::Logout),
        2 => Ok(Request::AddFriend {
            friend: next_arg(&mut fields, 2, 1)?,
        }),
        3 => Ok(Request::FriendList),
        4 => Ok(Request::Score),
        5 => Ok(Request::Scoreboard),
        6 => Ok(Request::Match {
            friend: next_arg(&mut fields, 6, 1)?,
        }),
        _ => Err(ProtocolError::UnknownOpcode(opcode_str.to_string())),
    }
}

/// Split a drained read buffer into complete newline-terminated lines,
/// returning the parsed requests and the unconsumed tail (a partial line
/// left for the next readiness event, per spec.md §4.4's read-until-EOF
/// contract).
pub fn split_lines(buffer: &[u8]) -> (Vec<String>, Vec<u8>) {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in buffer.iter().enumerate() {
        if *b == b'\n' {
            let line = String::from_utf8_lossy(&buffer[start..i]).trim_end_matches('\r').to_string();
            lines.push(line);
            start = i + 1;
        }
    }
    (lines, buffer[start..].to_vec())
}

fn next_arg<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    opcode: u8,
    expected: usize,
) -> Result<String, ProtocolError> {
    fields
        .next()
        .map(|s| s.to_string())
        .ok_or(ProtocolError::MissingArgument { opcode, expected })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login() {
        let req = parse_line("0 alice secretpw 7001").unwrap();
        assert_eq!(
            req,
            Request::Login {
                nickname: "alice".into(),
                password: "secretpw".into(),
                udp_port: 7001,
            }
        );
    }

    #[test]
    fn parses_no_arg_opcodes() {
        assert_eq!(parse_line("1").unwrap(), Request::Logout);
        assert_eq!(parse_line("3").unwrap(), Request::FriendList);
        assert_eq!(parse_line("4").unwrap(), Request::Score);
        assert_eq!(parse_line("5").unwrap(), Request::Scoreboard);
    }

    #[test]
    fn parses_add_friend_and_match() {
        assert_eq!(
            parse_line("2 bob").unwrap(),
            Request::AddFriend { friend: "bob".into() }
        );
        assert_eq!(
            parse_line("6 bob").unwrap(),
            Request::Match { friend: "bob".into() }
        );
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(matches!(
            parse_line("99"),
            Err(ProtocolError::UnknownOpcode(_))
        ));
    }

    #[test]
    fn rejects_missing_arguments() {
        assert!(matches!(
            parse_line("2"),
            Err(ProtocolError::MissingArgument { opcode: 2, expected: 1 })
        ));
        assert!(matches!(parse_line(""), Err(ProtocolError::Empty)));
    }

    #[test]
    fn splits_multiple_lines_and_keeps_partial_tail() {
        let (lines, tail) = split_lines(b"4\r\n5\r\n2 bo");
        assert_eq!(lines, vec!["4".to_string(), "5".to_string()]);
        assert_eq!(tail, b"2 bo");
    }
}
