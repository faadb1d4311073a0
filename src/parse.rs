/**
 * Copyright (c) 2024-2025 ArcX, Inc.
 *
 * This file is part of ArcX Gateway
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use crate::error::{CoordinatorError, Result};

// tokenise and validate the whitespace-separated proxy list text.
// returns the candidate set in first-encountered order; does not touch
// any live registry state.
pub fn parse_proxy_list(text: &str) -> Result<Vec<(u32, u16)>> {
    let mut out = Vec::new();
    for token in text.split_ascii_whitespace() {
        out.push(parse_token(token)?);
    }
    Ok(out)
}

fn parse_token(token: &str) -> Result<(u32, u16)> {
    let mut dots = 0usize;
    let mut colons = 0usize;
    let mut digits = 0usize;
    let mut bad = 0usize;
    let mut colon_at = None;

    for (idx, c) in token.char_indices() {
        match c {
            '.' => dots += 1,
            ':' => {
                colons += 1;
                colon_at = Some(idx);
            }
            c if c.is_ascii_digit() => digits += 1,
            _ => bad += 1,
        }
    }

    // later checks take precedence over earlier ones, matching the
    // original scan's sequential-overwrite behavior.
    let mut reason = None;
    if digits < 4 {
        reason = Some("not enough digits for an ip");
    }
    if colons > 1 {
        reason = Some("too many colons");
    }
    if dots != 3 {
        reason = Some("need 3 dots for an ip address");
    }
    if bad > 0 {
        reason = Some("illegal character");
    }
    if let Some(reason) = reason {
        return Err(CoordinatorError::ConfigParse {
            token: token.to_string(),
            reason,
        });
    }

    let ip_str = match colon_at {
        Some(at) => &token[..at],
        None => token,
    };
    let ip = parse_ipv4(ip_str);
    if ip == 0 || ip == u32::MAX {
        return Err(CoordinatorError::ConfigParse {
            token: token.to_string(),
            reason: "ip is zero or broadcast",
        });
    }

    let port: u32 = match colon_at {
        Some(at) => token[at + 1..].parse().unwrap_or(u32::MAX),
        None => 80,
    };
    if port > 65535 {
        return Err(CoordinatorError::ConfigParse {
            token: token.to_string(),
            reason: "bad port",
        });
    }

    Ok((ip, port as u16))
}

fn parse_ipv4(s: &str) -> u32 {
    let mut octets = [0u32; 4];
    for (i, part) in s.split('.').enumerate() {
        if i >= 4 {
            return 0;
        }
        octets[i] = part.parse().unwrap_or(0);
    }
    (octets[0] << 24) | (octets[1] << 16) | (octets[2] << 8) | octets[3]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_port() {
        let parsed = parse_proxy_list("1.2.3.4 5.6.7.8:8080").unwrap();
        assert_eq!(parsed, vec![(0x01020304, 80), (0x05060708, 8080)]);
    }

    #[test]
    fn rejects_too_few_dots() {
        let err = parse_proxy_list("1.2.3 ").unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::ConfigParse {
                token: "1.2.3".to_string(),
                reason: "need 3 dots for an ip address",
            }
        );
    }

    #[test]
    fn rejects_illegal_char() {
        let err = parse_proxy_list("1.2.3.x").unwrap_err();
        assert!(err.to_string().contains("illegal character"));
    }

    #[test]
    fn rejects_zero_ip() {
        let err = parse_proxy_list("0.0.0.0").unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::ConfigParse {
                token: "0.0.0.0".to_string(),
                reason: "ip is zero or broadcast",
            }
        );
    }

    #[test]
    fn rejects_broadcast_ip() {
        let err = parse_proxy_list("255.255.255.255").unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::ConfigParse {
                token: "255.255.255.255".to_string(),
                reason: "ip is zero or broadcast",
            }
        );
    }

    #[test]
    fn rejects_too_many_colons() {
        let err = parse_proxy_list("1.2.3.4:80:90").unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::ConfigParse { reason: "too many colons", .. }
        ));
    }
}
