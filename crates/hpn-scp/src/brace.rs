//! Brace expansion for incoming-name patterns (`a{b,c}d` -> `abd`, `acd`).

use crate::err::RcpError;

/// A parsed pattern fragment: either a literal character or a group of
/// alternative branches.
enum Node {
    Lit(char),
    Group(Vec<Vec<Node>>),
}

/// Expands every brace group in `pattern`, returning the full cartesian
/// product of branches. Nested groups are supported. Bracket expressions
/// (`[...]`) and backslash escapes are passed through verbatim without
/// being treated as brace syntax. Unbalanced braces are a hard error.
pub fn expand_braces(pattern: &str) -> Result<Vec<String>, RcpError> {
    let chars: Vec<char> = pattern.chars().collect();
    let (nodes, consumed) = parse_seq(&chars, 0, false)?;
    if consumed != chars.len() {
        return Err(RcpError::InvalidPattern(pattern.to_string()));
    }
    Ok(expand_nodes(&nodes))
}

/// Parses a run of literals, bracket expressions, and groups. Stops at
/// end of input, or (when `in_group`) at an unescaped `,` or `}`.
fn parse_seq(chars: &[char], mut i: usize, in_group: bool) -> Result<(Vec<Node>, usize), RcpError> {
    let mut nodes = Vec::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                nodes.push(Node::Lit(chars[i + 1]));
                i += 2;
            }
            '[' => {
                let (literal, next) = parse_bracket(chars, i);
                nodes.extend(literal.chars().map(Node::Lit));
                i = next;
            }
            '{' => {
                let (branches, next) = parse_group(chars, i)?;
                nodes.push(Node::Group(branches));
                i = next;
            }
            ',' if in_group => break,
            '}' if in_group => break,
            c => {
                nodes.push(Node::Lit(c));
                i += 1;
            }
        }
    }
    Ok((nodes, i))
}

/// Parses `{branch,branch,...}` starting at the `{`. Returns the branches
/// and the index just past the matching `}`.
fn parse_group(chars: &[char], i: usize) -> Result<(Vec<Vec<Node>>, usize), RcpError> {
    let mut i = i + 1;
    let mut branches = Vec::new();
    loop {
        let (branch, next) = parse_seq(chars, i, true)?;
        branches.push(branch);
        i = next;
        match chars.get(i) {
            Some(',') => i += 1,
            Some('}') => {
                i += 1;
                break;
            }
            _ => {
                return Err(RcpError::InvalidPattern(chars.iter().collect()));
            }
        }
    }
    Ok((branches, i))
}

/// Consumes a `[...]` bracket expression as opaque literal text (including
/// the brackets themselves), without interpreting its contents as brace
/// syntax. An unterminated `[` is treated as a literal character.
fn parse_bracket(chars: &[char], i: usize) -> (String, usize) {
    let mut j = i + 1;
    if matches!(chars.get(j), Some('^' | '!')) {
        j += 1;
    }
    if matches!(chars.get(j), Some(']')) {
        j += 1;
    }
    while !matches!(chars.get(j), Some(']') | None) {
        j += 1;
    }
    match chars.get(j) {
        Some(']') => (chars[i..=j].iter().collect(), j + 1),
        _ => ("[".to_string(), i + 1),
    }
}

/// Expands a parsed node sequence into the full cartesian product of
/// strings it denotes.
fn expand_nodes(nodes: &[Node]) -> Vec<String> {
    let mut results = vec![String::new()];
    for node in nodes {
        match node {
            Node::Lit(c) => {
                for r in &mut results {
                    r.push(*c);
                }
            }
            Node::Group(branches) => {
                let alternatives: Vec<String> =
                    branches.iter().flat_map(|b| expand_nodes(b)).collect();
                let mut next = Vec::with_capacity(results.len() * alternatives.len().max(1));
                for r in &results {
                    for alt in &alternatives {
                        next.push(format!("{r}{alt}"));
                    }
                }
                results = next;
            }
        }
    }
    results
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nested_groups_produce_full_cartesian_product() {
        let mut got = expand_braces("a{b,c{d,e}}").expect("valid pattern");
        got.sort();
        assert_eq!(got, vec!["ab", "acd", "ace"]);
    }

    #[test]
    fn unbalanced_open_brace_is_rejected() {
        assert!(expand_braces("a{").is_err());
    }

    #[test]
    fn pattern_without_braces_is_identity() {
        assert_eq!(expand_braces("plainfile.txt").unwrap(), vec!["plainfile.txt"]);
    }

    #[test]
    fn bracket_expression_is_not_mistaken_for_a_group() {
        assert_eq!(expand_braces("f[a,b]").unwrap(), vec!["f[a,b]"]);
    }

    #[test]
    fn escaped_brace_is_literal() {
        assert_eq!(expand_braces(r"a\{b").unwrap(), vec!["a{b"]);
    }
}
