// src/harness/cleaner.rs: Structural cleanup of candidate Solidity
//
// Candidate code arrives as model output and often does not compile as a
// single unit: it carries its own headers, declares interfaces inside the
// contract body, or leaves statements dangling outside any function. The
// cleaner fixes those shapes line by line with brace-depth tracking and makes
// sure the exploit contract can receive value.

/// Keywords that start a statement which is only legal inside a function.
const ORPHAN_KEYWORDS: &[&str] = &[
    "require(", "require (", "revert(", "revert ", "assert(", "emit ", "return ", "return;",
    "if(", "if (", "for(", "for (", "while(", "while (",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedCandidate {
    pub code: String,
    /// Contract that holds `exploit()`, or the last contract declared.
    pub contract_name: Option<String>,
    pub hoisted_interfaces: usize,
    pub dropped_lines: usize,
    pub added_entry_points: Vec<&'static str>,
}

/// Net `{` minus `}` on a line, ignoring string literals and `//` comments.
fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '/' if chars.peek() == Some(&'/') => break,
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn is_header(trimmed: &str) -> bool {
    trimmed.starts_with("// SPDX-License-Identifier")
        || trimmed.starts_with("pragma ")
        || trimmed.starts_with("import ")
}

fn is_orphan_statement(trimmed: &str) -> bool {
    ORPHAN_KEYWORDS.iter().any(|k| trimmed.starts_with(k))
}

fn contract_decl_name(trimmed: &str) -> Option<&str> {
    let rest = trimmed
        .strip_prefix("abstract contract ")
        .or_else(|| trimmed.strip_prefix("contract "))?;
    let name: &str = rest
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()?;
    (!name.is_empty()).then_some(name)
}

/// Drop headers and top-level orphan statements; hoist nested interfaces.
fn restructure(code: &str) -> (Vec<String>, usize, usize) {
    let mut hoisted: Vec<String> = Vec::new();
    let mut body: Vec<String> = Vec::new();
    let mut depth = 0i32;
    let mut hoisted_count = 0;
    let mut dropped = 0;

    // Depth at which the interface or orphan block being captured started.
    let mut hoisting_from: Option<i32> = None;
    let mut skipping_from: Option<i32> = None;

    for line in code.lines() {
        let trimmed = line.trim();
        let delta = brace_delta(line);

        if let Some(start) = hoisting_from {
            hoisted.push(line.trim_start().to_string());
            depth += delta;
            if depth <= start {
                hoisting_from = None;
                hoisted.push(String::new());
            }
            continue;
        }
        if let Some(start) = skipping_from {
            dropped += 1;
            depth += delta;
            if depth <= start && (trimmed.ends_with(';') || trimmed.ends_with('}')) {
                skipping_from = None;
            }
            continue;
        }

        if depth == 0 && is_header(trimmed) {
            dropped += 1;
            continue;
        }
        if depth > 0 && trimmed.starts_with("interface ") {
            hoisted_count += 1;
            hoisted.push(line.trim_start().to_string());
            if delta > 0 {
                depth += delta;
                hoisting_from = Some(depth - delta);
            } else {
                hoisted.push(String::new());
            }
            continue;
        }
        if depth == 0 && is_orphan_statement(trimmed) {
            dropped += 1;
            depth += delta;
            let complete = depth <= 0 && (trimmed.ends_with(';') || trimmed.ends_with('}'));
            if !complete {
                skipping_from = Some(0);
            }
            depth = depth.max(0);
            continue;
        }

        depth = (depth + delta).max(0);
        body.push(line.to_string());
    }

    hoisted.extend(body);
    (hoisted, hoisted_count, dropped)
}

struct ContractSpan {
    name: String,
    start: usize,
    end: usize,
}

fn contract_spans(lines: &[String]) -> Vec<ContractSpan> {
    let mut spans = Vec::new();
    let mut depth = 0i32;
    let mut open: Option<(String, usize)> = None;
    for (i, line) in lines.iter().enumerate() {
        if depth == 0 && open.is_none() {
            if let Some(name) = contract_decl_name(line.trim()) {
                open = Some((name.to_string(), i));
            }
        }
        let before = depth;
        depth = (depth + brace_delta(line)).max(0);
        if let Some((name, start)) = &open {
            if depth == 0 && (before > 0 || line.contains('{')) && line.contains('}') {
                spans.push(ContractSpan {
                    name: name.clone(),
                    start: *start,
                    end: i,
                });
                open = None;
            }
        }
    }
    spans
}

pub fn clean_candidate(code: &str) -> CleanedCandidate {
    let (mut lines, hoisted_interfaces, dropped_lines) = restructure(code);
    let spans = contract_spans(&lines);

    let main = spans
        .iter()
        .find(|s| {
            lines[s.start..=s.end]
                .iter()
                .any(|l| l.contains("function exploit("))
        })
        .or_else(|| spans.last());

    let mut added_entry_points = Vec::new();
    let contract_name = main.map(|s| s.name.clone());
    if let Some(span) = main {
        let body = lines[span.start..=span.end].join("\n");
        if !body.contains("receive()") {
            added_entry_points.push("receive() external payable {}");
        }
        if !body.contains("fallback()") {
            added_entry_points.push("fallback() external payable {}");
        }
        if !added_entry_points.is_empty() {
            let closing = &lines[span.end];
            if let Some(pos) = closing.rfind('}') {
                let (head, tail) = closing.split_at(pos);
                let mut replacement = Vec::new();
                if !head.trim().is_empty() {
                    replacement.push(head.to_string());
                }
                for entry in &added_entry_points {
                    replacement.push(format!("    {entry}"));
                }
                replacement.push(tail.to_string());
                lines.splice(span.end..=span.end, replacement);
            }
        }
    }

    if hoisted_interfaces > 0 || dropped_lines > 0 {
        tracing::debug!(hoisted_interfaces, dropped_lines, "Cleaned candidate source");
    }

    CleanedCandidate {
        code: lines.join("\n").trim().to_string(),
        contract_name,
        hoisted_interfaces,
        dropped_lines,
        added_entry_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_brace_delta_ignores_strings_and_comments() {
        assert_eq!(brace_delta("contract A {"), 1);
        assert_eq!(brace_delta("string s = \"{{\"; // }"), 0);
        assert_eq!(brace_delta("} }"), -2);
    }

    #[test]
    fn test_strips_headers() {
        let code = "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\nimport \"x.sol\";\ncontract A {\n    receive() external payable {}\n    fallback() external payable {}\n}";
        let out = clean_candidate(code);
        assert_eq!(out.dropped_lines, 3);
        assert!(out.code.starts_with("contract A {"));
        assert!(out.added_entry_points.is_empty());
    }

    #[test]
    fn test_hoists_nested_interface() {
        let code = r#"contract Exploit {
    interface IVault {
        function withdraw(uint256 amount) external;
    }
    function exploit() external {
        IVault(address(1)).withdraw(1);
    }
    receive() external payable {}
    fallback() external payable {}
}"#;
        let out = clean_candidate(code);
        assert_eq!(out.hoisted_interfaces, 1);
        assert!(out.code.starts_with("interface IVault {"));
        let iface_end = out.code.find("contract Exploit").unwrap();
        assert!(out.code[..iface_end].contains("function withdraw"));
        assert_eq!(out.code.matches("interface IVault").count(), 1);
        assert_eq!(out.contract_name.as_deref(), Some("Exploit"));
    }

    #[test]
    fn test_drops_orphan_statements() {
        let code = r#"require(msg.sender == owner, "no");
if (x > 0) {
    y = 1;
}
contract A {
    function exploit() external {
        require(true);
    }
}"#;
        let out = clean_candidate(code);
        assert_eq!(out.dropped_lines, 4);
        assert!(out.code.starts_with("contract A {"));
        assert!(out.code.contains("        require(true);"));
    }

    #[test]
    fn test_adds_entry_points_to_exploit_contract() {
        let code = r#"contract Helper {
    function h() external {}
}
contract Attack {
    function exploit() external {}
}
contract Later {}"#;
        let out = clean_candidate(code);
        assert_eq!(out.contract_name.as_deref(), Some("Attack"));
        assert_eq!(out.added_entry_points.len(), 2);
        let attack = out.code.find("contract Attack").unwrap();
        let receive = out.code.find("receive() external payable {}").unwrap();
        let later = out.code.find("contract Later").unwrap();
        assert!(attack < receive && receive < later);
    }

    #[test]
    fn test_single_line_contract() {
        let out = clean_candidate("contract Tiny {}");
        assert_eq!(out.contract_name.as_deref(), Some("Tiny"));
        assert_eq!(
            out.code,
            "contract Tiny {\n    receive() external payable {}\n    fallback() external payable {}\n}"
        );
    }

    #[test]
    fn test_no_contract() {
        let out = clean_candidate("library L {}");
        assert!(out.contract_name.is_none());
        assert!(out.added_entry_points.is_empty());
    }
}
