// src/tools/sanitizer.rs: Strip comments, imports and pragmas from Solidity source

use async_trait::async_trait;
use serde_json::json;

use super::{str_param, Capability, ParamType, Params, ToolParameter, ToolResult};
use crate::infra::errors::VeriteError;

pub struct CodeSanitizer;

/// Remove comments (line and block, string-literal aware), blank lines, and
/// optionally `import` / `pragma` statements.
pub fn sanitize_solidity(source: &str, keep_imports: bool, keep_pragmas: bool) -> String {
    let stripped = strip_comments(source);
    stripped
        .lines()
        .map(str::trim_end)
        .filter(|line| {
            let t = line.trim_start();
            if t.is_empty() {
                return false;
            }
            if !keep_imports && t.starts_with("import ") {
                return false;
            }
            if !keep_pragmas && t.starts_with("pragma ") {
                return false;
            }
            true
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"' | '\'', _) => {
                quote = Some(c);
                out.push(c);
            }
            ('/', Some('/')) => {
                // Line comment: drop until newline, keep the newline.
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl Capability for CodeSanitizer {
    fn name(&self) -> &str {
        "code_sanitizer"
    }

    fn description(&self) -> &str {
        "Removes comments, imports, pragmas and blank lines from Solidity source for focused analysis"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("source_code", ParamType::String, "Raw Solidity source code"),
            ToolParameter::optional(
                "keep_imports",
                ParamType::Boolean,
                "Keep import statements",
            )
            .with_default(json!(false)),
            ToolParameter::optional(
                "keep_pragmas",
                ParamType::Boolean,
                "Keep pragma statements",
            )
            .with_default(json!(false)),
        ]
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, VeriteError> {
        let source = str_param(params, "source_code")?;
        if source.trim().is_empty() {
            return Ok(ToolResult::failure(self.name(), "No source code provided"));
        }
        let keep_imports = params["keep_imports"].as_bool().unwrap_or(false);
        let keep_pragmas = params["keep_pragmas"].as_bool().unwrap_or(false);

        let sanitized = sanitize_solidity(source, keep_imports, keep_pragmas);
        let original_lines = source.lines().count();
        let sanitized_lines = sanitized.lines().count();
        let reduction_percent = if original_lines > 0 {
            (original_lines - sanitized_lines) as f64 / original_lines as f64 * 100.0
        } else {
            0.0
        };

        tracing::debug!(
            original_lines,
            sanitized_lines,
            "Sanitized source ({reduction_percent:.1}% reduction)"
        );

        Ok(ToolResult::ok(
            self.name(),
            json!({
                "sanitized_code": sanitized,
                "original_lines": original_lines,
                "sanitized_lines": sanitized_lines,
                "reduction_percent": reduction_percent,
                "removed_imports": !keep_imports,
                "removed_pragmas": !keep_pragmas,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::prepare_params;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.0;
import "./IERC20.sol";

/* Vault
   with a block comment */
contract Vault {
    string public url = "https://example.com"; // trailing
    uint256 x; /* inline */ uint256 y;

    function f() external {}
}
"#;

    #[test]
    fn test_strips_comments_imports_pragmas() {
        let out = sanitize_solidity(SOURCE, false, false);
        assert_eq!(
            out,
            "contract Vault {\n    string public url = \"https://example.com\";\n    uint256 x;  uint256 y;\n    function f() external {}\n}"
        );
    }

    #[test]
    fn test_keeps_imports_and_pragmas_on_request() {
        let out = sanitize_solidity(SOURCE, true, true);
        assert!(out.starts_with("pragma solidity ^0.8.0;\nimport \"./IERC20.sol\";"));
    }

    #[test]
    fn test_comment_markers_inside_strings_survive() {
        let out = sanitize_solidity("string s = \"a // b /* c */\";", false, false);
        assert_eq!(out, "string s = \"a // b /* c */\";");
    }

    #[tokio::test]
    async fn test_capability_reports_reduction() {
        let tool = CodeSanitizer;
        let given = json!({"source_code": SOURCE});
        let params = prepare_params(&tool.parameters(), given.as_object().unwrap()).unwrap();
        let result = tool.execute(&params).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["sanitized_lines"], 5);
        assert!(result.data["reduction_percent"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_capability_empty_source() {
        let tool = CodeSanitizer;
        let given = json!({"source_code": "   "});
        let params = prepare_params(&tool.parameters(), given.as_object().unwrap()).unwrap();
        let result = tool.execute(&params).await.unwrap();
        assert!(!result.success);
    }
}
