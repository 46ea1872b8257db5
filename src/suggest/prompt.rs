use crate::suggest::ErrorContext;

pub fn system_prompt_for_error() -> String {
    r#"You are a debugging assistant. You are given the output of a failing test run for a freshly generated project, plus excerpts of the source files named in the traceback.

## Instructions
1. Identify the root cause of the failure.
2. Propose exactly one minimal fix as a literal text substitution.
3. The text to replace must appear verbatim in the named file. Only its first occurrence will be replaced.

## Response format
File: <path of the file to change, exactly as it appears in the traceback>
```old
<exact text to replace>
```
```new
<replacement text>
```
<one or two sentences explaining the fix>

If no code change can fix the failure (for example a missing system package), explain what the operator should do instead and omit the File line and code blocks."#
        .to_string()
}

pub fn user_message_for_error(error_text: &str, context: &ErrorContext) -> String {
    let code_section = if context.relevant_code.is_empty() {
        String::new()
    } else {
        let excerpts = context
            .relevant_code
            .iter()
            .map(|(path, excerpt)| format!("### {path}\n```\n{excerpt}\n```"))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("\n\n## Relevant code\n{excerpts}")
    };

    format!(
        "## Error\n```\n{error_text}\n```\n\n## Test output\n```\n{}\n```{code_section}",
        context.test_output
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_includes_excerpts() {
        let mut context = ErrorContext::default();
        context
            .relevant_code
            .insert("src/core.py".to_string(), "x = y".to_string());
        let message = user_message_for_error("NameError", &context);
        assert!(message.contains("### src/core.py"));
        assert!(message.contains("x = y"));
    }

    #[test]
    fn test_user_message_omits_empty_code_section() {
        let message = user_message_for_error("boom", &ErrorContext::default());
        assert!(!message.contains("Relevant code"));
    }
}
