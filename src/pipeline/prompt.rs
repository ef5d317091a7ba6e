//! Prompt assembly and chaos injection.

const CONTEXT_HEADER: &str = "Context:\n";
const QUESTION_MARKER: &str = "\n\nQuestion: ";
const ANSWER_MARKER: &str = "\nAnswer:";

/// Times the context is repeated under `tokenSpike`.
pub const TOKEN_SPIKE_REPEAT: usize = 20;

/// Appended to the generated text under `policyRisk`.
pub const POLICY_RISK_SNIPPET: &str =
    "Contact billing@example.com with card 4111 1111 1111 1111; admin password = hunter2.";

/// Build the generation prompt with `context` repeated `repeat` times.
///
/// Whitespace runs in the question collapse to single spaces, so the question
/// can never contain a section marker.
pub fn build(question: &str, context: &str, repeat: usize) -> String {
    let context = vec![context; repeat.max(1)].join("\n\n");
    let question = question.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{CONTEXT_HEADER}{context}{QUESTION_MARKER}{question}{ANSWER_MARKER}")
}

/// The two halves of a prompt produced by [`build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptParts<'a> {
    pub context: &'a str,
    pub question: &'a str,
}

/// Split a prompt back into context and question.
///
/// Text that does not follow the prompt layout is treated as a bare question.
pub fn parse(prompt: &str) -> PromptParts<'_> {
    let Some((head, tail)) = prompt.rsplit_once(QUESTION_MARKER) else {
        return PromptParts {
            context: "",
            question: prompt,
        };
    };
    PromptParts {
        context: head.strip_prefix(CONTEXT_HEADER).unwrap_or(head),
        question: tail.strip_suffix(ANSWER_MARKER).unwrap_or(tail),
    }
}

/// Append the policy-risk snippet to a generated answer.
pub fn inject_policy_risk(text: &str) -> String {
    if text.is_empty() {
        return POLICY_RISK_SNIPPET.to_string();
    }
    format!("{text} {POLICY_RISK_SNIPPET}")
}
