//! Prompt fragments for the classification conversation.
//!
//! The instruction text itself comes from the caller (see
//! [`crate::config::load_instructions`]); this module only adds the fixed
//! JSON-only directive and the repair request used when the model replies
//! with something that does not parse.

/// Appended to the caller's instructions in the system message.
pub const JSON_ONLY_DIRECTIVE: &str =
    "IMPORTANT: respond only with a single valid JSON object, with no additional text.";

/// Build the system message: instructions followed by the JSON-only directive.
pub fn system_prompt(instructions: &str) -> String {
    format!("{}\n\n{}", instructions.trim_end(), JSON_ONLY_DIRECTIVE)
}

/// Build the user message asking the model to fix its previous reply.
///
/// The invalid output is quoted verbatim inside a fence.
pub fn repair_prompt(invalid_output: &str) -> String {
    format!(
        "The previous output was not valid JSON:\n```\n{}\n```\nRespond NOW with only the valid JSON object.",
        invalid_output
    )
}
