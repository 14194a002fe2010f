//! Prompt handed to the selected child agent

use crate::recommendation::AgentCategory;

/// Build the child agent prompt.
///
/// Inputs are interpolated verbatim; nothing is escaped or truncated.
pub fn format_child_prompt(
    category: AgentCategory,
    user_input: &str,
    supervisor_text: &str,
) -> String {
    let label = category.label();
    format!(
        "\nYou are a specialized agent focused on {label}.\n\n\
         The user's original request was: \"{user_input}\"\n\n\
         The supervisor agent has analyzed this request and determined that you should handle it.\n\
         The supervisor provided this context: \"{supervisor_text}\"\n\n\
         Please address the user's request with your specialized expertise in {label}.\n  "
    )
    .trim()
    .to_string()
}
