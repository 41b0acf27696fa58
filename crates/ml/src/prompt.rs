use std::fmt::Write;

use querylens_core::{display_name, GenerationRequest, IntentCatalog};

pub const ROLE_PREAMBLE: &str = "I am a fraud analysis assistant.";

const CATALOG_HEADER: &str = " I know the following questions and their report templates:\n";

const CATALOG_GUIDANCE: &str = "\nIf the question matches any of these patterns, I should suggest using the corresponding report template. Otherwise, I should provide a brief fraud analysis response.\n\n";

/// Builds the fallback prompt. Output depends only on the catalog and the
/// request, and grows linearly with the number of intents.
pub fn build_prompt(catalog: &IntentCatalog, request: &GenerationRequest) -> String {
    let mut prompt = String::from(ROLE_PREAMBLE);

    if request.use_catalog_context && !catalog.is_empty() {
        prompt.push_str(CATALOG_HEADER);
        for intent in catalog.list_intents() {
            let _ = writeln!(prompt, "\n- {}:", display_name(&intent.id));
            prompt.push_str("  Examples:\n");
            for example in &intent.examples {
                let _ = writeln!(prompt, "    * {example}");
            }
            prompt.push_str("  Report template:\n");
            for line in intent.template.lines() {
                let _ = writeln!(prompt, "    {line}");
            }
        }
        prompt.push_str(CATALOG_GUIDANCE);
    } else {
        prompt.push_str("\n\n");
    }

    if let Some(context) = request.extra_context.as_deref() {
        prompt.push_str("Most recent result:\n");
        prompt.push_str(context.trim_end());
        prompt.push_str("\n\n");
    }

    let _ = write!(prompt, "Question: {}\nAnswer:", request.question.trim());
    prompt
}
