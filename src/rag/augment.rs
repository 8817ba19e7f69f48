//! Reference-augmented prompt assembly

/// Fold `references` (in rank order) into `prompt`.
///
/// With no references the prompt is returned unchanged.
pub fn augment_prompt<S: AsRef<str>>(prompt: &str, references: &[S]) -> String {
    if references.is_empty() {
        return prompt.to_string();
    }

    let context_text = references
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("Reference {}: {}", i + 1, doc.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Using the following reference information from verified sources:\n\n\
         {context_text}\n\n\
         Now, please answer this request:\n\n\
         {prompt}\n\n\
         Provide a comprehensive answer based on the references above and your knowledge. \
         If the references don't fully answer the question, supplement with your general \
         knowledge but indicate which parts came from references."
    )
}
