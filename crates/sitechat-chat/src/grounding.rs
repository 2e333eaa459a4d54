//! System-instruction assembly for grounded answers.
//!
//! Two distinct prompts: a strict documents-only prompt when retrieval found
//! relevant chunks, and a fallback prompt that confines the model to the
//! built-in site description otherwise. The split keeps the model from
//! answering document questions out of general knowledge.

/// Built-in description of the site, used as grounding when the user has no
/// relevant document content.
pub const DEFAULT_SITE_CONTEXT: &str = "
About this website:
- AI-Powered Website Assistant: a landing page with a built-in chatbot
- Uses retrieval-augmented generation for context-aware answers
- Answers questions from uploaded documents and website content

Services & Features:
- Context-Aware Chat: answers based on your uploaded documents and knowledge base
- Instant Responses: streamed replies with typing indicators
- Knowledge Base: upload text or PDFs to expand what the chatbot knows
- Chat history is stored so you can resume conversations

How it works:
- Add documents or text through the documents API
- The system extracts text, creates embeddings, and stores them for retrieval
- When you ask a question, the most relevant chunks are retrieved and used to
  generate a grounded answer
";

/// Separator between retrieved chunks in the assembled context block.
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// Build the system instruction for a turn from the retrieved chunks.
pub fn build_system_instruction(chunks: &[String]) -> String {
    if chunks.is_empty() {
        let context = format!(
            "No relevant content from uploaded documents. Use only this fallback:{DEFAULT_SITE_CONTEXT}"
        );
        format!(
            "You are a RAG assistant. No relevant document content was found. \
             Use only the fallback below for site/service questions. Otherwise say: \
             \"I couldn't find relevant information in your documents. Please upload \
             a PDF or rephrase your question.\"\n\nContext:\n{context}"
        )
    } else {
        let context = format!(
            "Content from the user's uploaded documents (PDF/text):\n\n{}",
            chunks.join(CHUNK_SEPARATOR)
        );
        format!(
            "You are a RAG assistant. Answer ONLY from the context below (the user's \
             uploaded PDF/documents). Do NOT use external knowledge.\n\n\
             STRICT RULES:\n\
             1. Answer ONLY using the provided context. Every fact in your response must come from the context.\n\
             2. If the context does NOT contain the answer, respond: \"I don't have that information in your uploaded documents.\"\n\
             3. Be concise and accurate. Quote or paraphrase from the context when possible.\n\
             4. Do not make up information or use general knowledge.\n\n\
             Context:\n{context}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_instruction_includes_chunks_in_order() {
        let chunks = vec!["first chunk".to_string(), "second chunk".to_string()];
        let system = build_system_instruction(&chunks);
        assert!(system.contains("Answer ONLY from the context"));
        assert!(system.contains("first chunk\n\n---\n\nsecond chunk"));
        assert!(!system.contains("fallback"));
    }

    #[test]
    fn test_fallback_instruction_uses_site_context() {
        let system = build_system_instruction(&[]);
        assert!(system.contains("No relevant document content was found"));
        assert!(system.contains("AI-Powered Website Assistant"));
        assert!(!system.contains("STRICT RULES"));
    }
}
