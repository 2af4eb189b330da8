//! Prompt text for section generation and summary refresh.

use crate::sections::SectionPosition;

/// Standing instructions prepended to every section prompt.
const SECTION_INSTRUCTIONS: &str = "\
You are an experienced content writer turning a conversation between a user and ChatGPT \
into a readable blog article. Write the next section of that article.

Rules:
- Use only what the conversation actually covers. Do not add facts, examples or claims of your own.
- Keep the important facts, terms and insights. Do not quote the chat verbatim and do not name the user.
- Write in first person on behalf of the user, speaking directly to the reader.
- Prefer short, plain, active sentences in flowing paragraphs of varied length. No headings for their own sake, no lists unless the chat is a list.
- Avoid filler phrases such as \"delve\", \"imagine\", \"in conclusion\", \"transformative\" and \"not only ... but also\".
- The new section must read as a natural continuation of what is already written.
- IMPORTANT: if something is already covered according to the summary of the article so far, leave it out entirely, even if that leaves the section nearly empty.
- Keep it concise: synthesize, do not transcribe.";

/// Build the prompt for one article section.
///
/// Opening positions carry only the chunk; later positions add the running
/// summary and the trailing window of the article.
pub fn section_prompt(
    position: SectionPosition,
    chunk: &str,
    summary: &str,
    trailing_window: &str,
) -> String {
    let body = if position.needs_context() {
        format!(
            "[Summary of blog content written till now]:\n{summary}\n\n\
             [Last 200 words to maintain narrative]: {trailing_window}\n\n\
             [Chat messages]:\n{chunk}"
        )
    } else {
        format!("[Chat messages]:\n{chunk}")
    };

    format!(
        "{SECTION_INSTRUCTIONS}\n\n{marker}:\n\n{body}\n\nBLOG SECTION:",
        marker = position.marker()
    )
}

/// Build the prompt asking for a one-paragraph digest of the whole article.
pub fn summary_prompt(article: &str) -> String {
    format!(
        "Summarize the blog article below in one concise, information-dense paragraph. \
         Keep its key narrative, facts and terminology. Reply with the summary only.\n\n{article}"
    )
}
