//! Formats search results into the context block prepended to a chat
//! prompt.

use std::fmt::Write;

use crate::models::SearchResult;

const HEADER: &str = "基于以下相关文档信息回答用户问题：\n\n";
const FOOTER: &str = "请基于上述文档内容回答用户问题，如果文档中没有相关信息，请说明并提供一般性建议。";

/// Build the prompt context for `results`, or an empty string when there
/// is nothing to cite.
///
/// Each result is numbered from 1 and shows the document title, the chunk
/// text and its relevance tier.
pub fn build_chat_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut out = String::from(HEADER);
    for (i, result) in results.iter().enumerate() {
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "文档{}：{}\n内容：{}\n相关性：{}\n\n",
            i + 1,
            result.document.title,
            result.chunk.content,
            result.relevance
        );
    }
    out.push_str(FOOTER);
    out
}
