use serde_json::{json, Value};

/// System prompt for the chunking stage. Sent once per sliding window; the
/// window text itself is the user message.
pub const CHUNKER_SYSTEM_PROMPT: &str = "\
You split a window of document text into self-contained chunks suitable for \
retrieval. Each chunk should cover one coherent idea or section; prefer \
natural boundaries (headings, paragraphs) over fixed lengths. For every \
chunk return start_char/end_char as offsets into the window you were given, \
counted from zero at the start of this window. If you cannot determine \
exact offsets, omit them and return the chunk's exact text instead \
(verbatim, so it can be located by substring search). Do not summarize or \
rewrite the source text in the `text` field; write the summary and \
why_this_chunk fields separately.";

pub fn chunker_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "chunks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string" },
                        "title": { "type": "string" },
                        "section": { "type": "string" },
                        "summary": { "type": "string" },
                        "why_this_chunk": { "type": "string" },
                        "start_char": { "type": ["integer", "null"] },
                        "end_char": { "type": ["integer", "null"] }
                    },
                    "required": [
                        "text", "title", "section", "summary", "why_this_chunk",
                        "start_char", "end_char"
                    ],
                    "additionalProperties": false
                }
            }
        },
        "required": ["chunks"],
        "additionalProperties": false
    })
}

/// System prompt for the entity-extraction stage, run once per chunk.
pub const ENTITY_SYSTEM_PROMPT: &str = "\
Extract the named entities mentioned in this chunk of text: people, \
organizations, locations, products and other proper nouns worth linking \
across documents. Skip pronouns and generic nouns. Return an empty list if \
none are present.";

pub fn entity_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "type": { "type": "string" }
                    },
                    "required": ["name", "type"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["entities"],
        "additionalProperties": false
    })
}
