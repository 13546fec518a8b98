use mongogenius_core::OutputShape;

pub const SCHEMA_TEMPLATE: &str = "\
You are an expert MongoDB database architect.

Based on the following data requirements, generate a MongoDB schema design:

Data Requirements: {{dataRequirements}}

Put only the MongoDB schema in the \"mongoDBSchema\" field.
Add a short, one-sentence summary of what you have generated to the \"progress\" field.";

pub const QUERY_TEMPLATE: &str = "\
You are an expert MongoDB query optimizer.

Based on the provided MongoDB query and data model details, generate an optimized MongoDB query \
and explain the optimization techniques applied.

Original Query: {{query}}
Data Model Details: {{dataModel}}

Optimize the query and provide an explanation of the changes you made.
The response must include the \"optimizedQuery\" and \"explanation\" fields.";

pub const INDEX_TEMPLATE: &str = "\
You are an expert MongoDB database administrator. Based on the provided data model description \
and query patterns, suggest optimal indexing strategies to improve query performance.

Data Model Description:
{{dataModelDescription}}

Query Patterns:
{{queryPatterns}}

Put a list of suggested indexes in the \"suggestedIndexes\" field, with a brief explanation of \
why each index is recommended.";

/// Replace each `{{name}}` in `template` with the matching field text.
///
/// Single pass: inserted text is never scanned again, so user input that
/// looks like a placeholder comes through verbatim. Unknown names are left
/// as they are.
pub fn render(template: &str, fields: &[(&str, &str)]) -> String {
    let extra: usize = fields.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match fields.iter().find(|(n, _)| *n == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push_str("{{");
                out.push_str(name);
                out.push_str("}}");
            }
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}

/// Names of all `{{...}}` placeholders in `template`, in order.
#[cfg(test)]
pub(crate) fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        names.push(&after[..close]);
        rest = &after[close + 2..];
    }
    names
}

/// System message declaring the reply format for `shape`.
pub fn system_prompt(shape: &OutputShape) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(
        "You help developers design and tune MongoDB databases. \
Your reply is parsed by a program, not read by a person.\n\n\
Output ONLY a JSON object with exactly these string fields:\n",
    );
    for field in shape.fields {
        out.push_str("- \"");
        out.push_str(field.name);
        out.push_str("\": ");
        out.push_str(field.description);
        out.push('\n');
    }
    out.push_str(
        "\nEvery field is required and must be a non-empty string. \
Put code and multi-line text inside the strings, escaping newlines and quotes as JSON requires. \
Output ONLY the JSON object, nothing else.",
    );
    out
}
