// Search parameter escaping
//
// FHIR search parameter values reserve `$`, `,` and `|` (and `\` itself
// as the escape character). Escaping prefixes each with a backslash; no
// other characters are touched.

/// Escapes a raw value for use inside a FHIR search parameter.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '$' | ',' | '|') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
