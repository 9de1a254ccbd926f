use anyhow::{Context, Result};
use serde::Serialize;

/// Emit a value as JCS-canonical JSON (RFC 8785).
///
/// Used for run summaries, doctor output and every other JSON the CLI prints
/// or persists, so the same run always produces byte-identical JSON.
///
/// # Example
///
/// ```rust
/// use libstack_utils::canonicalization::emit_jcs;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Outcome {
///     step: String,
///     attempts: u32,
/// }
///
/// let json = emit_jcs(&Outcome { step: "database".into(), attempts: 5 }).unwrap();
/// assert_eq!(json, r#"{"attempts":5,"step":"database"}"#);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}
