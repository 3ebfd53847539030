//! `{param}` templates.
//!
//! Placeholders name a binding key and are replaced by the rendered value.
//! `{{` and `}}` produce literal braces. Anything else between braces is
//! taken verbatim as the key, so `{$seed}` and `{--lr}` refer to the
//! argument-style parameters.

use crate::expand::Binding;

/// Template errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template '{template}' references unknown parameter '{placeholder}'")]
    UnknownParameter {
        template: String,
        placeholder: String,
    },

    #[error("template '{template}' is malformed at byte {position}: {reason}")]
    Malformed {
        template: String,
        position: usize,
        reason: &'static str,
    },

    #[error("template '{template}' renders to '{rendered}', which does not split into words (unbalanced quotes)")]
    Unsplittable { template: String, rendered: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Brace(char),
    Placeholder(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let malformed = |position, reason| TemplateError::Malformed {
        template: template.to_string(),
        position,
        reason,
    };

    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                if literal_start < i {
                    segments.push(Segment::Literal(&template[literal_start..i]));
                }
                segments.push(Segment::Brace(bytes[i] as char));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                if literal_start < i {
                    segments.push(Segment::Literal(&template[literal_start..i]));
                }
                let close = template[i + 1..]
                    .find(['{', '}'])
                    .map(|off| i + 1 + off)
                    .filter(|&j| bytes[j] == b'}')
                    .ok_or_else(|| malformed(i, "unterminated placeholder"))?;
                let key = &template[i + 1..close];
                if key.is_empty() {
                    return Err(malformed(i, "empty placeholder"));
                }
                segments.push(Segment::Placeholder(key));
                i = close + 1;
                literal_start = i;
            }
            b'}' => return Err(malformed(i, "unmatched '}'")),
            _ => i += 1,
        }
    }
    if literal_start < bytes.len() {
        segments.push(Segment::Literal(&template[literal_start..]));
    }
    Ok(segments)
}

/// Names referenced by `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Placeholder(key) = segment {
            if !names.iter().any(|n| n == key) {
                names.push(key.to_string());
            }
        }
    }
    Ok(names)
}

/// Substitute every placeholder in `template` with its value from `binding`.
pub fn render(template: &str, binding: &Binding) -> Result<String, TemplateError> {
    render_with(template, binding, |value| value.to_string())
}

/// Like [`render`], passing each substituted value through `escape`.
///
/// Literal text of the template is kept as written.
pub fn render_with<F>(template: &str, binding: &Binding, escape: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> String,
{
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Brace(c) => out.push(c),
            Segment::Placeholder(key) => {
                let value = binding
                    .get(key)
                    .ok_or_else(|| TemplateError::UnknownParameter {
                        template: template.to_string(),
                        placeholder: key.to_string(),
                    })?;
                out.push_str(&escape(&value.render()));
            }
        }
    }
    Ok(out)
}
